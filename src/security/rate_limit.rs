use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::logging::{SanitizedIpAddr, SecurityEvent};

/// Registrations between sweeps of expired windows.
const SWEEP_EVERY: u64 = 256;

/// Fixed-window request counter keyed by client address.
#[derive(Clone)]
pub struct RateLimiterState {
    max_requests: u32,
    window: Duration,
    buckets: Arc<DashMap<IpAddr, RateWindow>>,
    registrations: Arc<AtomicU64>,
}

impl RateLimiterState {
    pub fn new(calls: NonZeroU32, window: Duration) -> Self {
        Self {
            max_requests: calls.get(),
            window,
            buckets: Arc::new(DashMap::new()),
            registrations: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.rate_limit_requests, config.rate_limit_window)
    }

    /// Counts one request from `ip`. On refusal, returns the time left in the
    /// client's current window.
    fn register(&self, ip: IpAddr, now: Instant) -> Result<(), Duration> {
        if self.registrations.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.evict_expired(now);
        }

        self.buckets
            .entry(ip)
            .or_insert_with(|| RateWindow::starting(now))
            .admit(now, self.window, self.max_requests)
    }

    /// Drops windows that have fully elapsed; their clients start fresh anyway.
    fn evict_expired(&self, now: Instant) {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.expired(now, self.window));
        tracing::debug!(
            evicted = before.saturating_sub(self.buckets.len()),
            remaining = self.buckets.len(),
            "Swept rate limit windows"
        );
    }
}

pub async fn enforce_rate_limit(
    State(state): State<RateLimiterState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Only writes are counted.
    if request.method().is_safe() {
        return Ok(next.run(request).await);
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let client_ip = select_client_ip(request.headers(), peer);

    if let Err(retry_after) = state.register(client_ip, Instant::now()) {
        crate::log_security_event!(
            SecurityEvent::RateLimitExceeded,
            client_ip = %SanitizedIpAddr::new(client_ip),
            path = %request.uri().path(),
            "Rate limit exceeded for client"
        );

        return Err(AppError::RateLimited {
            retry_after: retry_after.max(Duration::from_secs(1)),
        });
    }

    Ok(next.run(request).await)
}

fn select_client_ip(headers: &HeaderMap, fallback: IpAddr) -> IpAddr {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.split(',').next())
        .and_then(|ip| ip.trim().parse().ok());

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(|ip| ip.trim().parse().ok());

    forwarded.or(real_ip).unwrap_or(fallback)
}

#[derive(Debug)]
struct RateWindow {
    started_at: Instant,
    hits: u32,
}

impl RateWindow {
    fn starting(now: Instant) -> Self {
        Self {
            started_at: now,
            hits: 0,
        }
    }

    fn expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.started_at) >= window
    }

    fn admit(&mut self, now: Instant, window: Duration, limit: u32) -> Result<(), Duration> {
        if self.expired(now, window) {
            *self = Self::starting(now);
        }
        if self.hits >= limit {
            return Err(window.saturating_sub(now.saturating_duration_since(self.started_at)));
        }
        self.hits += 1;
        Ok(())
    }
}
