use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 30;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub rate_limit_requests: NonZeroU32,
    pub rate_limit_window: Duration,
}

impl AppConfig {
    /// Reads the process environment, after loading `.env` when one exists.
    #[tracing::instrument(name = "config_load")]
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = parse_or(&lookup, "BIND_ADDR", || {
            DEFAULT_BIND_ADDR.parse().map_err(|_| unreachable_default())
        })?;

        let upload_dir = lookup("UPLOAD_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR));

        let requests: u32 = parse_or(&lookup, "RATE_LIMIT_REQUESTS", || {
            Ok(DEFAULT_RATE_LIMIT_REQUESTS)
        })?;
        let rate_limit_requests = NonZeroU32::new(requests).ok_or_else(|| ConfigError::Invalid {
            name: "RATE_LIMIT_REQUESTS",
            value: requests.to_string(),
            reason: "must be greater than zero".to_string(),
        })?;

        let window_secs: u64 = parse_or(&lookup, "RATE_LIMIT_WINDOW_SECS", || {
            Ok(DEFAULT_RATE_LIMIT_WINDOW_SECS)
        })?;
        if window_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "RATE_LIMIT_WINDOW_SECS",
                value: window_secs.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            upload_dir,
            rate_limit_requests,
            rate_limit_window: Duration::from_secs(window_secs),
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: impl FnOnce() -> Result<T, ConfigError>,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: err.to_string(),
        }),
        None => default(),
    }
}

fn unreachable_default() -> ConfigError {
    ConfigError::Invalid {
        name: "BIND_ADDR",
        value: DEFAULT_BIND_ADDR.to_string(),
        reason: "default address failed to parse".to_string(),
    }
}
