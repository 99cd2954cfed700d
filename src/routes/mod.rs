use axum::{
    Extension, Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::get,
};
use serde_json::{Value, json};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::errors::{AppError, handle_panic};
use crate::security::{
    headers::set_security_headers,
    json::MAX_BODY_SIZE_BYTES,
    rate_limit::{RateLimiterState, enforce_rate_limit},
};
use crate::store::SharedStore;

pub mod demo;
pub mod files;
pub mod items;
pub mod notes;
pub mod tags;

use files::UploadRoot;

pub fn create_router() -> Router {
    tracing::debug!("Creating application router");
    let api = Router::new()
        .merge(notes::router())
        .merge(tags::router())
        .merge(files::router())
        .nest("/demo", demo::router());

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .merge(items::router())
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
}

/// The full application: routes plus the middleware stack. Panics are caught
/// outermost so they still get security headers and a problem envelope.
pub fn create_app(config: &AppConfig, store: SharedStore) -> Router {
    create_router()
        .layer(middleware::from_fn_with_state(
            RateLimiterState::from_config(config),
            enforce_rate_limit,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE_BYTES))
        .layer(Extension(store))
        .layer(Extension(UploadRoot::new(config.upload_dir.clone())))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::map_response(set_security_headers))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> AppError {
    AppError::not_found("resource")
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
