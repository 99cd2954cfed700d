mod codec;
mod config;
mod errors;
mod logging;
mod models;
mod problem;
mod routes;
mod security;
mod store;
mod validation;

use std::net::SocketAddr;

use axum::serve;
use config::AppConfig;
use routes::create_app;
use store::MemoryStore;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = AppConfig::from_env()?;
    std::fs::create_dir_all(&config.upload_dir)?;

    tracing::info!(
        bind_addr = %config.bind_addr,
        upload_dir = %config.upload_dir.display(),
        rate_limit_requests = config.rate_limit_requests.get(),
        rate_limit_window_secs = config.rate_limit_window.as_secs(),
        "Starting study notes service"
    );

    let app = create_app(&config, MemoryStore::shared())
        .into_make_service_with_connect_info::<SocketAddr>();

    let listener = TcpListener::bind(config.bind_addr).await?;
    serve(listener, app).await?;

    Ok(())
}
