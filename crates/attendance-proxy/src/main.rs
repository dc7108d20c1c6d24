//! attendance-proxy entry point.

use tracing_subscriber::EnvFilter;

use attendance_proxy::{build_router, AppState, ProxyConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ProxyConfig::from_env()?;
    match &config.upstream_url {
        Some(url) => tracing::info!(upstream = %url.host_str().unwrap_or_default(), "Upstream configured"),
        None => tracing::warn!("GAS_API_URL is not set; requests will fail until it is"),
    }

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "attendance-proxy listening");

    axum::serve(listener, build_router(AppState::new(config))).await?;

    Ok(())
}
