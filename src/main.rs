use realtime_hub::config::AppConfig;
use realtime_hub::routes::{AppState, build_router};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "realtime_hub=info".parse().unwrap()),
        )
        .init();

    let config = AppConfig::from_env()?;
    if config.ws_token_secret.is_none() {
        warn!("WS_TOKEN_SECRET is not set; every upgrade will be refused");
    }
    if config.internal_broadcast_secret.is_none() {
        warn!("INTERNAL_BROADCAST_SECRET is not set; every broadcast will be refused");
    }

    let addr = config.bind_addr;
    let app = build_router(AppState::new(config));

    info!(%addr, "realtime-hub v{} listening", env!("CARGO_PKG_VERSION"));
    axum::serve(TcpListener::bind(addr).await?, app).await?;

    Ok(())
}
