use adsim_server::{AppState, SimConfig, build_app, logging};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SimConfig::load()?;
    logging::init(&config.log_filter);

    let state = AppState::from_config(&config);
    let listener = TcpListener::bind(config.bind).await?;
    info!(
        bind = %config.bind,
        linkedin_version = %config.linkedin_version,
        rate_limit = ?config.rate_limit_per_minute,
        "adsim server listening"
    );
    axum::serve(listener, build_app(state)).await?;
    Ok(())
}
