use anyhow::Context;

use fiscalbridge_api::app::{self, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fiscalbridge_observability::init();

    let config = AppConfig::from_env();
    let app = app::build_app(&config)
        .await
        .context("failed to build services")?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        persistent = config.use_persistent_stores,
        poll_interval_ms = config.dispatch.poll_interval_ms,
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
