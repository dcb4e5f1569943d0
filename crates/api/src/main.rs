use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use pricewatch_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pricewatch_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let services = Arc::new(
        pricewatch_api::app::services::build_services(&config)
            .await
            .context("failed to wire services")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = services.spawn_workers(config.monitor.schedule(), shutdown_rx);

    let app = pricewatch_api::app::build_app(services);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    // In-flight ticks and sends finish before the workers return.
    let _ = shutdown_tx.send(true);
    for worker in workers {
        if let Err(err) = worker.await {
            tracing::error!(error = %err, "background worker panicked");
        }
    }
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
