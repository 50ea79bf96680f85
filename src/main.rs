use anyhow::{Context, Result};
use shuttle::{Provider, config, router};
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    Registry::default().with(EnvFilter::new(config::get_log_filter())).with(fmt::layer()).init();

    let address = config::get_bind_address();
    let listener =
        TcpListener::bind(&address).await.with_context(|| format!("binding {address}"))?;
    tracing::info!(address = %address, "shuttle listening");

    axum::serve(listener, router(Provider::from_env()))
        .with_graceful_shutdown(shutdown())
        .await
        .context("serving http")?;
    Ok(())
}

async fn shutdown() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
