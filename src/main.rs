use anyhow::Context;

use invoice_inbox::app::build_state;
use invoice_inbox::channels::router;
use invoice_inbox::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let state = build_state(&config)
        .await
        .context("Failed to initialise the invoice pipeline")?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    tracing::info!(
        addr = %config.server.bind_addr,
        version = env!("CARGO_PKG_VERSION"),
        "Invoice inbox listening"
    );
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
