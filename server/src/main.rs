//! labelpress server binary

use tracing::info;
use tracing_subscriber::EnvFilter;

use labelpress_adapters::AppConfig;
use labelpress_server::{api_router, bootstrap};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LABELPRESS_LOG")
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Configuration is the only fatal startup concern.
    let config = AppConfig::load()?;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if config.server.workers > 0 {
        builder.worker_threads(config.server.workers);
    }
    let runtime = builder.build()?;
    runtime.block_on(run(config))
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    info!(
        "🚀 Starting labelpress print server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let bind = format!("{}:{}", config.server.host, config.server.port);
    let components = bootstrap::initialize_server(config).await?;
    let app = api_router::build_router(components.state.clone());

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("🌐 Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bootstrap::shutdown(components).await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
