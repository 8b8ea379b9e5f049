//! Server Bootstrap
//!
//! Builds every component once, wires them together, and hands back a
//! deterministic shutdown path. Configuration failures are the only fatal
//! startup errors; a failed printer discovery or an absent browser degrade
//! at their component boundary instead.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use labelpress_adapters::{
    AppConfig, ChromeRenderer, ChromeRendererConfig, CimPrinterProbe, ConfigError, HealthLoop,
    PrinterRegistry, SpoolerConfig, SpoolerInvoker, ZebraControl, ZebraControlConfig,
};
use labelpress_core::{BreakerRegistry, PrinterDirectory, Renderer};
use labelpress_scheduler::{
    Dispatcher, DispatcherConfig, DispatcherHandle, MetricsAggregator, PrintQueue, QueueConfig,
};

use crate::middleware::RateLimiter;
use crate::state::AppState;

/// Metrics snapshot refresh period
const METRICS_REFRESH: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    General(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Everything the running server owns
pub struct ServerComponents {
    pub state: AppState,
    dispatcher: DispatcherHandle,
    renderer: Arc<ChromeRenderer>,
    background: Vec<JoinHandle<()>>,
}

/// Build and start all components.
pub async fn initialize_server(config: AppConfig) -> Result<ServerComponents> {
    info!("🚀 Initializing labelpress print server");

    let config = Arc::new(config);
    let breakers = Arc::new(BreakerRegistry::default());

    // Printer registry: discover now, keep fresh in the background.
    let probe = Arc::new(CimPrinterProbe::new(
        config.printers.discovery_timeout(),
        config.printers.probe_timeout(),
    ));
    let registry = Arc::new(PrinterRegistry::new(
        probe,
        breakers.clone(),
        config.printers.probe_timeout(),
    ));
    registry.discover().await;
    let health_task = HealthLoop::start(
        registry.clone(),
        config.printers.health_check_interval(),
    );

    // Renderer: the browser process launches lazily on first render.
    let renderer = ChromeRenderer::new(ChromeRendererConfig {
        chrome_path: config.renderer.chrome_path.clone().map(PathBuf::from),
        ..ChromeRendererConfig::default()
    });
    let heartbeat_task = renderer.start_heartbeat();

    let spooler = Arc::new(SpoolerInvoker::new(SpoolerConfig {
        binary: PathBuf::from(&config.spooler.path),
        work_dir: PathBuf::from(&config.spooler.work_dir),
        ..SpoolerConfig::default()
    }));
    let zebra = Arc::new(ZebraControl::new(ZebraControlConfig {
        work_dir: PathBuf::from(&config.spooler.work_dir),
        ..ZebraControlConfig::default()
    }));

    let queue = PrintQueue::new(QueueConfig {
        max_size: config.queue.max_queue_size,
        max_retries: config.queue.max_retries,
        retry_delay: config.queue.retry_delay(),
        ..QueueConfig::default()
    });

    let metrics = Arc::new(MetricsAggregator::new());
    let metrics_task = metrics.start(
        queue.clone(),
        registry.clone() as Arc<dyn PrinterDirectory>,
        renderer.clone() as Arc<dyn Renderer>,
        breakers.clone(),
        METRICS_REFRESH,
    );

    let dispatcher = Dispatcher::new(
        queue.clone(),
        registry.clone(),
        breakers.clone(),
        renderer.clone(),
        spooler,
        metrics.clone(),
        DispatcherConfig {
            max_concurrent_jobs: config.queue.max_concurrent_jobs,
            batch_size: config.queue.batch_size,
            processing_timeout: config.queue.processing_timeout(),
            ..DispatcherConfig::default()
        },
    )
    .start();

    let rate_limiter = Arc::new(RateLimiter::new(
        config.http.rate_limit_max,
        config.http.rate_limit_window(),
    ));

    log_config_summary(&config);
    info!("✅ Server bootstrap complete");

    let state = AppState {
        queue,
        printers: registry,
        breakers,
        renderer: renderer.clone(),
        metrics,
        zebra,
        config,
        rate_limiter,
        started_at: Instant::now(),
    };

    Ok(ServerComponents {
        state,
        dispatcher,
        renderer,
        background: vec![health_task, heartbeat_task, metrics_task],
    })
}

/// Deterministic teardown: stop admitting, drain with grace, abort timers,
/// drop the browser. Safe to call exactly once per bootstrap.
pub async fn shutdown(components: ServerComponents) {
    info!("shutting down");
    components.state.queue.shutdown();
    components.dispatcher.shutdown().await;
    for task in components.background {
        task.abort();
    }
    components.renderer.teardown().await;
    info!("shutdown complete");
}

/// Log the effective configuration at startup.
pub fn log_config_summary(config: &AppConfig) {
    info!("📋 Configuration:");
    info!("   Server: {}:{}", config.server.host, config.server.port);
    info!(
        "   Queue: capacity {}, {} concurrent, batch {}",
        config.queue.max_queue_size, config.queue.max_concurrent_jobs, config.queue.batch_size
    );
    info!(
        "   Retries: {} max, {}ms base delay, {}ms processing timeout",
        config.queue.max_retries, config.queue.retry_delay_ms, config.queue.processing_timeout_ms
    );
    info!(
        "   Printers: health every {:?}, discovery timeout {:?}",
        config.printers.health_check_interval(),
        config.printers.discovery_timeout()
    );
    info!(
        "   Spooler: {} (work dir {})",
        config.spooler.path, config.spooler.work_dir
    );
    info!(
        "   Rate limit: {} requests / {:?}",
        config.http.rate_limit_max,
        config.http.rate_limit_window()
    );
}
