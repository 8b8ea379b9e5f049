//! Application state
//!
//! The composition root's output: every handler receives this by clone.
//! Built once at startup and passed explicitly; there are no globals.

use std::sync::Arc;
use std::time::Instant;

use labelpress_adapters::{AppConfig, ZebraControl};
use labelpress_core::{BreakerRegistry, PrinterDirectory, Renderer};
use labelpress_scheduler::{MetricsAggregator, PrintQueue};

use crate::middleware::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub queue: PrintQueue,
    pub printers: Arc<dyn PrinterDirectory>,
    pub breakers: Arc<BreakerRegistry>,
    pub renderer: Arc<dyn Renderer>,
    pub metrics: Arc<MetricsAggregator>,
    pub zebra: Arc<ZebraControl>,
    pub config: Arc<AppConfig>,
    pub rate_limiter: Arc<RateLimiter>,
    pub started_at: Instant,
}
