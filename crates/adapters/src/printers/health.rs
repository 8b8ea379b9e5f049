//! Background health loop
//!
//! A single ticker driving the registry's bounded health pass. The registry
//! itself guards against overlapping passes; this loop only provides the
//! cadence and is aborted at shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use super::registry::PrinterRegistry;

pub struct HealthLoop;

impl HealthLoop {
    pub fn start(registry: Arc<PrinterRegistry>, period: Duration) -> JoinHandle<()> {
        info!("printer health loop started (period {:?})", period);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Discovery already ran at startup; skip the immediate first tick.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                registry.run_health_pass().await;
            }
        })
    }
}
