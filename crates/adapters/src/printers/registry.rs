//! Printer Registry
//!
//! Cached status for every known printer. Reads are snapshot-based and never
//! block on OS I/O; callers accept up to one health-period of staleness in
//! exchange for request threads that cannot hang on a wedged enumeration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use labelpress_core::{
    BreakerRegistry, PrintError, PrinterDirectory, PrinterRecord, PrinterStatus, Result,
};

use super::discovery::{DiscoveredPrinter, PrinterProbe};

/// Probes per health pass; bounded to avoid OS saturation
const PROBES_PER_PASS: usize = 3;
/// Gap between consecutive probes in one pass
const INTER_PROBE_GAP: Duration = Duration::from_millis(100);
/// Consecutive failures beyond this put a printer in cooldown
const FAILING_GUARD_THRESHOLD: u32 = 3;
/// Cooldown window measured from the last failed probe
const FAILING_GUARD_WINDOW_MINS: i64 = 5;

pub struct PrinterRegistry {
    records: RwLock<HashMap<String, PrinterRecord>>,
    probe: Arc<dyn PrinterProbe>,
    breakers: Arc<BreakerRegistry>,
    probe_timeout: Duration,
    /// Guard flag: a health pass never overlaps itself
    health_pass_running: AtomicBool,
    discovery_ok: AtomicBool,
}

impl PrinterRegistry {
    pub fn new(
        probe: Arc<dyn PrinterProbe>,
        breakers: Arc<BreakerRegistry>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            probe,
            breakers,
            probe_timeout,
            health_pass_running: AtomicBool::new(false),
            discovery_ok: AtomicBool::new(true),
        }
    }

    /// Enumerate OS printers and merge into the registry. An enumeration
    /// timeout leaves an empty (or stale) registry rather than failing
    /// startup; records are never destroyed, re-discovery revives them.
    pub async fn discover(&self) {
        match self.probe.enumerate().await {
            Ok(found) => {
                let count = found.len();
                self.merge(found);
                self.discovery_ok.store(true, Ordering::SeqCst);
                info!("printer discovery found {} printer(s)", count);
            }
            Err(e) => {
                self.discovery_ok.store(false, Ordering::SeqCst);
                warn!("printer discovery failed, keeping cached registry: {}", e);
            }
        }
    }

    fn merge(&self, found: Vec<DiscoveredPrinter>) {
        let now = Utc::now();
        let mut records = self.records.write();
        for printer in found {
            match records.get_mut(&printer.name) {
                Some(record) => {
                    // Preserve error counters across re-discovery.
                    record.status = printer.status;
                    record.driver = printer.driver;
                    record.port = printer.port;
                    record.checked_at = now;
                }
                None => {
                    let mut record = PrinterRecord::new(printer.name.clone(), printer.status);
                    record.driver = printer.driver;
                    record.port = printer.port;
                    records.insert(printer.name, record);
                }
            }
        }
    }

    /// One health tick: probe up to three oldest-checked printers, spaced
    /// out, each under its own deadline. Overlapping ticks are skipped.
    pub async fn run_health_pass(&self) {
        if self.health_pass_running.swap(true, Ordering::SeqCst) {
            debug!("previous health pass still running, skipping tick");
            return;
        }

        let targets: Vec<String> = {
            let records = self.records.read();
            let mut entries: Vec<_> = records.values().collect();
            entries.sort_by_key(|r| r.checked_at);
            entries
                .iter()
                .take(PROBES_PER_PASS)
                .map(|r| r.name.clone())
                .collect()
        };

        for (i, name) in targets.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(INTER_PROBE_GAP).await;
            }
            let outcome =
                match tokio::time::timeout(self.probe_timeout, self.probe.probe(name)).await {
                    Ok(Ok(status)) => Ok(status),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("probe exceeded {:?}", self.probe_timeout)),
                };
            self.apply_probe(name, outcome);
        }

        self.health_pass_running.store(false, Ordering::SeqCst);
    }

    fn apply_probe(&self, name: &str, outcome: std::result::Result<PrinterStatus, String>) {
        let now = Utc::now();
        let mut records = self.records.write();
        let Some(record) = records.get_mut(name) else {
            return;
        };
        record.checked_at = now;
        match outcome {
            Ok(status) => {
                if status != record.status {
                    info!(
                        "printer '{}' transitioned {} -> {}",
                        name, record.status, status
                    );
                }
                record.status = status;
                if status == PrinterStatus::Online {
                    record.consecutive_failures = 0;
                }
            }
            Err(e) => {
                record.consecutive_failures += 1;
                record.last_error_at = Some(now);
                if record.status != PrinterStatus::Error {
                    info!(
                        "printer '{}' transitioned {} -> {} ({})",
                        name,
                        record.status,
                        PrinterStatus::Error,
                        e
                    );
                }
                record.status = PrinterStatus::Error;
                debug!(
                    "probe for '{}' failed ({} consecutive): {}",
                    name, record.consecutive_failures, e
                );
            }
        }
    }
}

impl PrinterDirectory for PrinterRegistry {
    fn list(&self) -> Vec<PrinterRecord> {
        self.records.read().values().cloned().collect()
    }

    fn get(&self, name: &str) -> Option<PrinterRecord> {
        self.records.read().get(name).cloned()
    }

    fn check_available(&self, name: &str) -> Result<()> {
        let records = self.records.read();
        let Some(record) = records.get(name) else {
            return Err(PrintError::UnavailablePrinter(format!(
                "printer '{}' not found",
                name
            )));
        };
        if record.status != PrinterStatus::Online {
            return Err(PrintError::UnavailablePrinter(format!(
                "printer '{}' is {}",
                name, record.status
            )));
        }
        self.breakers.check(name)?;
        if record.consecutive_failures > FAILING_GUARD_THRESHOLD {
            if let Some(at) = record.last_error_at {
                if Utc::now() - at < chrono::Duration::minutes(FAILING_GUARD_WINDOW_MINS) {
                    return Err(PrintError::UnavailablePrinter(format!(
                        "printer '{}' is failing health checks",
                        name
                    )));
                }
            }
        }
        Ok(())
    }

    fn discovery_ok(&self) -> bool {
        self.discovery_ok.load(Ordering::SeqCst)
    }

    fn mark_job_start(&self, name: &str) {
        if let Some(record) = self.records.write().get_mut(name) {
            record.active_jobs += 1;
        }
    }

    fn mark_job_end(&self, name: &str, success: bool) {
        if let Some(record) = self.records.write().get_mut(name) {
            record.active_jobs = record.active_jobs.saturating_sub(1);
            if success {
                record.last_completed_at = Some(Utc::now());
                record.consecutive_failures = 0;
            } else {
                record.consecutive_failures += 1;
                record.last_error_at = Some(Utc::now());
            }
        }
    }
}
