//! Metrics Aggregator
//!
//! Windowed counters and timing accumulators for operator visibility. Job
//! events feed the counters; a periodic ticker folds queue, registry and
//! renderer state into a snapshot so reads stay O(1) and never touch the
//! hot-path locks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::warn;

use labelpress_core::{
    BreakerRegistry, JobEvent, PrinterDirectory, PrinterStatus, Renderer, RendererStatus,
};

use crate::queue::PrintQueue;

/// Incremental mean/variance over completed-job processing times
/// (Welford's update; completed jobs only).
#[derive(Debug, Default)]
struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn update(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    fn std_dev(&self) -> f64 {
        if self.count > 1 {
            (self.m2 / (self.count - 1) as f64).sqrt()
        } else {
            0.0
        }
    }
}

/// Last-computed metrics view returned to readers
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub retries: u64,
    pub queued: usize,
    pub in_flight: usize,
    pub total_printers: usize,
    pub active_printers: usize,
    pub renderer: RendererStatus,
    pub renderer_recycles: u64,
    pub breaker_trips: u64,
    pub avg_processing_ms: f64,
    pub processing_std_dev_ms: f64,
    pub measured_jobs: u64,
    pub refreshed_at: DateTime<Utc>,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            total_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            retries: 0,
            queued: 0,
            in_flight: 0,
            total_printers: 0,
            active_printers: 0,
            renderer: RendererStatus::default(),
            renderer_recycles: 0,
            breaker_trips: 0,
            avg_processing_ms: 0.0,
            processing_std_dev_ms: 0.0,
            measured_jobs: 0,
            refreshed_at: Utc::now(),
        }
    }
}

/// Counter and gauge owner; shared across the dispatcher and the HTTP layer
pub struct MetricsAggregator {
    total_jobs: AtomicU64,
    completed_jobs: AtomicU64,
    failed_jobs: AtomicU64,
    retries: AtomicU64,
    renderer_recycles: AtomicU64,
    processing: Mutex<Welford>,
    snapshot: RwLock<MetricsSnapshot>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            total_jobs: AtomicU64::new(0),
            completed_jobs: AtomicU64::new(0),
            failed_jobs: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            renderer_recycles: AtomicU64::new(0),
            processing: Mutex::new(Welford::default()),
            snapshot: RwLock::new(MetricsSnapshot::default()),
        }
    }

    /// One job admitted to the queue.
    pub fn record_admitted(&self) {
        self.total_jobs.fetch_add(1, Ordering::Relaxed);
    }

    /// Dispatcher forced a renderer recycle.
    pub fn record_renderer_recycle(&self) {
        self.renderer_recycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Last-computed snapshot; never blocks on queue or registry locks.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot.read().clone()
    }

    /// Spawn the observer: folds job events into counters and refreshes the
    /// gauge snapshot on a fixed period. The returned handle is aborted at
    /// shutdown.
    pub fn start(
        self: &Arc<Self>,
        queue: PrintQueue,
        printers: Arc<dyn PrinterDirectory>,
        renderer: Arc<dyn Renderer>,
        breakers: Arc<BreakerRegistry>,
        refresh_interval: Duration,
    ) -> JoinHandle<()> {
        let metrics = self.clone();
        let mut events = queue.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(JobEvent::Completed { processing_ms, .. }) => {
                            metrics.completed_jobs.fetch_add(1, Ordering::Relaxed);
                            metrics.processing.lock().update(processing_ms as f64);
                        }
                        Ok(JobEvent::Failed { .. }) => {
                            metrics.failed_jobs.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(JobEvent::Retry { .. }) => {
                            metrics.retries.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(RecvError::Lagged(n)) => {
                            warn!("metrics observer lagged, dropped {} job events", n);
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = ticker.tick() => {
                        metrics
                            .refresh(&queue, printers.as_ref(), renderer.as_ref(), &breakers)
                            .await;
                    }
                }
            }
        })
    }

    async fn refresh(
        &self,
        queue: &PrintQueue,
        printers: &dyn PrinterDirectory,
        renderer: &dyn Renderer,
        breakers: &BreakerRegistry,
    ) {
        let counts = queue.status();
        let records = printers.list();
        let active = records
            .iter()
            .filter(|r| matches!(r.status, PrinterStatus::Online))
            .count();
        let renderer_status = renderer.status().await;
        let (mean, std_dev, measured) = {
            let w = self.processing.lock();
            (w.mean, w.std_dev(), w.count)
        };

        let snapshot = MetricsSnapshot {
            total_jobs: self.total_jobs.load(Ordering::Relaxed),
            completed_jobs: self.completed_jobs.load(Ordering::Relaxed),
            failed_jobs: self.failed_jobs.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            queued: counts.queued,
            in_flight: counts.in_flight,
            total_printers: records.len(),
            active_printers: active,
            renderer: renderer_status,
            renderer_recycles: self.renderer_recycles.load(Ordering::Relaxed),
            breaker_trips: breakers.trip_count(),
            avg_processing_ms: mean,
            processing_std_dev_ms: std_dev,
            measured_jobs: measured,
            refreshed_at: Utc::now(),
        };
        *self.snapshot.write() = snapshot;
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welford_mean_matches_arithmetic_mean() {
        let mut w = Welford::default();
        for x in [10.0, 20.0, 30.0, 40.0] {
            w.update(x);
        }
        assert!((w.mean - 25.0).abs() < f64::EPSILON);
        assert_eq!(w.count, 4);
    }

    #[test]
    fn welford_std_dev_of_constant_series_is_zero() {
        let mut w = Welford::default();
        for _ in 0..5 {
            w.update(42.0);
        }
        assert!(w.std_dev().abs() < 1e-9);
    }

    #[test]
    fn welford_std_dev_matches_sample_deviation() {
        let mut w = Welford::default();
        for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            w.update(x);
        }
        // Sample std dev of the series is ~2.138.
        assert!((w.std_dev() - 2.138).abs() < 0.01);
    }

    #[test]
    fn counters_accumulate() {
        let m = MetricsAggregator::new();
        m.record_admitted();
        m.record_admitted();
        m.record_renderer_recycle();
        assert_eq!(m.total_jobs.load(Ordering::Relaxed), 2);
        assert_eq!(m.renderer_recycles.load(Ordering::Relaxed), 1);
    }
}
