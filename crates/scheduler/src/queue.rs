//! Bounded Priority Queue
//!
//! In-memory job store ordered by (priority desc, admission order asc).
//! Capacity covers queued plus in-flight jobs; terminal jobs are retained in
//! capped maps with oldest-first eviction. Failed jobs with retry budget left
//! are re-admitted after a linear backoff delay.

use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use labelpress_core::{JobEvent, JobEventBus, JobId, PrintError, PrintJob, PrintRequest, Result};

/// Queue tuning
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Capacity across queued + in-flight jobs; admission past it fails
    pub max_size: usize,
    pub max_retries: u32,
    /// Base retry delay; attempt n waits `retry_delay * n` (linear backoff)
    pub retry_delay: Duration,
    pub completed_retention: usize,
    pub failed_retention: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            completed_retention: 1000,
            failed_retention: 500,
        }
    }
}

/// Counts per lifecycle bucket
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueCounts {
    pub queued: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueEntry {
    id: JobId,
    rank: u8,
    seq: u64,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher priority first, then earlier admission (lower seq).
        self.rank
            .cmp(&other.rank)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    config: QueueConfig,
    heap: BinaryHeap<QueueEntry>,
    queued: HashMap<JobId, PrintJob>,
    in_flight: HashMap<JobId, PrintJob>,
    completed: HashMap<JobId, PrintJob>,
    failed: HashMap<JobId, PrintJob>,
    retry_tasks: Vec<JoinHandle<()>>,
    shutting_down: bool,
}

/// Handle to the shared queue; cheap to clone.
#[derive(Clone)]
pub struct PrintQueue {
    inner: Arc<Mutex<Inner>>,
    events: JobEventBus,
    seq: Arc<AtomicU64>,
}

impl PrintQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                config,
                heap: BinaryHeap::new(),
                queued: HashMap::new(),
                in_flight: HashMap::new(),
                completed: HashMap::new(),
                failed: HashMap::new(),
                retry_tasks: Vec::new(),
                shutting_down: false,
            })),
            events: JobEventBus::default(),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Admit one request as a new job. Fails with [`PrintError::QueueFull`]
    /// at capacity.
    pub fn admit(&self, request: PrintRequest) -> Result<JobId> {
        let mut inner = self.inner.lock();
        if inner.queued.len() + inner.in_flight.len() >= inner.config.max_size {
            return Err(PrintError::QueueFull);
        }
        let job = PrintJob::new(request);
        let id = job.id;
        let entry = QueueEntry {
            id,
            rank: job.request.priority.rank(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        inner.heap.push(entry);
        inner.queued.insert(id, job);
        debug!("admitted job {} ({} queued)", id, inner.queued.len());
        Ok(id)
    }

    /// Pull up to `up_to` highest-ranked jobs, marking each in-flight.
    /// Concurrent callers receive disjoint batches.
    pub fn take(&self, up_to: usize) -> Vec<PrintJob> {
        let mut inner = self.inner.lock();
        let mut batch = Vec::new();
        while batch.len() < up_to {
            let Some(entry) = inner.heap.pop() else { break };
            // Entries can outlive their job (retry re-push); skip stale ones.
            let Some(mut job) = inner.queued.remove(&entry.id) else {
                continue;
            };
            if let Err(e) = job.start() {
                error!("job {} could not start: {}", entry.id, e);
                continue;
            }
            inner.in_flight.insert(entry.id, job.clone());
            batch.push(job);
        }
        batch
    }

    /// Settle an in-flight job. Success retains it in the completed map;
    /// retryable failures with budget left are re-admitted after a backoff
    /// delay, everything else lands in the failed map.
    pub fn complete(&self, id: JobId, outcome: Result<()>) -> Result<()> {
        let mut inner = self.inner.lock();
        let Some(mut job) = inner.in_flight.remove(&id) else {
            return Err(PrintError::Internal(format!(
                "job {} is not in flight",
                id
            )));
        };

        match outcome {
            Ok(()) => {
                job.complete()?;
                let processing_ms = job.processing_ms().unwrap_or(0);
                inner.completed.insert(id, job);
                let cap = inner.config.completed_retention;
                Self::evict_oldest(&mut inner.completed, cap);
                drop(inner);
                self.events.publish(JobEvent::Completed { id, processing_ms });
            }
            Err(e) => {
                let has_budget = job.request.retry_count < inner.config.max_retries;
                if e.is_retryable() && has_budget {
                    job.requeue(&e)?;
                    let attempt = job.request.retry_count;
                    let delay = inner.config.retry_delay * attempt;
                    let queue = self.clone();
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        queue.readmit(job);
                    });
                    inner.retry_tasks.retain(|h| !h.is_finished());
                    inner.retry_tasks.push(handle);
                    drop(inner);
                    debug!(
                        "job {} scheduled for retry {} in {:?}: {}",
                        id, attempt, delay, e
                    );
                    self.events.publish(JobEvent::Retry {
                        id,
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                    });
                } else {
                    job.fail(&e)?;
                    inner.failed.insert(id, job);
                    let cap = inner.config.failed_retention;
                    Self::evict_oldest(&mut inner.failed, cap);
                    drop(inner);
                    self.events.publish(JobEvent::Failed {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Re-insert a retried job once its backoff has elapsed.
    fn readmit(&self, mut job: PrintJob) {
        let mut inner = self.inner.lock();
        if inner.shutting_down {
            return;
        }
        let id = job.id;
        if inner.queued.len() + inner.in_flight.len() >= inner.config.max_size {
            warn!("queue full at retry re-admission, failing job {}", id);
            if job.fail(&PrintError::QueueFull).is_ok() {
                inner.failed.insert(id, job);
                let cap = inner.config.failed_retention;
                Self::evict_oldest(&mut inner.failed, cap);
            }
            drop(inner);
            self.events.publish(JobEvent::Failed {
                id,
                error: PrintError::QueueFull.to_string(),
            });
            return;
        }
        let entry = QueueEntry {
            id,
            rank: job.request.priority.rank(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        inner.heap.push(entry);
        inner.queued.insert(id, job);
        debug!("re-admitted job {} for retry", id);
    }

    /// Search all buckets for a job.
    pub fn get(&self, id: JobId) -> Option<PrintJob> {
        let inner = self.inner.lock();
        inner
            .queued
            .get(&id)
            .or_else(|| inner.in_flight.get(&id))
            .or_else(|| inner.completed.get(&id))
            .or_else(|| inner.failed.get(&id))
            .cloned()
    }

    pub fn status(&self) -> QueueCounts {
        let inner = self.inner.lock();
        QueueCounts {
            queued: inner.queued.len(),
            in_flight: inner.in_flight.len(),
            completed: inner.completed.len(),
            failed: inner.failed.len(),
        }
    }

    pub fn in_flight_ids(&self) -> Vec<JobId> {
        self.inner.lock().in_flight.keys().copied().collect()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Stop accepting retry re-admissions and cancel pending backoff timers.
    /// Idempotent.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.shutting_down = true;
        for task in inner.retry_tasks.drain(..) {
            task.abort();
        }
    }

    fn evict_oldest(map: &mut HashMap<JobId, PrintJob>, cap: usize) {
        while map.len() > cap {
            let oldest = map
                .iter()
                .min_by_key(|(_, job)| job.finished_at)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    map.remove(&id);
                }
                None => break,
            }
        }
    }
}
