//! Job lifecycle events
//!
//! A typed broadcast channel feeds observers (metrics, logs). Producers never
//! block: slow consumers lag and drop, they do not back-pressure the queue.

use tokio::sync::broadcast;

use crate::job::JobId;

/// Events emitted by the queue as jobs settle
#[derive(Debug, Clone)]
pub enum JobEvent {
    Completed { id: JobId, processing_ms: u64 },
    Failed { id: JobId, error: String },
    Retry { id: JobId, attempt: u32, delay_ms: u64 },
}

/// Publish side of the job event channel
#[derive(Debug, Clone)]
pub struct JobEventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl JobEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Fire-and-forget publish; a send with no subscribers is not an error.
    pub fn publish(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for JobEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = JobEventBus::new(8);
        let mut rx = bus.subscribe();
        let id = JobId::new();
        bus.publish(JobEvent::Completed {
            id,
            processing_ms: 120,
        });
        match rx.recv().await.unwrap() {
            JobEvent::Completed { id: got, .. } => assert_eq!(got, id),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let bus = JobEventBus::new(8);
        bus.publish(JobEvent::Failed {
            id: JobId::new(),
            error: "x".into(),
        });
    }
}
