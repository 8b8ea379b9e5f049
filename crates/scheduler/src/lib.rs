//! labelpress-scheduler: job scheduling and execution
//!
//! The core of the server: a bounded priority queue with retry backoff and
//! capped terminal-state retention, a concurrency-capped dispatcher that runs
//! each job in an isolated task, and the metrics aggregator observing both.

pub mod dispatcher;
pub mod metrics;
pub mod queue;

pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherHandle};
pub use metrics::{MetricsAggregator, MetricsSnapshot};
pub use queue::{PrintQueue, QueueConfig, QueueCounts};
