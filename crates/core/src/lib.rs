//! labelpress-core: domain model for the label print server
//!
//! Holds the types every other crate agrees on: labels and requests, the job
//! state machine, the error taxonomy, printer records, per-printer circuit
//! breakers, job events, and the ports through which the scheduler reaches
//! the renderer, the spooler and the printer directory.

pub mod circuit_breaker;
pub mod error;
pub mod events;
pub mod job;
pub mod label;
pub mod ports;
pub mod printer;

pub use circuit_breaker::{BreakerConfig, BreakerRegistry, BreakerState};
pub use error::{PrintError, Result};
pub use events::{JobEvent, JobEventBus};
pub use job::{JobId, JobState, PrintJob};
pub use label::{Margins, Orientation, PrintLabel, PrintMedia, PrintRequest, Priority};
pub use ports::{PageGeometry, PrinterDirectory, Renderer, RendererStatus, Spooler};
pub use printer::{PrinterRecord, PrinterStatus};
