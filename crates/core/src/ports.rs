//! Ports to the outside world
//!
//! The scheduler consumes the renderer, the spooler and the printer
//! directory through these traits. The implementations own the external
//! processes; the scheduler only invokes them. Tests substitute mocks.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::label::{Margins, Orientation, PrintLabel};
use crate::printer::PrinterRecord;

/// Page geometry handed to the renderer, in renderer-dialect length strings
#[derive(Debug, Clone, PartialEq)]
pub struct PageGeometry {
    pub width: String,
    pub height: String,
    pub margins: Margins,
    pub landscape: bool,
}

impl PageGeometry {
    pub fn for_label(label: &PrintLabel) -> Self {
        Self {
            width: label.width.clone(),
            height: label.height.clone(),
            margins: label.margins.clone(),
            landscape: label.orientation == Some(Orientation::Landscape),
        }
    }
}

/// Renderer pool health snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct RendererStatus {
    pub available: bool,
    pub renders: u64,
    pub failures: u64,
    pub recycles: u64,
}

/// HTML to PDF conversion capability.
///
/// Backed by an external headless-browser process the implementation owns and
/// self-heals; callers never manage that lifecycle beyond asking for a
/// recycle.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render an HTML document to PDF bytes sized to the given geometry.
    async fn render(&self, html: &str, geometry: &PageGeometry) -> Result<Vec<u8>>;

    async fn status(&self) -> RendererStatus;

    /// Tear down and relaunch the backing browser process.
    async fn recycle(&self) -> Result<()>;
}

/// Hands a rendered PDF to a named OS printer
#[async_trait]
pub trait Spooler: Send + Sync {
    async fn spool(&self, pdf: &[u8], printer_name: &str) -> Result<()>;
}

/// Cached, non-blocking view of the OS printer set.
///
/// Reads are snapshot-based and may be up to one health-check period stale;
/// they never wait on OS enumeration.
pub trait PrinterDirectory: Send + Sync {
    fn list(&self) -> Vec<PrinterRecord>;

    fn get(&self, name: &str) -> Option<PrinterRecord>;

    /// Full admission gate: record exists, status online, breaker allows,
    /// and the printer is not in a failing-health cooldown.
    fn check_available(&self, name: &str) -> Result<()>;

    fn is_available(&self, name: &str) -> bool {
        self.check_available(name).is_ok()
    }

    /// Whether the last discovery pass completed (false after an enumeration
    /// timeout, so the HTTP layer can attach a warning).
    fn discovery_ok(&self) -> bool {
        true
    }

    fn mark_job_start(&self, name: &str);

    fn mark_job_end(&self, name: &str, success: bool);
}
