//! Label Domain Types
//!
//! A *label* is one unit to render and print; a *copy* is one physical
//! impression of it. Batches arriving over HTTP are exploded into one
//! [`PrintRequest`] per label before they reach the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PrintError, Result};

/// Scheduling priority carried by a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Numeric rank used for queue ordering (higher dispatches first)
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }
}

/// Media class a label is printed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrintMedia {
    Wristband,
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Page margins in renderer-dialect length strings ("0.1in", "2mm", ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margins {
    pub top: String,
    pub right: String,
    pub bottom: String,
    pub left: String,
}

impl Margins {
    pub fn zero() -> Self {
        Self {
            top: "0".into(),
            right: "0".into(),
            bottom: "0".into(),
            left: "0".into(),
        }
    }
}

/// The unit of work: one label destined for one printer.
///
/// All fields are immutable once the label has been admitted; retries reuse
/// the request body bit-for-bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintLabel {
    pub printer_name: String,
    /// Decoded HTML document (base64 is stripped at the submission edge)
    pub html: String,
    /// Page width/height in renderer-dialect length strings
    pub width: String,
    pub height: String,
    pub margins: Margins,
    pub orientation: Option<Orientation>,
    pub copies: u8,
    pub user_id: Option<i64>,
    pub name: Option<String>,
    pub media: PrintMedia,
    pub group: Option<String>,
}

impl PrintLabel {
    pub const MAX_COPIES: u8 = 10;

    pub fn validate(&self) -> Result<()> {
        if self.printer_name.trim().is_empty() {
            return Err(PrintError::Validation("printer name is required".into()));
        }
        if self.html.is_empty() {
            return Err(PrintError::Validation("label HTML is empty".into()));
        }
        if self.width.trim().is_empty() || self.height.trim().is_empty() {
            return Err(PrintError::Validation(
                "page width and height are required".into(),
            ));
        }
        if [
            &self.margins.top,
            &self.margins.right,
            &self.margins.bottom,
            &self.margins.left,
        ]
        .iter()
        .any(|m| m.trim().is_empty())
        {
            return Err(PrintError::Validation("all four margins are required".into()));
        }
        if self.copies < 1 || self.copies > Self::MAX_COPIES {
            return Err(PrintError::Validation(format!(
                "copies must be between 1 and {}, got {}",
                Self::MAX_COPIES,
                self.copies
            )));
        }
        Ok(())
    }

    /// Whether the document already carries its own print rules.
    fn has_print_css(&self) -> bool {
        self.html.contains("@media print") || self.html.contains("@page")
    }

    /// HTML with a print stylesheet pinned to the label geometry.
    ///
    /// Documents that already declare `@media print` or `@page` are returned
    /// untouched; otherwise a `@page` block with the label's exact size and
    /// margins is injected into the head.
    pub fn printable_html(&self) -> String {
        if self.has_print_css() {
            return self.html.clone();
        }

        let style = format!(
            "<style>@page {{ size: {} {}; margin: {} {} {} {}; }} \
             html, body {{ margin: 0; padding: 0; }}</style>",
            self.width,
            self.height,
            self.margins.top,
            self.margins.right,
            self.margins.bottom,
            self.margins.left,
        );

        if let Some(pos) = self.html.find("</head>") {
            let mut out = String::with_capacity(self.html.len() + style.len());
            out.push_str(&self.html[..pos]);
            out.push_str(&style);
            out.push_str(&self.html[pos..]);
            out
        } else {
            format!("{}{}", style, self.html)
        }
    }
}

/// Scheduler envelope around a single label.
///
/// Carries the admission metadata the queue orders on. The retry counter is
/// the only field that changes after admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintRequest {
    pub id: Uuid,
    pub label: PrintLabel,
    pub priority: Priority,
    pub submitted_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl PrintRequest {
    pub fn new(label: PrintLabel, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4(),
            label,
            priority,
            submitted_at: Utc::now(),
            retry_count: 0,
        }
    }
}
