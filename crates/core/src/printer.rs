//! Printer records and status
//!
//! Cached view of the OS printer set. Records are created at discovery,
//! revived on re-discovery, and never destroyed while the process lives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observed printer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterStatus {
    Online,
    Offline,
    Busy,
    Error,
}

impl PrinterStatus {
    /// Map the OS enumeration status integer. Anything outside the known
    /// codes is treated as offline.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => PrinterStatus::Online,
            1 => PrinterStatus::Offline,
            2 => PrinterStatus::Error,
            _ => PrinterStatus::Offline,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrinterStatus::Online => "online",
            PrinterStatus::Offline => "offline",
            PrinterStatus::Busy => "busy",
            PrinterStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for PrinterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One known printer and its health bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterRecord {
    pub name: String,
    pub port: Option<String>,
    pub driver: Option<String>,
    pub status: PrinterStatus,
    /// Jobs currently being processed against this printer
    pub active_jobs: u32,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error_at: Option<DateTime<Utc>>,
    /// When the status was last probed or discovered
    pub checked_at: DateTime<Utc>,
}

impl PrinterRecord {
    pub fn new(name: impl Into<String>, status: PrinterStatus) -> Self {
        Self {
            name: name.into(),
            port: None,
            driver: None,
            status,
            active_jobs: 0,
            last_completed_at: None,
            consecutive_failures: 0,
            last_error_at: None,
            checked_at: Utc::now(),
        }
    }

    /// Status as reported to clients: an online printer with work in flight
    /// shows as busy.
    pub fn effective_status(&self) -> PrinterStatus {
        if self.status == PrinterStatus::Online && self.active_jobs > 0 {
            PrinterStatus::Busy
        } else {
            self.status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_per_contract() {
        assert_eq!(PrinterStatus::from_code(0), PrinterStatus::Online);
        assert_eq!(PrinterStatus::from_code(1), PrinterStatus::Offline);
        assert_eq!(PrinterStatus::from_code(2), PrinterStatus::Error);
        // Unknown codes degrade to offline rather than error.
        assert_eq!(PrinterStatus::from_code(3), PrinterStatus::Offline);
        assert_eq!(PrinterStatus::from_code(-1), PrinterStatus::Offline);
        assert_eq!(PrinterStatus::from_code(99), PrinterStatus::Offline);
    }

    #[test]
    fn online_printer_with_work_reads_busy() {
        let mut r = PrinterRecord::new("ZD420", PrinterStatus::Online);
        assert_eq!(r.effective_status(), PrinterStatus::Online);
        r.active_jobs = 2;
        assert_eq!(r.effective_status(), PrinterStatus::Busy);
        r.status = PrinterStatus::Error;
        assert_eq!(r.effective_status(), PrinterStatus::Error);
    }
}
