//! Zebra media reset
//!
//! Sends the printer-level ZPL calibration sequence by writing it to a temp
//! file and copying that file to the printer name. The payload is bit-exact;
//! the printers reject reordered or partial sequences.

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use labelpress_core::{PrintError, Result};

use crate::spooler::{run_capped, schedule_cleanup, unique_spool_path};

/// ZPL sequence restoring wristband media settings, line by line.
pub const MEDIA_RESET_SEQUENCE: [&str; 15] = [
    "~SD20",
    "~JSN",
    "^XA",
    "^SZ2",
    "^PW203",
    "^LL2030",
    "^POI",
    "^PMN",
    "^MNM",
    "^LS0",
    "^MTT",
    "^MMT,N",
    "^MPE",
    "^XZ",
    "^XA^JUS^XZ",
];

#[derive(Debug, Clone)]
pub struct ZebraControlConfig {
    pub work_dir: PathBuf,
    pub timeout: Duration,
    pub cleanup_delay: Duration,
}

impl Default for ZebraControlConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("spool"),
            timeout: Duration::from_secs(10),
            cleanup_delay: Duration::from_secs(2),
        }
    }
}

/// Raw ZPL channel to Zebra printers
pub struct ZebraControl {
    config: ZebraControlConfig,
}

impl ZebraControl {
    pub fn new(config: ZebraControlConfig) -> Self {
        Self { config }
    }

    /// The payload written to the printer, with ZPL line endings.
    pub fn media_reset_payload() -> String {
        let mut payload = MEDIA_RESET_SEQUENCE.join("\r\n");
        payload.push_str("\r\n");
        payload
    }

    /// Push the media reset sequence to a printer by name.
    pub async fn reset_media(&self, printer_name: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.work_dir)
            .await
            .map_err(|e| {
                PrintError::SpoolFailed(format!("could not create spool directory: {}", e))
            })?;

        let path = unique_spool_path(&self.config.work_dir, "zpl_reset", "zpl");
        tokio::fs::write(&path, Self::media_reset_payload())
            .await
            .map_err(|e| {
                PrintError::SpoolFailed(format!("could not write {}: {}", path.display(), e))
            })?;

        // `copy <path> <printerName>` delivers raw ZPL to the Windows queue.
        let mut command = tokio::process::Command::new("cmd");
        command.arg("/C").arg("copy").arg(&path).arg(printer_name);
        let result = run_capped(command, self.config.timeout, "zpl copy").await;

        schedule_cleanup(path, self.config.cleanup_delay);
        if result.is_ok() {
            info!("media reset sent to '{}'", printer_name);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_sequence_is_bit_exact() {
        let payload = ZebraControl::media_reset_payload();
        let expected = "~SD20\r\n~JSN\r\n^XA\r\n^SZ2\r\n^PW203\r\n^LL2030\r\n^POI\r\n^PMN\r\n\
                        ^MNM\r\n^LS0\r\n^MTT\r\n^MMT,N\r\n^MPE\r\n^XZ\r\n^XA^JUS^XZ\r\n";
        assert_eq!(payload, expected);
    }

    #[test]
    fn sequence_opens_and_closes_label_format() {
        assert_eq!(MEDIA_RESET_SEQUENCE[2], "^XA");
        assert_eq!(MEDIA_RESET_SEQUENCE[13], "^XZ");
        assert_eq!(MEDIA_RESET_SEQUENCE[14], "^XA^JUS^XZ");
    }
}
