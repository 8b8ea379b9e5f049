//! OS printer discovery and probing
//!
//! Shells out to PowerShell CIM enumeration. Every invocation runs under an
//! explicit deadline with kill-on-timeout; the callee is never trusted to
//! honor its own timeout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use labelpress_core::{PrintError, PrinterStatus, Result};

/// One printer as reported by the OS
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPrinter {
    pub name: String,
    pub status: PrinterStatus,
    pub driver: Option<String>,
    pub port: Option<String>,
}

/// Printer enumeration and status probing; mocked in tests
#[async_trait]
pub trait PrinterProbe: Send + Sync {
    /// Full enumeration of the OS printer set.
    async fn enumerate(&self) -> Result<Vec<DiscoveredPrinter>>;

    /// Status of one printer by name.
    async fn probe(&self, name: &str) -> Result<PrinterStatus>;
}

#[derive(Debug, Deserialize)]
struct CimPrinter {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "PrinterStatus")]
    printer_status: Option<i64>,
    #[serde(rename = "DriverName")]
    driver_name: Option<String>,
    #[serde(rename = "PortName")]
    port_name: Option<String>,
}

impl From<CimPrinter> for DiscoveredPrinter {
    fn from(p: CimPrinter) -> Self {
        Self {
            name: p.name,
            status: PrinterStatus::from_code(p.printer_status.unwrap_or(1)),
            driver: p.driver_name,
            port: p.port_name,
        }
    }
}

/// `ConvertTo-Json` emits a bare object for a single printer and an array
/// for several; accept both.
fn parse_cim_output(raw: &str) -> Result<Vec<DiscoveredPrinter>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let printers: Vec<CimPrinter> = if raw.starts_with('[') {
        serde_json::from_str(raw)
    } else {
        serde_json::from_str::<CimPrinter>(raw).map(|p| vec![p])
    }
    .map_err(|e| PrintError::Internal(format!("unparseable printer enumeration: {}", e)))?;
    Ok(printers.into_iter().map(DiscoveredPrinter::from).collect())
}

/// Production probe backed by `Get-CimInstance Win32_Printer`
pub struct CimPrinterProbe {
    enumerate_timeout: Duration,
    probe_timeout: Duration,
}

impl CimPrinterProbe {
    pub fn new(enumerate_timeout: Duration, probe_timeout: Duration) -> Self {
        Self {
            enumerate_timeout,
            probe_timeout,
        }
    }

    async fn run_powershell(&self, script: &str, deadline: Duration) -> Result<String> {
        let output = tokio::time::timeout(
            deadline,
            tokio::process::Command::new("powershell")
                .args(["-NoProfile", "-NonInteractive", "-Command", script])
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        // Dropping the future kills the child via kill_on_drop.
        .map_err(|_| PrintError::Internal(format!("OS command exceeded {:?}", deadline)))?
        .map_err(|e| PrintError::Internal(format!("failed to run powershell: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PrintError::Internal(format!(
                "powershell exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl PrinterProbe for CimPrinterProbe {
    async fn enumerate(&self) -> Result<Vec<DiscoveredPrinter>> {
        let script = "Get-CimInstance Win32_Printer | \
                      Select-Object Name,PrinterStatus,DriverName,PortName | \
                      ConvertTo-Json -Compress";
        let raw = self.run_powershell(script, self.enumerate_timeout).await?;
        let printers = parse_cim_output(&raw)?;
        debug!("enumerated {} printer(s)", printers.len());
        Ok(printers)
    }

    async fn probe(&self, name: &str) -> Result<PrinterStatus> {
        let escaped = name.replace('\'', "''");
        let script = format!(
            "Get-CimInstance Win32_Printer -Filter \"Name='{}'\" | \
             Select-Object Name,PrinterStatus,DriverName,PortName | \
             ConvertTo-Json -Compress",
            escaped
        );
        let raw = self.run_powershell(&script, self.probe_timeout).await?;
        let printers = parse_cim_output(&raw)?;
        printers
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| p.status)
            .ok_or_else(|| {
                PrintError::UnavailablePrinter(format!("printer '{}' not found", name))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_array_output() {
        let raw = r#"[
            {"Name":"ZD420","PrinterStatus":0,"DriverName":"ZDesigner","PortName":"USB001"},
            {"Name":"Front Desk","PrinterStatus":2,"DriverName":null,"PortName":null}
        ]"#;
        let printers = parse_cim_output(raw).unwrap();
        assert_eq!(printers.len(), 2);
        assert_eq!(printers[0].name, "ZD420");
        assert_eq!(printers[0].status, PrinterStatus::Online);
        assert_eq!(printers[0].port.as_deref(), Some("USB001"));
        assert_eq!(printers[1].status, PrinterStatus::Error);
        assert_eq!(printers[1].driver, None);
    }

    #[test]
    fn parses_single_object_output() {
        let raw = r#"{"Name":"Solo","PrinterStatus":1,"DriverName":"D","PortName":"P"}"#;
        let printers = parse_cim_output(raw).unwrap();
        assert_eq!(printers.len(), 1);
        assert_eq!(printers[0].status, PrinterStatus::Offline);
    }

    #[test]
    fn unknown_status_codes_map_to_offline() {
        let raw = r#"{"Name":"Odd","PrinterStatus":7,"DriverName":null,"PortName":null}"#;
        let printers = parse_cim_output(raw).unwrap();
        assert_eq!(printers[0].status, PrinterStatus::Offline);
    }

    #[test]
    fn missing_status_reads_offline() {
        let raw = r#"{"Name":"NoStatus","DriverName":null,"PortName":null}"#;
        let printers = parse_cim_output(raw).unwrap();
        assert_eq!(printers[0].status, PrinterStatus::Offline);
    }

    #[test]
    fn empty_output_is_an_empty_set() {
        assert!(parse_cim_output("").unwrap().is_empty());
        assert!(parse_cim_output("  \n").unwrap().is_empty());
    }

    #[test]
    fn garbage_output_is_an_error() {
        assert!(parse_cim_output("not json").is_err());
    }
}
