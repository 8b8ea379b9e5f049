//! Spooler Invoker
//!
//! Writes PDF bytes to a unique temp file and hands the path to the external
//! PDF-to-printer binary. Stateless and re-entrant: concurrent invocations
//! never share file names. Cleanup is deferred and best-effort.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use labelpress_core::{PrintError, Result, Spooler};

/// Spooler invocation settings
#[derive(Debug, Clone)]
pub struct SpoolerConfig {
    /// Path to the external print binary
    pub binary: PathBuf,
    /// Working directory for temp PDFs; created on demand
    pub work_dir: PathBuf,
    /// Wall-clock cap on one invocation
    pub timeout: Duration,
    /// How long a temp file lives after the invocation returns
    pub cleanup_delay: Duration,
}

impl Default for SpoolerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("PDFtoPrinter.exe"),
            work_dir: PathBuf::from("spool"),
            timeout: Duration::from_secs(10),
            cleanup_delay: Duration::from_secs(2),
        }
    }
}

/// Collision-free temp path: millisecond timestamp plus a v4 UUID suffix
/// (far beyond the 48 bits of entropy concurrency requires).
pub(crate) fn unique_spool_path(work_dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    work_dir.join(format!(
        "{}_{}_{}.{}",
        prefix,
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        extension
    ))
}

/// Delete a temp file after a short grace; failures are logged, never raised.
pub(crate) fn schedule_cleanup(path: PathBuf, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("could not remove temp file {}: {}", path.display(), e);
        }
    });
}

/// Run an external command with a hard wall-clock cap. The child is killed
/// when the deadline passes; the callee is not trusted to exit on its own.
pub(crate) async fn run_capped(
    mut command: tokio::process::Command,
    deadline: Duration,
    what: &str,
) -> Result<()> {
    let output = tokio::time::timeout(
        deadline,
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| PrintError::SpoolFailed(format!("{} exceeded {:?}", what, deadline)))?
    .map_err(|e| PrintError::SpoolFailed(format!("{} could not start: {}", what, e)))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(PrintError::SpoolFailed(format!(
            "{} exited with {}: {}",
            what,
            output.status,
            stderr.trim()
        )))
    }
}

/// Production [`Spooler`] backed by the external binary
pub struct SpoolerInvoker {
    config: SpoolerConfig,
}

impl SpoolerInvoker {
    pub fn new(config: SpoolerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Spooler for SpoolerInvoker {
    async fn spool(&self, pdf: &[u8], printer_name: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.work_dir)
            .await
            .map_err(|e| {
                PrintError::SpoolFailed(format!("could not create spool directory: {}", e))
            })?;

        let path = unique_spool_path(&self.config.work_dir, "print", "pdf");
        tokio::fs::write(&path, pdf).await.map_err(|e| {
            PrintError::SpoolFailed(format!("could not write {}: {}", path.display(), e))
        })?;
        debug!(
            "spooling {} ({} bytes) to '{}'",
            path.display(),
            pdf.len(),
            printer_name
        );

        let mut command = tokio::process::Command::new(&self.config.binary);
        command.arg(&path).arg(printer_name);
        let result = run_capped(command, self.config.timeout, "spooler").await;

        schedule_cleanup(path, self.config.cleanup_delay);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn temp_paths_are_collision_free() {
        let dir = Path::new("spool");
        let paths: HashSet<PathBuf> = (0..200)
            .map(|_| unique_spool_path(dir, "print", "pdf"))
            .collect();
        assert_eq!(paths.len(), 200);
    }

    #[test]
    fn temp_paths_carry_prefix_and_extension() {
        let path = unique_spool_path(Path::new("work"), "print", "pdf");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("print_"));
        assert!(name.ends_with(".pdf"));
        assert!(path.starts_with("work"));
    }

    #[tokio::test]
    async fn cleanup_removes_file_after_delay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doomed.pdf");
        tokio::fs::write(&path, b"x").await.unwrap();

        schedule_cleanup(path.clone(), Duration::from_millis(20));
        assert!(path.exists());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn missing_binary_is_a_spool_error() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = SpoolerInvoker::new(SpoolerConfig {
            binary: PathBuf::from("definitely-not-a-real-spooler-binary"),
            work_dir: dir.path().to_path_buf(),
            timeout: Duration::from_secs(1),
            cleanup_delay: Duration::from_millis(10),
        });
        let result = invoker.spool(b"%PDF-1.7", "P").await;
        assert!(matches!(
            result,
            Err(PrintError::SpoolFailed(m)) if m.contains("could not start")
        ));
    }
}
