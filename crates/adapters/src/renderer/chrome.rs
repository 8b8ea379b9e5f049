//! Headless-Chrome renderer pool
//!
//! Owns at most one browser process at a time. Every render gets a fresh
//! ephemeral tab (tab pooling proved unstable and was abandoned), each
//! pipeline stage runs under its own independent deadline, and the tab is
//! closed on every exit path. A heartbeat verifies connectivity; on
//! disconnect the pool goes not-ready and the next render recycles the
//! process.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions, Tab};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use labelpress_core::{PageGeometry, PrintError, Renderer, RendererStatus, Result};

use super::geometry::length_to_inches;

/// Launch args: no GPU, no extensions, no background networking, no autoplay.
const BROWSER_ARGS: &[&str] = &[
    "--disable-gpu",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-default-apps",
    "--disable-sync",
    "--autoplay-policy=user-gesture-required",
    "--mute-audio",
    "--no-first-run",
];

/// Renderer budgets; every stage has its own timer
#[derive(Debug, Clone)]
pub struct ChromeRendererConfig {
    pub chrome_path: Option<PathBuf>,
    /// Process start budget
    pub launch_timeout: Duration,
    /// Soft content-set budget handed to the tab itself
    pub content_timeout: Duration,
    /// Hard deadline racing the whole content-set stage
    pub content_deadline: Duration,
    pub pdf_deadline: Duration,
    pub close_deadline: Duration,
    /// How long an old browser gets to close during a recycle
    pub teardown_deadline: Duration,
    /// Quiet gap between teardown and relaunch
    pub relaunch_gap: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for ChromeRendererConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            launch_timeout: Duration::from_secs(20),
            content_timeout: Duration::from_secs(20),
            content_deadline: Duration::from_secs(25),
            pdf_deadline: Duration::from_secs(8),
            close_deadline: Duration::from_secs(3),
            teardown_deadline: Duration::from_secs(10),
            relaunch_gap: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(60),
        }
    }
}

/// Single-owner browser pool implementing [`Renderer`]
pub struct ChromeRenderer {
    config: ChromeRendererConfig,
    /// Serializes launch, recycle and teardown; renders share the live
    /// browser without holding it.
    lifecycle: tokio::sync::Mutex<()>,
    browser: RwLock<Option<Arc<Browser>>>,
    ready: AtomicBool,
    /// Set once the first launch has happened; a fresh pool is serviceable
    /// (it will launch lazily), not disconnected.
    launched: AtomicBool,
    recycle_pending: AtomicBool,
    renders: AtomicU64,
    failures: AtomicU64,
    recycles: AtomicU64,
}

impl ChromeRenderer {
    pub fn new(config: ChromeRendererConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            lifecycle: tokio::sync::Mutex::new(()),
            browser: RwLock::new(None),
            ready: AtomicBool::new(false),
            launched: AtomicBool::new(false),
            recycle_pending: AtomicBool::new(false),
            renders: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            recycles: AtomicU64::new(0),
        })
    }

    /// Spawn the connectivity heartbeat. The handle is aborted at shutdown.
    pub fn start_heartbeat(self: &Arc<Self>) -> JoinHandle<()> {
        let renderer = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(renderer.config.heartbeat_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(browser) = renderer.browser.read().clone() else {
                    continue;
                };
                let alive = tokio::time::timeout(
                    Duration::from_secs(5),
                    tokio::task::spawn_blocking(move || browser.get_version().is_ok()),
                )
                .await;
                if !matches!(alive, Ok(Ok(true))) {
                    warn!("browser heartbeat failed, marking renderer for recycle");
                    renderer.ready.store(false, Ordering::SeqCst);
                    renderer.recycle_pending.store(true, Ordering::SeqCst);
                }
            }
        })
    }

    /// Drop the browser process for good (process shutdown).
    pub async fn teardown(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.ready.store(false, Ordering::SeqCst);
        if let Some(old) = self.browser.write().take() {
            let deadline = self.config.teardown_deadline;
            let closed = tokio::time::timeout(
                deadline,
                tokio::task::spawn_blocking(move || drop(old)),
            )
            .await;
            if closed.is_err() {
                warn!("browser did not close within {:?}, abandoning process", deadline);
            }
        }
    }

    /// Live browser handle, launching or recycling first when needed.
    async fn ensure_browser(&self) -> Result<Arc<Browser>> {
        if !self.recycle_pending.load(Ordering::SeqCst) {
            if let Some(browser) = self.browser.read().clone() {
                return Ok(browser);
            }
        }
        let _lifecycle = self.lifecycle.lock().await;
        if !self.recycle_pending.load(Ordering::SeqCst) {
            if let Some(browser) = self.browser.read().clone() {
                return Ok(browser);
            }
        }
        self.relaunch_locked().await
    }

    /// Teardown + quiet gap + launch. Caller must hold the lifecycle lock.
    async fn relaunch_locked(&self) -> Result<Arc<Browser>> {
        let was_pending = self.recycle_pending.load(Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);

        let old = self.browser.write().take();
        let is_recycle = was_pending || old.is_some();
        if let Some(old) = old {
            let deadline = self.config.teardown_deadline;
            let closed = tokio::time::timeout(
                deadline,
                tokio::task::spawn_blocking(move || drop(old)),
            )
            .await;
            if closed.is_err() {
                warn!(
                    "old browser did not close within {:?}, abandoning process",
                    deadline
                );
            }
            tokio::time::sleep(self.config.relaunch_gap).await;
        }

        let path = self.config.chrome_path.clone();
        let launched = tokio::time::timeout(
            self.config.launch_timeout,
            tokio::task::spawn_blocking(move || launch_browser(path)),
        )
        .await;

        let browser = match launched {
            Err(_) => {
                return Err(PrintError::RendererUnavailable(format!(
                    "browser launch exceeded {:?}",
                    self.config.launch_timeout
                )))
            }
            Ok(Err(join)) => {
                return Err(PrintError::RendererUnavailable(format!(
                    "browser launch task failed: {}",
                    join
                )))
            }
            Ok(Ok(Err(e))) => return Err(PrintError::RendererUnavailable(e)),
            Ok(Ok(Ok(browser))) => Arc::new(browser),
        };

        *self.browser.write() = Some(browser.clone());
        self.ready.store(true, Ordering::SeqCst);
        self.launched.store(true, Ordering::SeqCst);
        self.recycle_pending.store(false, Ordering::SeqCst);
        if is_recycle {
            self.recycles.fetch_add(1, Ordering::Relaxed);
            info!("chrome renderer recycled and ready");
        } else {
            info!("chrome renderer launched");
        }
        Ok(browser)
    }

    /// Close a tab under its hard deadline. A late close drops the reference
    /// and schedules a browser recycle instead of waiting.
    async fn close_tab(&self, tab: Arc<Tab>) {
        let deadline = self.config.close_deadline;
        let closed = tokio::time::timeout(
            deadline,
            tokio::task::spawn_blocking(move || {
                tab.close(true).map(|_| ()).map_err(|e| e.to_string())
            }),
        )
        .await;
        match closed {
            Err(_) => {
                warn!("tab close exceeded {:?}, scheduling browser recycle", deadline);
                self.recycle_pending.store(true, Ordering::SeqCst);
            }
            Ok(Err(join)) => debug!("tab close task failed: {}", join),
            Ok(Ok(Err(e))) => debug!("tab close failed: {}", e),
            Ok(Ok(Ok(()))) => {}
        }
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn render(&self, html: &str, geometry: &PageGeometry) -> Result<Vec<u8>> {
        let browser = self.ensure_browser().await?;
        let data_url = format!("data:text/html;base64,{}", BASE64.encode(html));
        let soft_timeout = self.config.content_timeout;

        // Stage 1: fresh tab, set content, wait for network quiescence so
        // remote images land before the PDF is produced.
        let opened = {
            let browser = browser.clone();
            tokio::time::timeout(
                self.config.content_deadline,
                tokio::task::spawn_blocking(move || -> std::result::Result<Arc<Tab>, String> {
                    let tab = browser.new_tab().map_err(|e| e.to_string())?;
                    tab.set_default_timeout(soft_timeout);
                    tab.navigate_to(&data_url).map_err(|e| e.to_string())?;
                    tab.wait_until_navigated().map_err(|e| e.to_string())?;
                    Ok(tab)
                }),
            )
            .await
        };
        let tab = match opened {
            Err(_) => {
                // The blocking task still owns the tab; the next recycle
                // sweeps it up with the browser.
                self.recycle_pending.store(true, Ordering::SeqCst);
                self.record_failure();
                return Err(PrintError::RenderTimeout(
                    self.config.content_deadline.as_millis() as u64,
                ));
            }
            Ok(Err(join)) => {
                self.record_failure();
                return Err(PrintError::RenderFailed(format!(
                    "content task failed: {}",
                    join
                )));
            }
            Ok(Ok(Err(e))) => {
                self.record_failure();
                return Err(PrintError::RenderFailed(e));
            }
            Ok(Ok(Ok(tab))) => tab,
        };

        // Stage 2: PDF generation under its own timer.
        let pdf = {
            let tab = tab.clone();
            let options = pdf_options(geometry);
            tokio::time::timeout(
                self.config.pdf_deadline,
                tokio::task::spawn_blocking(move || {
                    tab.print_to_pdf(Some(options)).map_err(|e| e.to_string())
                }),
            )
            .await
        };

        // Closed on every exit path, success or not.
        self.close_tab(tab).await;

        match pdf {
            Err(_) => {
                self.recycle_pending.store(true, Ordering::SeqCst);
                self.record_failure();
                Err(PrintError::RenderTimeout(
                    self.config.pdf_deadline.as_millis() as u64,
                ))
            }
            Ok(Err(join)) => {
                self.record_failure();
                Err(PrintError::RenderFailed(format!("pdf task failed: {}", join)))
            }
            Ok(Ok(Err(e))) => {
                self.record_failure();
                Err(PrintError::RenderFailed(e))
            }
            Ok(Ok(Ok(bytes))) => {
                self.renders.fetch_add(1, Ordering::Relaxed);
                Ok(bytes)
            }
        }
    }

    async fn status(&self) -> RendererStatus {
        let available = if self.launched.load(Ordering::SeqCst) {
            self.ready.load(Ordering::SeqCst)
                && !self.recycle_pending.load(Ordering::SeqCst)
                && self.browser.read().is_some()
        } else {
            // Never launched: the pool will start the browser on first use.
            !self.recycle_pending.load(Ordering::SeqCst)
        };
        RendererStatus {
            available,
            renders: self.renders.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            recycles: self.recycles.load(Ordering::Relaxed),
        }
    }

    async fn recycle(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.recycle_pending.store(true, Ordering::SeqCst);
        self.relaunch_locked().await.map(|_| ())
    }
}

fn launch_browser(chrome_path: Option<PathBuf>) -> std::result::Result<Browser, String> {
    let options = LaunchOptions::default_builder()
        .headless(true)
        .path(chrome_path)
        .args(BROWSER_ARGS.iter().map(OsStr::new).collect())
        // The pool manages browser lifetime itself; keep the crate's idle
        // reaper out of the way.
        .idle_browser_timeout(Duration::from_secs(86_400))
        .build()
        .map_err(|e| e.to_string())?;
    Browser::new(options).map_err(|e| e.to_string())
}

fn pdf_options(geometry: &PageGeometry) -> PrintToPdfOptions {
    PrintToPdfOptions {
        landscape: Some(geometry.landscape),
        display_header_footer: Some(false),
        print_background: Some(true),
        scale: Some(1.0),
        paper_width: length_to_inches(&geometry.width),
        paper_height: length_to_inches(&geometry.height),
        margin_top: length_to_inches(&geometry.margins.top),
        margin_bottom: length_to_inches(&geometry.margins.bottom),
        margin_left: length_to_inches(&geometry.margins.left),
        margin_right: length_to_inches(&geometry.margins.right),
        prefer_css_page_size: Some(true),
        ..Default::default()
    }
}
