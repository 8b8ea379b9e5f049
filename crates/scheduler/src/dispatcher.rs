//! Dispatcher
//!
//! Moves jobs from queued to terminal. A fixed-period ticker pulls batches
//! under a global concurrency cap and launches each job as an independent
//! task with settle-all semantics: one job's failure never reaches its
//! siblings. Every task carries a hard processing deadline so a stuck OS
//! call cannot hold an in-flight slot forever.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use labelpress_core::{
    BreakerRegistry, PageGeometry, PrintError, PrintJob, PrinterDirectory, Renderer, Result,
    Spooler,
};

use crate::metrics::MetricsAggregator;
use crate::queue::PrintQueue;

/// Dispatcher tuning
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Global in-flight cap across all printers
    pub max_concurrent_jobs: usize,
    /// Max jobs pulled per tick
    pub batch_size: usize,
    pub tick_interval: Duration,
    /// Hard wall-clock budget for one job, all copies included
    pub processing_timeout: Duration,
    /// How long in-flight jobs get to settle at shutdown before being aborted
    pub shutdown_grace: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            batch_size: 5,
            tick_interval: Duration::from_secs(1),
            processing_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

struct JobContext {
    queue: PrintQueue,
    printers: Arc<dyn PrinterDirectory>,
    breakers: Arc<BreakerRegistry>,
    renderer: Arc<dyn Renderer>,
    spooler: Arc<dyn Spooler>,
    metrics: Arc<MetricsAggregator>,
    config: DispatcherConfig,
}

/// Owns the dispatch loop for the life of the process
pub struct Dispatcher {
    ctx: Arc<JobContext>,
}

/// Handle for stopping a running dispatcher
pub struct DispatcherHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stop ticking, give in-flight jobs the configured grace to settle,
    /// then abort what remains. Aborted jobs are recorded as cancelled.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            error!("dispatcher loop ended abnormally: {}", e);
        }
    }
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: PrintQueue,
        printers: Arc<dyn PrinterDirectory>,
        breakers: Arc<BreakerRegistry>,
        renderer: Arc<dyn Renderer>,
        spooler: Arc<dyn Spooler>,
        metrics: Arc<MetricsAggregator>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            ctx: Arc::new(JobContext {
                queue,
                printers,
                breakers,
                renderer,
                spooler,
                metrics,
                config,
            }),
        }
    }

    pub fn start(self) -> DispatcherHandle {
        let (tx, rx) = watch::channel(false);
        let ctx = self.ctx;
        let join = tokio::spawn(run_loop(ctx, rx));
        DispatcherHandle { shutdown: tx, join }
    }
}

async fn run_loop(ctx: Arc<JobContext>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(ctx.config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tasks: JoinSet<()> = JoinSet::new();

    info!(
        "dispatcher started (cap {}, batch {})",
        ctx.config.max_concurrent_jobs, ctx.config.batch_size
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                while tasks.try_join_next().is_some() {}
                let in_flight = ctx.queue.status().in_flight;
                let available = ctx.config.max_concurrent_jobs.saturating_sub(in_flight);
                if available == 0 {
                    continue;
                }
                let batch = ctx.queue.take(available.min(ctx.config.batch_size));
                for job in batch {
                    let ctx = ctx.clone();
                    tasks.spawn(async move {
                        run_job(ctx, job).await;
                    });
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    if !tasks.is_empty() {
        info!("dispatcher draining {} in-flight job(s)", tasks.len());
    }
    let drained = tokio::time::timeout(ctx.config.shutdown_grace, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("shutdown grace elapsed, aborting remaining jobs");
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        for id in ctx.queue.in_flight_ids() {
            if let Err(e) = ctx.queue.complete(id, Err(PrintError::Cancelled)) {
                error!("could not cancel job {}: {}", id, e);
            }
        }
    }
    info!("dispatcher stopped");
}

async fn run_job(ctx: Arc<JobContext>, job: PrintJob) {
    let id = job.id;
    let printer = job.request.label.printer_name.clone();

    if let Err(e) = ctx.printers.check_available(&printer) {
        debug!("job {} rejected before start: {}", id, e);
        settle(&ctx, id, Err(e));
        return;
    }

    ctx.printers.mark_job_start(&printer);
    let outcome = match tokio::time::timeout(
        ctx.config.processing_timeout,
        process_label(&ctx, &job),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => {
            warn!(
                "job {} exceeded processing deadline of {:?}",
                id, ctx.config.processing_timeout
            );
            Err(PrintError::ProcessingTimeout)
        }
    };
    ctx.printers.mark_job_end(&printer, outcome.is_ok());
    settle(&ctx, id, outcome);
}

fn settle(ctx: &JobContext, id: labelpress_core::JobId, outcome: Result<()>) {
    if let Err(e) = ctx.queue.complete(id, outcome) {
        error!("failed to settle job {}: {}", id, e);
    }
}

async fn process_label(ctx: &JobContext, job: &PrintJob) -> Result<()> {
    let label = &job.request.label;
    let html = label.printable_html();
    let geometry = PageGeometry::for_label(label);

    // Renderer readiness gate: one recycle, one retry, then give up.
    if !ctx.renderer.status().await.available {
        info!("renderer not ready, recycling before job {}", job.id);
        ctx.metrics.record_renderer_recycle();
        ctx.renderer
            .recycle()
            .await
            .map_err(|e| PrintError::RendererUnavailable(e.to_string()))?;
        if !ctx.renderer.status().await.available {
            return Err(PrintError::RendererUnavailable(
                "renderer did not recover after recycle".into(),
            ));
        }
    }

    let copies = label.copies as usize;
    let printer = label.printer_name.as_str();
    let attempts =
        (1..=copies).map(|copy| print_copy(ctx, &html, &geometry, printer, copy));
    let results = join_all(attempts).await;

    let mut failed: Vec<(usize, PrintError)> = Vec::new();
    for (idx, result) in results.into_iter().enumerate() {
        if let Err(e) = result {
            failed.push((idx + 1, e));
        }
    }
    let succeeded = copies - failed.len();
    let required = copies.div_ceil(2);
    if succeeded >= required {
        if !failed.is_empty() {
            warn!(
                "job {}: {}/{} copies printed, accepting partial success",
                job.id, succeeded, copies
            );
        }
        Ok(())
    } else {
        Err(copy_failure(copies, failed))
    }
}

async fn print_copy(
    ctx: &JobContext,
    html: &str,
    geometry: &PageGeometry,
    printer: &str,
    copy: usize,
) -> Result<()> {
    // The breaker gates the printer interaction; checking before the render
    // avoids burning renderer time on a printer that will reject anyway.
    ctx.breakers.check(printer)?;
    let pdf = ctx.renderer.render(html, geometry).await?;
    match ctx.spooler.spool(&pdf, printer).await {
        Ok(()) => {
            ctx.breakers.record_success(printer);
            Ok(())
        }
        Err(e) => {
            ctx.breakers.record_failure(printer);
            debug!("copy {} on '{}' failed: {}", copy, printer, e);
            Err(e)
        }
    }
}

/// Collapse per-copy failures into one job error listing the failed copies.
fn copy_failure(copies: usize, failed: Vec<(usize, PrintError)>) -> PrintError {
    let Some((_, first)) = failed.first() else {
        return PrintError::Internal("copy failure with no failed copies".into());
    };
    let indices: Vec<String> = failed.iter().map(|(i, _)| i.to_string()).collect();
    let detail = format!(
        "{} of {} copies failed (copies {}): {}",
        failed.len(),
        copies,
        indices.join(", "),
        first
    );
    match first {
        PrintError::SpoolFailed(_) => PrintError::SpoolFailed(detail),
        PrintError::BreakerOpen(p) => PrintError::BreakerOpen(p.clone()),
        PrintError::RenderTimeout(_) | PrintError::RenderFailed(_) => {
            PrintError::RenderFailed(detail)
        }
        other => other.clone(),
    }
}
