//! Batch-ordered scheduling of frame pipelines.
//!
//! The scheduler partitions the selected frames into fixed-size batches
//! and runs them strictly in order. Within a batch, frames run
//! concurrently under a semaphore sized from the core budget; after every
//! batch drains, finished job bookkeeping is reclaimed from the suite's
//! job control backend so queue state stays proportional to one batch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::frame::Frame;
use crate::pipeline::{FramePipeline, FrameReport, PipelineContext};

/// Aggregated outcome of one scheduled run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    /// Frames the selector produced.
    pub selected: usize,
    /// Frames whose pipelines were actually started.
    pub attempted: usize,
    /// Frames that reached `Done`.
    pub succeeded: usize,
    /// Frames that reached `Failed`.
    pub failed: usize,
    /// Times the job-backend cleanup was invoked.
    pub cleanups: usize,
    /// Whether the cancel flag was raised during the run. Frames cut
    /// short mid-stage still count as attempted, so this is the signal
    /// that distinguishes a cancelled run from a completed one.
    pub cancelled: bool,
    /// Per-frame terminal reports, in batch order.
    pub reports: Vec<FrameReport>,
}

impl RunStats {
    /// Creates empty stats for a run over `selected` frames.
    pub fn new(selected: usize) -> Self {
        Self {
            selected,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            cleanups: 0,
            cancelled: false,
            reports: Vec::new(),
        }
    }

    fn record(&mut self, report: FrameReport) {
        self.attempted += 1;
        if report.succeeded() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.reports.push(report);
    }

    /// Whether every selected frame was driven to a terminal state.
    pub fn all_attempted(&self) -> bool {
        self.attempted == self.selected
    }
}

/// Runs frame pipelines batch by batch with bounded concurrency.
pub struct BatchScheduler<'a> {
    ctx: PipelineContext<'a>,
}

impl<'a> BatchScheduler<'a> {
    /// Creates a scheduler over the shared pipeline context.
    pub fn new(ctx: PipelineContext<'a>) -> Self {
        Self { ctx }
    }

    /// Processes every frame and returns the aggregated stats.
    ///
    /// Batches run strictly in order; a batch's frames run concurrently,
    /// at most `worker_slots` at a time (capped by the batch length), and
    /// the batch fully drains before cleanup runs and the next batch
    /// starts. Frame failures are contained to their frame; cleanup
    /// failures are logged and ignored. A raised cancel flag interrupts
    /// in-flight frames and stops the run at the next batch boundary.
    pub async fn run(&self, frames: &[Frame], cancel: &watch::Receiver<bool>) -> RunStats {
        let batch_size = self.ctx.config.batch_size;
        let total_batches = (frames.len() + batch_size - 1) / batch_size;
        let mut stats = RunStats::new(frames.len());

        info!(
            frames = frames.len(),
            batches = total_batches,
            batch_size,
            "Starting batch schedule"
        );

        for (batch_index, batch) in frames.chunks(batch_size).enumerate() {
            let batch_number = batch_index + 1;

            if *cancel.borrow() {
                warn!(batch = batch_number, "Run cancelled, skipping remaining batches");
                break;
            }

            let width = self.ctx.config.worker_slots().min(batch.len());
            info!(
                batch = batch_number,
                of = total_batches,
                frames = batch.len(),
                width,
                "Starting batch"
            );

            let semaphore = Arc::new(Semaphore::new(width));
            let mut pipelines = Vec::with_capacity(batch.len());
            for frame in batch {
                let semaphore = semaphore.clone();
                let frame_cancel = cancel.clone();
                pipelines.push(async move {
                    let _permit = semaphore.acquire().await.unwrap();
                    FramePipeline::new(frame.clone(), self.ctx)
                        .run(frame_cancel)
                        .await
                });
            }

            for report in futures::future::join_all(pipelines).await {
                stats.record(report);
            }

            // The batch is fully terminal; reclaim finished job state.
            if let Err(error) = self.ctx.suite.cleanup_finished_jobs().await {
                warn!(batch = batch_number, error = %error, "Job cleanup failed");
            }
            stats.cleanups += 1;

            info!(
                batch = batch_number,
                succeeded = stats.succeeded,
                failed = stats.failed,
                "Batch complete"
            );
        }

        // The flag is latched, so this also covers a cancel raised while
        // the final batch was draining.
        stats.cancelled = *cancel.borrow();
        stats
    }
}
