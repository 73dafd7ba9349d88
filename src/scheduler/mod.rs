//! Batch scheduling over selected frames.
//!
//! The scheduler owns the outer run loop: it partitions frames into
//! batches, drives each batch's pipelines concurrently under a bounded
//! worker pool, and reclaims job-backend state between batches.
//!
//! # Architecture
//!
//! ```text
//!   selected frames
//!         │
//!   ┌─────▼──────┐   chunks(batch_size)
//!   │ Batch 1..N │ ─────────────────────┐
//!   └────────────┘                      │
//!                              ┌────────▼────────┐
//!                              │  Semaphore(width)│
//!                              └────────┬────────┘
//!                    ┌─────────────┬────┴────┬─────────────┐
//!                    ▼             ▼         ▼             ▼
//!              FramePipeline FramePipeline  ...      FramePipeline
//!                    │             │         │             │
//!                    └─────────────┴────┬────┴─────────────┘
//!                                       │  join_all
//!                              ┌────────▼────────┐
//!                              │ cleanup + stats │
//!                              └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use dynophore::scheduler::BatchScheduler;
//! use tokio::sync::watch;
//!
//! let (cancel_tx, cancel_rx) = watch::channel(false);
//! let scheduler = BatchScheduler::new(ctx);
//! let stats = scheduler.run(&frames, &cancel_rx).await;
//! println!("{}/{} frames succeeded", stats.succeeded, stats.selected);
//! ```

pub mod batch;

// Re-export main types for convenience
pub use batch::{BatchScheduler, RunStats};
