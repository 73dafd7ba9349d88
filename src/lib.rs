//! dynophore: Dynamic e-pharmacophore pipeline over MD trajectory frames.
//!
//! This library drives trajectory frames through an ordered sequence of
//! external Schrodinger stage programs, bounds parallelism across and
//! within batches, and collects the per-frame hypothesis artifacts.

// Core modules
pub mod cli;
pub mod collect;
pub mod config;
pub mod frame;
pub mod mae;
pub mod pipeline;
pub mod scheduler;
pub mod stage;
pub mod suite;
pub mod waiter;

// Re-export commonly used types
pub use config::{RunConfig, Workspace};
pub use frame::{select_frames, Frame, SelectError};
pub use pipeline::{FramePipeline, FrameReport, PipelineContext};
pub use scheduler::{BatchScheduler, RunStats};
pub use stage::{Stage, StageError, StageRunner};
pub use suite::SchrodingerSuite;
pub use waiter::ArtifactWaiter;
