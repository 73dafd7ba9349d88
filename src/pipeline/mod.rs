//! Per-frame pipeline orchestration.
//!
//! This module drives a single trajectory frame through the fixed sequence
//! of external-tool stages that turns an input structure into an
//! e-pharmacophore hypothesis.
//!
//! # Architecture
//!
//! - **FramePipeline**: the per-frame state machine; one instance per frame
//! - **FrameState**: the observable lifecycle, `Pending` through `Done` or
//!   `Failed`
//! - **FrameReport**: the terminal record a pipeline hands back for
//!   aggregation
//!
//! # Pipeline Flow
//!
//! 1. **Prepare**: copy the input frame into the working directory and run
//!    PrepWizard over it
//! 2. **Split**: extract the ligand and receptor structures
//! 3. **Geometry**: compute the ligand centroid
//! 4. **Grid**: submit the grid job and poll until its archive lands
//! 5. **Hypothesis**: generate the e-pharmacophore hypothesis
//!
//! Every stage must succeed before the next runs; the first failure parks
//! the frame in `Failed` with the stage name and reason, and the report
//! carries that to the scheduler. Frames never affect each other.
//!
//! # Example
//!
//! ```rust,ignore
//! use dynophore::pipeline::{FramePipeline, PipelineContext};
//!
//! let ctx = PipelineContext {
//!     suite: &suite,
//!     stages: &stages,
//!     waiter: &waiter,
//!     config: &config,
//!     workdir: &workdir,
//! };
//!
//! let report = FramePipeline::new(frame, ctx).run(cancel_rx.clone()).await;
//! if report.succeeded() {
//!     println!("frame {} -> {:?}", report.index, report.artifact);
//! }
//! ```

pub mod runner;
pub mod state;

// Re-export main types for convenience
pub use runner::{FramePipeline, PipelineContext, PipelineError};
pub use state::{FrameOutcome, FrameReport, FrameState};
