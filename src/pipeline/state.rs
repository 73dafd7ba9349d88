//! Frame lifecycle states and per-frame outcome reports.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stage::Stage;

/// Lifecycle state of one frame's pipeline.
///
/// States advance strictly in declaration order on stage success; any
/// failure jumps to `Failed`, which records the stage that broke and why.
/// `Done` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameState {
    /// Selected but not yet started.
    Pending,
    /// PrepWizard is running.
    Preparing,
    /// Ligand/receptor extraction is running.
    Splitting,
    /// The ligand centroid has been computed.
    GeometryDerived,
    /// The grid job has been submitted.
    GridGenerating,
    /// Polling for the grid archive.
    WaitingForGrid,
    /// Hypothesis generation is running.
    HypothesisGenerating,
    /// Every stage succeeded; the hypothesis artifact exists.
    Done,
    /// A stage failed; no further stage runs for this frame.
    Failed { stage: Stage, reason: String },
}

impl FrameState {
    /// Whether the frame has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FrameState::Done | FrameState::Failed { .. })
    }

    /// Whether the frame completed every stage.
    pub fn is_done(&self) -> bool {
        matches!(self, FrameState::Done)
    }

    /// Whether the frame failed at some stage.
    pub fn is_failed(&self) -> bool {
        matches!(self, FrameState::Failed { .. })
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameState::Pending => f.write_str("pending"),
            FrameState::Preparing => f.write_str("preparing"),
            FrameState::Splitting => f.write_str("splitting"),
            FrameState::GeometryDerived => f.write_str("geometry-derived"),
            FrameState::GridGenerating => f.write_str("grid-generating"),
            FrameState::WaitingForGrid => f.write_str("waiting-for-grid"),
            FrameState::HypothesisGenerating => f.write_str("hypothesis-generating"),
            FrameState::Done => f.write_str("done"),
            FrameState::Failed { stage, reason } => {
                write!(f, "failed at {}: {}", stage, reason)
            }
        }
    }
}

/// Terminal outcome of a frame pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOutcome {
    Done,
    Failed,
}

/// Record of one frame's run, suitable for the run summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameReport {
    /// Frame identity.
    pub index: u32,
    /// Terminal outcome.
    pub outcome: FrameOutcome,
    /// Path of the terminal artifact, present for completed frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    /// Name of the stage that failed, present for failed frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
    /// Failure reason, present for failed frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock time the frame spent in the pipeline.
    pub duration_ms: u64,
}

impl FrameReport {
    /// Builds the report for a frame that completed every stage.
    pub fn done(index: u32, artifact: PathBuf, duration: Duration) -> Self {
        Self {
            index,
            outcome: FrameOutcome::Done,
            artifact: Some(artifact),
            failed_stage: None,
            error: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Builds the report for a frame that failed at `stage`.
    pub fn failed(index: u32, stage: Stage, error: String, duration: Duration) -> Self {
        Self {
            index,
            outcome: FrameOutcome::Failed,
            artifact: None,
            failed_stage: Some(stage.to_string()),
            error: Some(error),
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Whether the frame completed every stage.
    pub fn succeeded(&self) -> bool {
        self.outcome == FrameOutcome::Done
    }
}
