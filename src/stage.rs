//! External tool execution for pipeline stages.
//!
//! Every stage of a frame's lifecycle shells out to a suite program. The
//! runner spawns those programs with a structured argument vector (never a
//! shell), lowers their scheduling priority through `nice`, pins the
//! working directory, and captures both output streams so failures surface
//! with context. Commands race against the run's cancel flag and the
//! child is killed when cancellation wins.

use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::debug;

/// One step of a frame's processing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Structure preparation via PrepWizard.
    Prepare,
    /// Ligand/receptor extraction via pv_convert.
    Split,
    /// Centroid derivation from the ligand structure.
    GeometryDerive,
    /// Grid job submission.
    GridGenerate,
    /// Polling for the grid archive to land.
    WaitForGrid,
    /// E-pharmacophore hypothesis generation.
    HypothesisGenerate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Prepare => "prepare",
            Stage::Split => "split",
            Stage::GeometryDerive => "geometry-derive",
            Stage::GridGenerate => "grid-generate",
            Stage::WaitForGrid => "waiting-for-grid",
            Stage::HypothesisGenerate => "hypothesis-generate",
        };
        f.write_str(name)
    }
}

/// Errors raised while running a stage command.
#[derive(Debug, Error)]
pub enum StageError {
    /// The program could not be spawned at all.
    #[error("Stage {stage} failed to launch {}: {source}", program.display())]
    Spawn {
        stage: Stage,
        program: PathBuf,
        source: io::Error,
    },

    /// The program ran but exited unsuccessfully. `diagnostics` carries
    /// the captured stderr, or the captured stdout when stderr is empty,
    /// since some suite tools report their failures on stdout.
    #[error("Stage {stage} command {} exited with {status}: {diagnostics}", program.display())]
    Failed {
        stage: Stage,
        program: PathBuf,
        status: ExitStatus,
        diagnostics: String,
    },

    /// The run was cancelled while the program was still executing.
    #[error("Stage {stage} cancelled while {} was running", program.display())]
    Cancelled { stage: Stage, program: PathBuf },
}

impl StageError {
    /// The stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Spawn { stage, .. } => *stage,
            StageError::Failed { stage, .. } => *stage,
            StageError::Cancelled { stage, .. } => *stage,
        }
    }
}

/// Captured output of a successful stage command.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Spawns suite programs on behalf of pipeline stages.
///
/// Commands run under `nice -n <level>` so a wide batch does not starve
/// interactive work on the host. A level of zero skips the prefix.
#[derive(Debug, Clone)]
pub struct StageRunner {
    nice_level: i32,
}

impl StageRunner {
    /// Creates a runner spawning commands at the given niceness.
    pub fn new(nice_level: i32) -> Self {
        Self { nice_level }
    }

    /// Runs one stage command to completion in `workdir`.
    ///
    /// Both output streams are captured; nothing is inherited from the
    /// orchestrator's terminal. The command blocks until the program
    /// exits or the cancel flag is raised, in which case the child is
    /// killed.
    ///
    /// # Errors
    ///
    /// Returns `StageError::Spawn` when the program cannot start,
    /// `StageError::Failed` with the captured diagnostics on a non-zero
    /// exit, and `StageError::Cancelled` when cancellation interrupts
    /// the command.
    pub async fn run<I, S>(
        &self,
        stage: Stage,
        workdir: &Path,
        program: &Path,
        args: I,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<StageOutput, StageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        if *cancel.borrow() {
            return Err(StageError::Cancelled {
                stage,
                program: program.to_path_buf(),
            });
        }

        let mut command = if self.nice_level != 0 {
            let mut nice = Command::new("nice");
            nice.arg("-n").arg(self.nice_level.to_string()).arg(program);
            nice
        } else {
            Command::new(program)
        };

        command
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            stage = %stage,
            program = %program.display(),
            workdir = %workdir.display(),
            "Running stage command"
        );

        let output = tokio::select! {
            output = command.output() => {
                output.map_err(|source| StageError::Spawn {
                    stage,
                    program: program.to_path_buf(),
                    source,
                })?
            }
            _ = cancel.changed() => {
                return Err(StageError::Cancelled {
                    stage,
                    program: program.to_path_buf(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let diagnostics = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(StageError::Failed {
                stage,
                program: program.to_path_buf(),
                status: output.status,
                diagnostics,
            });
        }

        Ok(StageOutput { stdout, stderr })
    }
}
