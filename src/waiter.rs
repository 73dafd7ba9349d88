//! Polling for asynchronously produced job artifacts.
//!
//! Grid generation hands work to the suite's job control system and
//! returns before the result exists. The waiter bridges that gap: it polls
//! the shared working directory until an archive matching the job's naming
//! pattern shows up, with a hard deadline and cooperative cancellation so
//! an orphaned job cannot hang the whole run.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Name substring of archives produced by grid generation jobs.
pub const GRID_ARCHIVE_PATTERN: &str = "gridgen";

/// Errors raised while waiting for an artifact.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The deadline passed with no matching artifact.
    #[error("Timed out after {}s waiting for a {pattern} archive in {}", timeout.as_secs(), dir.display())]
    Timeout {
        dir: PathBuf,
        pattern: String,
        timeout: Duration,
    },

    /// The run was cancelled while waiting.
    #[error("Cancelled while waiting for a {pattern} archive in {}", dir.display())]
    Cancelled { dir: PathBuf, pattern: String },

    /// IO error while scanning for the artifact.
    #[error("Failed to poll for job archive: {0}")]
    Io(#[from] io::Error),
}

/// Waits for job archives to land in a working directory.
#[derive(Debug, Clone)]
pub struct ArtifactWaiter {
    poll_interval: Duration,
    timeout: Duration,
}

impl ArtifactWaiter {
    /// Creates a waiter with the given poll cadence and deadline.
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Blocks until a `.zip` archive whose name contains `pattern` appears
    /// in `dir`, returning its path.
    ///
    /// When several archives match, the most recently modified wins, so a
    /// stale archive from an earlier attempt never shadows a fresh one.
    /// The directory is re-scanned every poll interval.
    ///
    /// # Errors
    ///
    /// Returns `WaitError::Timeout` once the deadline passes,
    /// `WaitError::Cancelled` when the cancel flag is raised or its sender
    /// goes away, and `WaitError::Io` if the directory cannot be scanned.
    pub async fn wait_for_archive(
        &self,
        dir: &Path,
        pattern: &str,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<PathBuf, WaitError> {
        let cancelled = || WaitError::Cancelled {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
        };

        if *cancel.borrow() {
            return Err(cancelled());
        }

        let started = Instant::now();
        let deadline = started + self.timeout;

        debug!(dir = %dir.display(), pattern, "Waiting for job archive");

        loop {
            if let Some(path) = newest_matching_archive(dir, pattern)? {
                debug!(
                    archive = %path.display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job archive found"
                );
                return Ok(path);
            }

            if Instant::now() >= deadline {
                return Err(WaitError::Timeout {
                    dir: dir.to_path_buf(),
                    pattern: pattern.to_string(),
                    timeout: self.timeout,
                });
            }

            tokio::select! {
                _ = sleep(self.poll_interval) => {}
                // A changed flag or a dropped sender both end the wait.
                _ = cancel.changed() => return Err(cancelled()),
            }
        }
    }
}

/// Returns the most recently modified `.zip` in `dir` whose name contains
/// `pattern`, if any.
fn newest_matching_archive(dir: &Path, pattern: &str) -> Result<Option<PathBuf>, WaitError> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.ends_with(".zip") || !name.contains(pattern) {
            continue;
        }

        let modified = entry.metadata()?.modified()?;
        let newer = newest
            .as_ref()
            .map_or(true, |(current, _)| modified > *current);
        if newer {
            newest = Some((modified, entry.path()));
        }
    }

    Ok(newest.map(|(_, path)| path))
}
