//! Schrödinger suite adapter.
//!
//! Locates the suite installation and exposes the handful of programs the
//! pipeline invokes, plus the job-control cleanup command run between
//! batches. The suite root is resolved once, up front; a missing
//! installation is a terminal configuration error.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tracing::debug;

/// Primary environment variable naming the suite installation root.
const ENV_SCHRODINGER: &str = "SCHRODINGER18";

/// Fallback environment variable checked when the primary is unset.
const ENV_SCHRODINGER_ALT: &str = "SCHRODINGER18_4";

/// Default installation root when neither environment variable is set.
const DEFAULT_ROOT: &str = "/opt/schrodinger2018-4";

/// Script name passed to the suite's `run` launcher for structure splitting.
pub const PV_CONVERT_SCRIPT: &str = "pv_convert.py";

/// Errors that can occur while resolving or talking to the suite.
#[derive(Debug, Error)]
pub enum SuiteError {
    /// The resolved installation root is not a directory.
    #[error("Schrödinger installation not found at {}", path.display())]
    NotFound { path: PathBuf },

    /// The job-control cleanup command exited with a failure status.
    #[error("jobcontrol cleanup exited with {status}")]
    CleanupFailed { status: std::process::ExitStatus },

    /// IO error spawning a suite command.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to a Schrödinger suite installation.
#[derive(Debug, Clone)]
pub struct SchrodingerSuite {
    root: PathBuf,
}

impl SchrodingerSuite {
    /// Creates a suite handle rooted at an explicit installation directory.
    ///
    /// # Errors
    ///
    /// Returns `SuiteError::NotFound` if the root is not a directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SuiteError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(SuiteError::NotFound { path: root });
        }
        Ok(Self { root })
    }

    /// Resolves the installation root from the environment.
    ///
    /// Checks `SCHRODINGER18`, then `SCHRODINGER18_4`, then falls back to
    /// `/opt/schrodinger2018-4`.
    ///
    /// # Errors
    ///
    /// Returns `SuiteError::NotFound` if the resolved root is not a
    /// directory.
    pub fn discover() -> Result<Self, SuiteError> {
        let root = std::env::var(ENV_SCHRODINGER)
            .or_else(|_| std::env::var(ENV_SCHRODINGER_ALT))
            .unwrap_or_else(|_| DEFAULT_ROOT.to_string());
        Self::new(root)
    }

    /// The installation root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the PrepWizard structure preparation utility.
    pub fn prepwizard(&self) -> PathBuf {
        self.root.join("utilities").join("prepwizard")
    }

    /// Path to the `run` script launcher (used with [`PV_CONVERT_SCRIPT`]).
    pub fn run_launcher(&self) -> PathBuf {
        self.root.join("run")
    }

    /// Path to the Glide grid generation utility.
    pub fn glide_gridgen(&self) -> PathBuf {
        self.root.join("utilities").join("generate_glide_grids")
    }

    /// Path to the e-pharmacophore hypothesis utility.
    pub fn epharmacophores(&self) -> PathBuf {
        self.root.join("utilities").join("epharmacophores")
    }

    /// Path to the job-control command.
    pub fn jobcontrol(&self) -> PathBuf {
        self.root.join("jobcontrol")
    }

    /// Deletes finished job bookkeeping from the suite's job database.
    ///
    /// Invoked once per batch; the caller treats failure as non-fatal.
    ///
    /// # Errors
    ///
    /// Returns `SuiteError::Io` if the command cannot be spawned and
    /// `SuiteError::CleanupFailed` if it exits non-zero.
    pub async fn cleanup_finished_jobs(&self) -> Result<(), SuiteError> {
        debug!(command = %self.jobcontrol().display(), "Deleting finished jobs");

        let status = tokio::process::Command::new(self.jobcontrol())
            .args(["-delete", "finished"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            return Err(SuiteError::CleanupFailed { status });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn write_script(path: &Path, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_new_requires_existing_directory() {
        let result = SchrodingerSuite::new("/nonexistent/schrodinger");
        assert!(matches!(result, Err(SuiteError::NotFound { .. })));

        let temp = TempDir::new().unwrap();
        assert!(SchrodingerSuite::new(temp.path()).is_ok());
    }

    #[test]
    fn test_program_paths() {
        let temp = TempDir::new().unwrap();
        let suite = SchrodingerSuite::new(temp.path()).unwrap();

        assert_eq!(suite.prepwizard(), temp.path().join("utilities/prepwizard"));
        assert_eq!(suite.run_launcher(), temp.path().join("run"));
        assert_eq!(
            suite.glide_gridgen(),
            temp.path().join("utilities/generate_glide_grids")
        );
        assert_eq!(
            suite.epharmacophores(),
            temp.path().join("utilities/epharmacophores")
        );
        assert_eq!(suite.jobcontrol(), temp.path().join("jobcontrol"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cleanup_success() {
        let temp = TempDir::new().unwrap();
        write_script(&temp.path().join("jobcontrol"), "exit 0");

        let suite = SchrodingerSuite::new(temp.path()).unwrap();
        assert!(suite.cleanup_finished_jobs().await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cleanup_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        write_script(&temp.path().join("jobcontrol"), "exit 3");

        let suite = SchrodingerSuite::new(temp.path()).unwrap();
        let result = suite.cleanup_finished_jobs().await;
        assert!(matches!(result, Err(SuiteError::CleanupFailed { .. })));
    }

    #[tokio::test]
    async fn test_cleanup_missing_command_is_io_error() {
        let temp = TempDir::new().unwrap();
        let suite = SchrodingerSuite::new(temp.path()).unwrap();

        let result = suite.cleanup_finished_jobs().await;
        assert!(matches!(result, Err(SuiteError::Io(_))));
    }
}
