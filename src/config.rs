//! Run configuration for the e-pharmacophore pipeline.
//!
//! This module provides the explicit configuration surface for a pipeline
//! run: frame selection range, concurrency budget, batch sizing, stage
//! program tunables, grid-wait policy, and the workspace directory layout.
//! Everything is carried in one structure constructed up front and passed by
//! reference; there is no ambient global state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Directory name for per-frame working files, under the analysis directory.
const PROCESSED_DIR_NAME: &str = "PROCESSED_FILES";

/// Directory name for collected hypotheses, under the analysis directory.
const HYPOTHESIS_DIR_NAME: &str = "saved_HYPOTHESIS";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while preparing the workspace.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    // Frame selection
    /// First frame index to consider (inclusive).
    pub start: u32,
    /// Last frame index to consider (inclusive).
    pub end: u32,
    /// Stride between selected indices, anchored at `start`.
    pub step: u32,

    // Concurrency
    /// CPU core budget supplied by the user.
    pub ncores: usize,
    /// Divisor applied to `ncores` when sizing the per-batch worker pool,
    /// leaving scheduler slots for the stage programs' own threads.
    pub stage_headroom: usize,
    /// Maximum number of frames per batch.
    pub batch_size: usize,

    // Stage program behavior
    /// Niceness increment applied to every stage program.
    pub nice_level: i32,
    /// Protonation pH passed to PrepWizard's propKa step.
    pub propka_ph: f64,
    /// Scalar parameters for hypothesis generation.
    pub hypothesis: HypothesisParams,

    // Grid wait policy
    /// Delay between scans while waiting for a grid archive.
    pub poll_interval: Duration,
    /// Maximum time to wait for a grid archive before failing the frame.
    pub grid_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start: 1,
            end: 1,
            step: 1,

            ncores: default_core_budget(),
            stage_headroom: 2,
            batch_size: default_core_budget(),

            nice_level: 10,
            propka_ph: 7.4,
            hypothesis: HypothesisParams::default(),

            poll_interval: Duration::from_secs(2),
            grid_timeout: Duration::from_secs(3600),
        }
    }
}

impl RunConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the inclusive frame index range.
    pub fn with_range(mut self, start: u32, end: u32) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Sets the selection stride.
    pub fn with_step(mut self, step: u32) -> Self {
        self.step = step;
        self
    }

    /// Sets the CPU core budget.
    pub fn with_ncores(mut self, ncores: usize) -> Self {
        self.ncores = ncores;
        self
    }

    /// Sets the worker-pool headroom divisor.
    pub fn with_stage_headroom(mut self, headroom: usize) -> Self {
        self.stage_headroom = headroom;
        self
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the niceness increment for stage programs.
    pub fn with_nice_level(mut self, level: i32) -> Self {
        self.nice_level = level;
        self
    }

    /// Sets the propKa pH.
    pub fn with_propka_ph(mut self, ph: f64) -> Self {
        self.propka_ph = ph;
        self
    }

    /// Sets the inter-poll delay for grid waits.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the grid-wait timeout.
    pub fn with_grid_timeout(mut self, timeout: Duration) -> Self {
        self.grid_timeout = timeout;
        self
    }

    /// Number of concurrent frame pipelines a batch may run.
    ///
    /// The batch scheduler additionally caps this by the batch length.
    pub fn worker_slots(&self) -> usize {
        (self.ncores / self.stage_headroom).max(1)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start == 0 {
            return Err(ConfigError::ValidationFailed(
                "start must be a positive frame index".to_string(),
            ));
        }

        if self.end < self.start {
            return Err(ConfigError::ValidationFailed(format!(
                "end ({}) must not be less than start ({})",
                self.end, self.start
            )));
        }

        if self.step == 0 {
            return Err(ConfigError::ValidationFailed(
                "step must be greater than 0".to_string(),
            ));
        }

        if self.ncores == 0 {
            return Err(ConfigError::ValidationFailed(
                "ncores must be greater than 0".to_string(),
            ));
        }

        if self.stage_headroom == 0 {
            return Err(ConfigError::ValidationFailed(
                "stage_headroom must be greater than 0".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=14.0).contains(&self.propka_ph) {
            return Err(ConfigError::ValidationFailed(
                "propka_ph must be between 0.0 and 14.0".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        if self.grid_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "grid_timeout must be greater than 0".to_string(),
            ));
        }

        self.hypothesis.validate()?;

        Ok(())
    }
}

/// Scalar parameters passed to the hypothesis generation program.
///
/// Defaults reproduce the established protocol: seven features, 2.0 Å site
/// spacing, 4.0 Å pair spacing, half-scaled excluded volumes with a 2.0 Å
/// buffer and a 5.0 Å limit, submitted to a single local job slot.
#[derive(Debug, Clone)]
pub struct HypothesisParams {
    /// Maximum number of pharmacophore features (`-f`).
    pub max_features: u32,
    /// Minimum inter-site distance in Å (`-site_dist`).
    pub site_dist: f64,
    /// Minimum distance between feature pairs in Å (`-pair_dist`).
    pub pair_dist: f64,
    /// Excluded-volume scale factor (`-scale`).
    pub xvol_scale: f64,
    /// Excluded-volume buffer in Å (`-buff`).
    pub buffer: f64,
    /// Excluded-volume limit in Å (`-limit`).
    pub limit: f64,
    /// Job host specification (`-HOST`).
    pub host: String,
}

impl Default for HypothesisParams {
    fn default() -> Self {
        Self {
            max_features: 7,
            site_dist: 2.0,
            pair_dist: 4.0,
            xvol_scale: 0.5,
            buffer: 2.0,
            limit: 5.0,
            host: "localhost:1".to_string(),
        }
    }
}

impl HypothesisParams {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_features == 0 {
            return Err(ConfigError::ValidationFailed(
                "hypothesis max_features must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("site_dist", self.site_dist),
            ("pair_dist", self.pair_dist),
            ("xvol_scale", self.xvol_scale),
            ("buffer", self.buffer),
            ("limit", self.limit),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "hypothesis {} must be greater than 0",
                    name
                )));
            }
        }

        if self.host.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "hypothesis host cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Directory layout for one pipeline run.
///
/// Input frames live in `input_dir`; all intermediate files are written into
/// the processed directory and collected hypotheses into the hypothesis
/// directory, both under `analysis_dir`.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Directory holding `<index>.mae` input frames.
    pub input_dir: PathBuf,
    /// Root directory for this run's outputs.
    pub analysis_dir: PathBuf,
}

impl Workspace {
    /// Creates a workspace layout rooted at the given directories.
    pub fn new(input_dir: impl Into<PathBuf>, analysis_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            analysis_dir: analysis_dir.into(),
        }
    }

    /// Creates the conventional layout under a base directory:
    /// `<base>/input_mae_files` and `<base>/DYNOPHORE_ANALYSIS`.
    pub fn under(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self::new(base.join("input_mae_files"), base.join("DYNOPHORE_ANALYSIS"))
    }

    /// Directory holding per-frame working files.
    pub fn processed_dir(&self) -> PathBuf {
        self.analysis_dir.join(PROCESSED_DIR_NAME)
    }

    /// Directory receiving collected hypothesis artifacts.
    pub fn hypothesis_dir(&self) -> PathBuf {
        self.analysis_dir.join(HYPOTHESIS_DIR_NAME)
    }

    /// Creates the analysis, processed, and hypothesis directories.
    ///
    /// The input directory is not created: missing inputs are a selection
    /// error, not a bootstrap concern.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if any directory cannot be created.
    pub fn ensure(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.analysis_dir)?;
        std::fs::create_dir_all(self.processed_dir())?;
        std::fs::create_dir_all(self.hypothesis_dir())?;
        Ok(())
    }
}

/// Default CPU core budget: 75% of available parallelism, at least one.
pub fn default_core_budget() -> usize {
    let total = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    (total * 3 / 4).max(1)
}

/// Formats a scalar the way the suite tools spell them: integral values
/// keep one decimal place (`7.0`, not `7`), everything else prints as-is.
pub(crate) fn float_arg(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.start, 1);
        assert_eq!(config.end, 1);
        assert_eq!(config.step, 1);
        assert_eq!(config.stage_headroom, 2);
        assert_eq!(config.nice_level, 10);
        assert!((config.propka_ph - 7.4).abs() < f64::EPSILON);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.grid_timeout, Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RunConfig::new()
            .with_range(10, 500)
            .with_step(5)
            .with_ncores(16)
            .with_stage_headroom(4)
            .with_batch_size(8)
            .with_nice_level(15)
            .with_propka_ph(7.0)
            .with_poll_interval(Duration::from_millis(500))
            .with_grid_timeout(Duration::from_secs(600));

        assert_eq!(config.start, 10);
        assert_eq!(config.end, 500);
        assert_eq!(config.step, 5);
        assert_eq!(config.ncores, 16);
        assert_eq!(config.stage_headroom, 4);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.nice_level, 15);
        assert!((config.propka_ph - 7.0).abs() < f64::EPSILON);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.grid_timeout, Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_worker_slots_halves_core_budget() {
        let config = RunConfig::new().with_ncores(8).with_stage_headroom(2);
        assert_eq!(config.worker_slots(), 4);
    }

    #[test]
    fn test_worker_slots_never_zero() {
        let config = RunConfig::new().with_ncores(1).with_stage_headroom(4);
        assert_eq!(config.worker_slots(), 1);
    }

    #[test]
    fn test_validation_zero_start() {
        let config = RunConfig::new().with_range(0, 10);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("start"));
    }

    #[test]
    fn test_validation_end_before_start() {
        let config = RunConfig::new().with_range(10, 5);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("end"));
    }

    #[test]
    fn test_validation_zero_step() {
        let config = RunConfig::new().with_step(0);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("step"));
    }

    #[test]
    fn test_validation_zero_ncores() {
        let config = RunConfig::new().with_ncores(0);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("ncores"));
    }

    #[test]
    fn test_validation_zero_headroom() {
        let config = RunConfig::new().with_stage_headroom(0);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("stage_headroom"));
    }

    #[test]
    fn test_validation_zero_batch() {
        let config = RunConfig::new().with_batch_size(0);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("batch_size"));
    }

    #[test]
    fn test_validation_absurd_ph() {
        let config = RunConfig::new().with_propka_ph(19.0);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("propka_ph"));
    }

    #[test]
    fn test_validation_zero_poll_interval() {
        let config = RunConfig::new().with_poll_interval(Duration::ZERO);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("poll_interval"));
    }

    #[test]
    fn test_hypothesis_defaults() {
        let params = HypothesisParams::default();
        assert_eq!(params.max_features, 7);
        assert!((params.site_dist - 2.0).abs() < f64::EPSILON);
        assert!((params.pair_dist - 4.0).abs() < f64::EPSILON);
        assert!((params.xvol_scale - 0.5).abs() < f64::EPSILON);
        assert!((params.buffer - 2.0).abs() < f64::EPSILON);
        assert!((params.limit - 5.0).abs() < f64::EPSILON);
        assert_eq!(params.host, "localhost:1");
    }

    #[test]
    fn test_hypothesis_validation() {
        let mut config = RunConfig::default();
        config.hypothesis.site_dist = 0.0;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("site_dist"));

        let mut config = RunConfig::default();
        config.hypothesis.host = String::new();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("host"));
    }

    #[test]
    fn test_workspace_layout() {
        let ws = Workspace::under("/data/run1");
        assert_eq!(ws.input_dir, PathBuf::from("/data/run1/input_mae_files"));
        assert_eq!(
            ws.processed_dir(),
            PathBuf::from("/data/run1/DYNOPHORE_ANALYSIS/PROCESSED_FILES")
        );
        assert_eq!(
            ws.hypothesis_dir(),
            PathBuf::from("/data/run1/DYNOPHORE_ANALYSIS/saved_HYPOTHESIS")
        );
    }

    #[test]
    fn test_workspace_ensure_creates_directories() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::under(temp.path());
        ws.ensure().unwrap();

        assert!(ws.analysis_dir.is_dir());
        assert!(ws.processed_dir().is_dir());
        assert!(ws.hypothesis_dir().is_dir());
        assert!(!ws.input_dir.exists());
    }

    #[test]
    fn test_default_core_budget_positive() {
        assert!(default_core_budget() >= 1);
    }

    #[test]
    fn test_float_arg_keeps_trailing_decimal() {
        assert_eq!(float_arg(7.4), "7.4");
        assert_eq!(float_arg(7.0), "7.0");
        assert_eq!(float_arg(2.0), "2.0");
        assert_eq!(float_arg(0.5), "0.5");
    }
}
