//! Frame identity and selection.
//!
//! A frame is one MD trajectory snapshot, stored as `<index>.mae` in the
//! input directory. The integer index is the frame's identity; every
//! intermediate and terminal filename is derived from it, so downstream
//! stages can locate predecessor outputs without bookkeeping.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Input file extension for trajectory frames.
pub const MAE_EXT: &str = "mae";

/// Extension of the terminal hypothesis artifact.
pub const HYPOTHESIS_EXT: &str = "phypo";

/// Errors that can occur during frame selection.
#[derive(Debug, Error)]
pub enum SelectError {
    /// No input file matched the requested range and stride.
    #[error("No .mae frames in {} match range {start}..={end} with step {step}", dir.display())]
    NoFrames {
        dir: PathBuf,
        start: u32,
        end: u32,
        step: u32,
    },

    /// Two input files parsed to the same frame index.
    #[error("Duplicate frame index {index} in input directory")]
    DuplicateIndex { index: u32 },

    /// IO error while scanning the input directory.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One independently processable input frame.
///
/// Working filenames are canonicalized from the parsed index, so a
/// zero-padded input like `007.mae` works under the name `7` throughout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    index: u32,
    source: PathBuf,
}

impl Frame {
    /// Creates a frame from its index and source path.
    pub fn new(index: u32, source: impl Into<PathBuf>) -> Self {
        Self {
            index,
            source: source.into(),
        }
    }

    /// The frame's integer identity.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Path of the original input file.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Name of the working copy of the input.
    pub fn work_name(&self) -> String {
        format!("{}.{}", self.index, MAE_EXT)
    }

    /// Name PrepWizard writes its raw output under, before renaming.
    pub fn prepared_raw_name(&self, ph: f64) -> String {
        format!("{}_pH{}_prepared.mae", self.index, crate::config::float_arg(ph))
    }

    /// Name of the prepared structure consumed by the split stage.
    pub fn prepared_name(&self) -> String {
        format!("{}_prepared.mae", self.index)
    }

    /// PrepWizard scratch files removed after the prepare stage.
    pub fn protassign_scratch_names(&self) -> [String; 3] {
        [
            format!("{}-protassign.log", self.index),
            format!("{}-protassign.mae", self.index),
            format!("{}-protassign-out.mae", self.index),
        ]
    }

    /// Name of the split ligand structure.
    pub fn ligand_name(&self) -> String {
        format!("{}_prepared-out_lig.mae", self.index)
    }

    /// Name of the split receptor structure.
    pub fn receptor_name(&self) -> String {
        format!("{}_prepared-out_recep.mae", self.index)
    }

    /// Name of the grid job submission input.
    pub fn grid_csv_name(&self) -> String {
        format!("{}_grid_input.csv", self.index)
    }

    /// Name of the frame-local copy of the matched grid archive.
    pub fn grid_zip_name(&self) -> String {
        format!("{}_grid.zip", self.index)
    }

    /// Job name prefix for hypothesis generation.
    pub fn hypothesis_job_name(&self) -> String {
        format!("{}_hypo", self.index)
    }

    /// Name of the terminal hypothesis artifact.
    pub fn hypothesis_artifact_name(&self) -> String {
        format!("{}_hypo.{}", self.index, HYPOTHESIS_EXT)
    }
}

/// Selects the frames to process from the input directory.
///
/// Returns every frame with index `i` such that `start <= i <= end` and
/// `(i - start) % step == 0` whose input file exists, sorted ascending by
/// index. Files that are not named `<integer>.mae` are ignored. The scan is
/// deterministic and side-effect-free.
///
/// # Errors
///
/// Returns `SelectError::NoFrames` if the selection is empty,
/// `SelectError::DuplicateIndex` if two files carry the same index, and
/// `SelectError::Io` if the directory cannot be read.
pub fn select_frames(
    input_dir: &Path,
    start: u32,
    end: u32,
    step: u32,
) -> Result<Vec<Frame>, SelectError> {
    let mut frames: Vec<Frame> = Vec::new();

    for entry in std::fs::read_dir(input_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let Some(index) = parse_frame_index(&entry.file_name()) else {
            continue;
        };

        if index < start || index > end || (index - start) % step != 0 {
            continue;
        }

        frames.push(Frame::new(index, entry.path()));
    }

    frames.sort_by_key(Frame::index);

    for pair in frames.windows(2) {
        if pair[0].index == pair[1].index {
            return Err(SelectError::DuplicateIndex {
                index: pair[0].index,
            });
        }
    }

    if frames.is_empty() {
        return Err(SelectError::NoFrames {
            dir: input_dir.to_path_buf(),
            start,
            end,
            step,
        });
    }

    Ok(frames)
}

/// Parses `<integer>.mae` into a frame index, rejecting everything else.
fn parse_frame_index(name: &std::ffi::OsStr) -> Option<u32> {
    let name = name.to_str()?;
    let stem = name.strip_suffix(&format!(".{}", MAE_EXT))?;
    stem.parse().ok()
}
