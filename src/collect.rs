//! Final collection of hypothesis artifacts.
//!
//! After the scheduler drains every batch, the working directory holds
//! one `.phypo` artifact per frame that completed all stages. This module
//! sweeps those into the saved-hypothesis directory, preserving artifact
//! filenames so the collection maps one-to-one onto frame identities.
//! Re-collection against an unchanged working directory overwrites in
//! place and yields the same collection.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::frame::HYPOTHESIS_EXT;

/// Errors raised while gathering hypothesis artifacts.
#[derive(Debug, Error)]
pub enum CollectError {
    /// Two artifact files resolve to the same frame identity. Frame
    /// identities are unique, so this means an upstream stage misnamed
    /// its output.
    #[error("Hypothesis artifacts {first:?} and {second:?} both claim frame {index}")]
    DuplicateArtifact {
        index: u32,
        first: String,
        second: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Copies every hypothesis artifact under `processed_dir` into
/// `destination`, returning the copied destination paths.
///
/// Artifacts are matched by the `.phypo` extension and keep their
/// filenames. Existing destination files are overwritten, so running the
/// collection twice against the same working directory is a no-op for
/// the collection contents.
///
/// # Errors
///
/// Returns [`CollectError::DuplicateArtifact`] when two artifacts parse
/// to the same frame index, and [`CollectError::Io`] when the scan or a
/// copy fails.
pub fn collect_hypotheses(
    processed_dir: &Path,
    destination: &Path,
) -> Result<Vec<PathBuf>, CollectError> {
    fs::create_dir_all(destination)?;

    let mut names = Vec::new();
    for entry in fs::read_dir(processed_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(HYPOTHESIS_EXT) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort();

    let mut seen: HashMap<u32, String> = HashMap::new();
    let mut collected = Vec::with_capacity(names.len());
    for name in names {
        if let Some(index) = artifact_index(&name) {
            if let Some(first) = seen.insert(index, name.clone()) {
                return Err(CollectError::DuplicateArtifact {
                    index,
                    first,
                    second: name,
                });
            }
        }
        let target = destination.join(&name);
        fs::copy(processed_dir.join(&name), &target)?;
        debug!(artifact = %name, "Collected hypothesis artifact");
        collected.push(target);
    }

    info!(
        collected = collected.len(),
        destination = %destination.display(),
        "Hypothesis collection complete"
    );
    Ok(collected)
}

/// Parses the frame index out of a `{index}_hypo.phypo` artifact name.
fn artifact_index(name: &str) -> Option<u32> {
    name.strip_suffix(HYPOTHESIS_EXT)
        .and_then(|stem| stem.strip_suffix('.'))
        .and_then(|stem| stem.strip_suffix("_hypo"))
        .and_then(|index| index.parse().ok())
}
