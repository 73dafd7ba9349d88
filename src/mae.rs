//! Minimal Maestro structure reader.
//!
//! Reads just enough of the text `.mae` format to compute a ligand
//! centroid: the first `m_atom` block's `r_m_x_coord` / `r_m_y_coord` /
//! `r_m_z_coord` columns. Everything else in the file is skipped.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while reading a structure file.
#[derive(Debug, Error)]
pub enum MaeError {
    /// The file contains no `m_atom` block.
    #[error("No m_atom block in {}", path.display())]
    MissingAtomBlock { path: PathBuf },

    /// The atom block holds zero atoms, so no centroid exists.
    #[error("Structure in {} has no atoms", path.display())]
    NoAtoms { path: PathBuf },

    /// The atom block does not parse.
    #[error("Malformed atom block in {}: {detail}", path.display())]
    Malformed { path: PathBuf, detail: String },

    /// IO error reading the file.
    #[error("Failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Geometric mean position of a structure's atoms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl fmt::Display for Centroid {
    /// Formats as the comma-joined label the grid and hypothesis tools
    /// take, each component rounded to two decimals: `12.34,-5.60,0.00`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2},{:.2},{:.2}", self.x, self.y, self.z)
    }
}

/// Computes the centroid of the first structure in a `.mae` file.
///
/// # Errors
///
/// Returns `MaeError::MissingAtomBlock` if no `m_atom` block is present,
/// `MaeError::NoAtoms` for an empty block, and `MaeError::Malformed` when
/// the block cannot be parsed.
pub fn ligand_centroid(path: &Path) -> Result<Centroid, MaeError> {
    let text = std::fs::read_to_string(path).map_err(|source| MaeError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let malformed = |detail: &str| MaeError::Malformed {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    };

    let mut lines = text.lines().map(str::trim);

    // Skip ahead to the first atom block.
    lines
        .by_ref()
        .find(|line| line.starts_with("m_atom["))
        .ok_or_else(|| MaeError::MissingAtomBlock {
            path: path.to_path_buf(),
        })?;

    // Column declarations run until the ::: separator. The leading row
    // index column is implicit and only appears as a comment.
    let mut columns: Vec<&str> = Vec::new();
    for line in lines.by_ref() {
        if line == ":::" {
            break;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        columns.push(line);
    }

    let coord_slot = |name: &str| -> Result<usize, MaeError> {
        columns
            .iter()
            .position(|column| *column == name)
            // +1 skips the implicit atom-index token at the row start.
            .map(|position| position + 1)
            .ok_or_else(|| malformed(&format!("missing {} column", name)))
    };
    let x_slot = coord_slot("r_m_x_coord")?;
    let y_slot = coord_slot("r_m_y_coord")?;
    let z_slot = coord_slot("r_m_z_coord")?;

    let mut sum = [0.0f64; 3];
    let mut atoms = 0usize;

    for line in lines {
        if line == ":::" {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let tokens = split_row(line);
        let coord = |slot: usize| -> Result<f64, MaeError> {
            let token = tokens
                .get(slot)
                .ok_or_else(|| malformed(&format!("atom record has {} fields", tokens.len())))?;
            token
                .parse()
                .map_err(|_| malformed(&format!("bad coordinate {:?}", token)))
        };

        sum[0] += coord(x_slot)?;
        sum[1] += coord(y_slot)?;
        sum[2] += coord(z_slot)?;
        atoms += 1;
    }

    if atoms == 0 {
        return Err(MaeError::NoAtoms {
            path: path.to_path_buf(),
        });
    }

    let count = atoms as f64;
    Ok(Centroid {
        x: sum[0] / count,
        y: sum[1] / count,
        z: sum[2] / count,
    })
}

/// Splits a data row into tokens, honoring double-quoted strings so that
/// values like PDB atom names with embedded spaces stay single tokens.
fn split_row(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = line;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return tokens;
        }

        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').unwrap_or(quoted.len());
            tokens.push(&quoted[..end]);
            rest = &quoted[(end + 1).min(quoted.len())..];
        } else {
            let end = rest
                .find(char::is_whitespace)
                .unwrap_or(rest.len());
            tokens.push(&rest[..end]);
            rest = &rest[end..];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_mae(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    const THREE_ATOM_LIGAND: &str = r#"
f_m_ct {
  s_m_title
  :::
  "ligand"
  m_atom[3] {
    # First column is atom index #
    i_m_mmod_type
    r_m_x_coord
    r_m_y_coord
    r_m_z_coord
    s_m_pdb_atom_name
    :::
    1 26 1.0 2.0 3.0 " C1 "
    2 26 2.0 4.0 6.0 " C2 "
    3 26 3.0 6.0 9.0 " O1 "
    :::
  }
}
"#;

    #[test]
    fn test_centroid_is_mean_of_atom_coordinates() {
        let temp = TempDir::new().unwrap();
        let path = write_mae(temp.path(), "lig.mae", THREE_ATOM_LIGAND);

        let centroid = ligand_centroid(&path).unwrap();

        assert!((centroid.x - 2.0).abs() < 1e-9);
        assert!((centroid.y - 4.0).abs() < 1e-9);
        assert!((centroid.z - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_centroid_label_rounds_to_two_decimals() {
        let centroid = Centroid {
            x: 12.3456,
            y: -5.6,
            z: 0.0,
        };
        assert_eq!(centroid.to_string(), "12.35,-5.60,0.00");
    }

    #[test]
    fn test_quoted_fields_before_coordinates() {
        let temp = TempDir::new().unwrap();
        let body = r#"
m_atom[2] {
  s_m_pdb_residue_name
  r_m_x_coord
  r_m_y_coord
  r_m_z_coord
  :::
  1 "UNK " 1.0 1.0 1.0
  2 "UNK " 3.0 3.0 3.0
  :::
}
"#;
        let path = write_mae(temp.path(), "lig.mae", body);

        let centroid = ligand_centroid(&path).unwrap();
        assert!((centroid.x - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_atom_block() {
        let temp = TempDir::new().unwrap();
        let path = write_mae(temp.path(), "empty.mae", "f_m_ct {\n  :::\n}\n");

        let result = ligand_centroid(&path);
        assert!(matches!(result, Err(MaeError::MissingAtomBlock { .. })));
    }

    #[test]
    fn test_block_with_no_atoms() {
        let temp = TempDir::new().unwrap();
        let body = "m_atom[0] {\n  r_m_x_coord\n  r_m_y_coord\n  r_m_z_coord\n  :::\n  :::\n}\n";
        let path = write_mae(temp.path(), "bare.mae", body);

        let result = ligand_centroid(&path);
        assert!(matches!(result, Err(MaeError::NoAtoms { .. })));
    }

    #[test]
    fn test_unparseable_coordinate() {
        let temp = TempDir::new().unwrap();
        let body = "m_atom[1] {\n  r_m_x_coord\n  r_m_y_coord\n  r_m_z_coord\n  :::\n  1 oops 2.0 3.0\n  :::\n}\n";
        let path = write_mae(temp.path(), "bad.mae", body);

        let result = ligand_centroid(&path);
        assert!(matches!(result, Err(MaeError::Malformed { .. })));
    }

    #[test]
    fn test_missing_coordinate_column() {
        let temp = TempDir::new().unwrap();
        let body = "m_atom[1] {\n  r_m_x_coord\n  r_m_y_coord\n  :::\n  1 1.0 2.0\n  :::\n}\n";
        let path = write_mae(temp.path(), "flat.mae", body);

        let result = ligand_centroid(&path);
        assert!(matches!(result, Err(MaeError::Malformed { .. })));
    }
}
