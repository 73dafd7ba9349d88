//! Command-line interface for dynophore.
//!
//! Provides commands for running the frame pipeline and for gathering
//! finished hypothesis artifacts.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
