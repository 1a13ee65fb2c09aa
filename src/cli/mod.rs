//! Command-line interface for examforge.
//!
//! Provides commands for running the generation pipeline and listing the
//! topic vocabulary.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
