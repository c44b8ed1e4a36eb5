//! Command-line interface for music-leveler.
//!
//! Provides commands for normalizing a library, measuring it without
//! changes, and inspecting the configuration.

mod commands;

pub use commands::{Cli, Commands, run_command};
