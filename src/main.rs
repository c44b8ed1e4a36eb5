//! Music Leveler - loudness normalization for music libraries.
//!
//! Measures every track in a directory tree, picks a common target level
//! (the library median unless one is given) and rewrites the tracks that
//! stray too far from it, keeping their tags and artwork.

pub mod audio;
pub mod cli;
pub mod config;
pub mod encoder;
pub mod error;
pub mod loudness;
pub mod metadata;
pub mod normalizer;
pub mod scanner;
#[cfg(test)]
pub mod test_utils;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log targets used across the crate, filtered together with the crate name.
const LOG_TARGETS: &[&str] = &[
    "music_leveler",
    "audio",
    "cache",
    "encoder",
    "metadata",
    "normalizer",
    "scanner",
];

fn default_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    let directives = LOG_TARGETS
        .iter()
        .map(|t| format!("{t}={level}"))
        .collect::<Vec<_>>()
        .join(",");
    EnvFilter::new(directives)
}

fn main() -> ExitCode {
    let args = cli::Cli::parse();

    // RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(args.verbose));

    // Logs go to stderr so progress output on stdout stays clean
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli::run_command(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
