//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `normalize`: Measure and rewrite a library towards a common level
//! - `measure`: Measurement only, fills the cache
//! - `config`: Show or initialize the config file

mod config;
mod measure;
mod normalize;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::config::{Config, NormalizeSettings};
use crate::error::Error;
use crate::normalizer::CancelFlag;
use crate::scanner::ExtensionSet;

pub use config::cmd_config;
pub use measure::cmd_measure;
pub use normalize::cmd_normalize;

/// Exit code for a run stopped by Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

/// Music Leveler CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Bring every track in a library to a common loudness
    Normalize {
        /// Library directory (defaults to library.directory from the config)
        dir: Option<PathBuf>,

        /// Fixed target in dBFS instead of the library median
        #[arg(long, allow_negative_numbers = true)]
        target: Option<f64>,

        /// Leave files within this many dB of the target alone
        #[arg(long)]
        tolerance: Option<f64>,

        /// Dry run - report what would change without writing anything
        #[arg(long)]
        dry_run: bool,

        /// ffmpeg binary to encode MP3, FLAC and M4A with
        #[arg(long, env = "MUSIC_LEVELER_FFMPEG")]
        ffmpeg: Option<PathBuf>,

        /// Workers for rewriting
        #[arg(long)]
        rewrite_jobs: Option<usize>,

        #[command(flatten)]
        scan: ScanArgs,
    },
    /// Measure every track and report the library median
    Measure {
        /// Library directory (defaults to library.directory from the config)
        dir: Option<PathBuf>,

        #[command(flatten)]
        scan: ScanArgs,
    },
    /// Show the effective configuration
    Config {
        /// Write the default configuration file if none exists
        #[arg(long)]
        init: bool,
    },
}

/// Options shared by commands that scan and measure.
#[derive(Args, Debug, Default)]
pub struct ScanArgs {
    /// Audio extension to include (repeatable, replaces the configured set)
    #[arg(long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Workers for measurement
    #[arg(long)]
    pub measure_jobs: Option<usize>,
}

/// Run the specified CLI command and return the process exit code.
pub fn run_command(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = crate::config::load();

    match &cli.command {
        Commands::Normalize {
            dir,
            target,
            tolerance,
            dry_run,
            ffmpeg,
            rewrite_jobs,
            scan,
        } => {
            let mut settings = settings_from(&config, scan);
            if target.is_some() {
                settings.target_loudness = *target;
            }
            if let Some(tolerance) = tolerance {
                settings.tolerance_db = *tolerance;
            }
            if let Some(jobs) = rewrite_jobs {
                settings.rewrite_concurrency = *jobs;
            }
            settings.dry_run = *dry_run;

            let root = library_dir(dir.as_deref(), &config)?;
            let ffmpeg = ffmpeg.clone().or_else(|| config.tools.ffmpeg_path.clone());
            cmd_normalize(&root, settings, ffmpeg)
        }
        Commands::Measure { dir, scan } => {
            let root = library_dir(dir.as_deref(), &config)?;
            cmd_measure(&root, settings_from(&config, scan))
        }
        Commands::Config { init } => {
            cmd_config(&config, *init)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Config file values with command-line overrides applied.
fn settings_from(config: &Config, scan: &ScanArgs) -> NormalizeSettings {
    let mut settings = NormalizeSettings::from(&config.normalize);
    if !scan.extensions.is_empty() {
        settings.extensions = ExtensionSet::new(&scan.extensions);
    }
    if let Some(jobs) = scan.measure_jobs {
        settings.measurement_concurrency = jobs;
    }
    settings
}

fn library_dir(arg: Option<&Path>, config: &Config) -> anyhow::Result<PathBuf> {
    arg.map(Path::to_path_buf)
        .or_else(|| config.library.directory.clone())
        .context("No library directory given and library.directory is not set in the config")
}

/// A pending interrupt signal.
type Interrupt = Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>>;

/// How a supervised job ended.
#[derive(Debug)]
enum Supervised<T> {
    Finished(T),
    /// Interrupted a second time while winding down
    ForceQuit,
}

/// Run `job` on a blocking worker while listening for Ctrl-C.
///
/// The first Ctrl-C sets `cancel`; the job then winds down on its own and
/// its result is still returned. A second Ctrl-C exits immediately.
fn run_interruptible<T, F>(cancel: CancelFlag, job: F) -> anyhow::Result<crate::error::Result<T>>
where
    T: Send + 'static,
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
{
    let rt = Runtime::new()?;
    let outcome = rt.block_on(async move {
        let handle = tokio::task::spawn_blocking(job);
        supervise(handle, cancel, || Box::pin(tokio::signal::ctrl_c())).await
    })?;

    match outcome {
        Supervised::Finished(result) => Ok(result),
        Supervised::ForceQuit => {
            eprintln!("Interrupted again, exiting without waiting.");
            std::process::exit(EXIT_INTERRUPTED as i32)
        }
    }
}

/// Wait for `handle`, cancelling on the first interrupt and giving up on
/// the second.
async fn supervise<T, I>(
    mut handle: JoinHandle<T>,
    cancel: CancelFlag,
    mut interrupt: I,
) -> anyhow::Result<Supervised<T>>
where
    I: FnMut() -> Interrupt,
{
    tokio::select! {
        result = &mut handle => return Ok(Supervised::Finished(result?)),
        signal = interrupt() => {
            if let Err(e) = signal {
                tracing::warn!(error = %e, "Could not listen for Ctrl-C");
                return Ok(Supervised::Finished(handle.await?));
            }
            eprintln!("\nInterrupted. Finishing files in progress... (Ctrl-C again to quit now)");
            cancel.cancel();
        }
    }

    tokio::select! {
        result = &mut handle => Ok(Supervised::Finished(result?)),
        signal = interrupt() => match signal {
            Ok(()) => Ok(Supervised::ForceQuit),
            Err(e) => {
                tracing::warn!(error = %e, "Could not listen for Ctrl-C");
                Ok(Supervised::Finished(handle.await?))
            }
        },
    }
}

/// Print a fatal run error and map it to an exit code.
fn report_error(err: &Error) -> ExitCode {
    eprintln!("Error: {err}");
    if let Error::NoMeasurableAudio { .. } = err {
        eprintln!("Check that the files decode and are not silent.");
    }
    if err.is_fatal_input() {
        eprintln!("No files were changed.");
    }
    ExitCode::FAILURE
}

fn interrupted() -> ExitCode {
    ExitCode::from(EXIT_INTERRUPTED)
}

/// File name for progress lines, falling back to the full path.
fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
