//! Library normalization command.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crossbeam_channel::Receiver;

use super::{display_name, interrupted, report_error, run_interruptible};
use crate::config::NormalizeSettings;
use crate::encoder::FormatEncoder;
use crate::normalizer::{FileOutcome, Normalizer, Progress, RunSummary};

/// Normalize every track under `root`.
pub fn cmd_normalize(
    root: &Path,
    settings: NormalizeSettings,
    ffmpeg: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let dry_run = settings.dry_run;
    let (tx, rx) = crossbeam_channel::unbounded();
    let normalizer = Normalizer::new(settings)
        .with_encoder(Arc::new(FormatEncoder::with_ffmpeg_path(ffmpeg)))
        .with_events(tx);
    let cancel = normalizer.cancel_flag();

    if dry_run {
        println!("DRY RUN - no files will be changed\n");
    }

    let printer = std::thread::spawn(move || print_progress(&rx));
    let root = root.to_path_buf();
    let result = run_interruptible(cancel, move || normalizer.run(&root))?;
    let _ = printer.join();

    match result {
        Ok(summary) => {
            print_summary(&summary);
            Ok(if summary.cancelled {
                interrupted()
            } else {
                ExitCode::SUCCESS
            })
        }
        Err(e) => Ok(report_error(&e)),
    }
}

fn print_progress(rx: &Receiver<Progress>) {
    for event in rx {
        match event {
            Progress::Scanned { files } => println!("Found {files} audio file(s)\n"),
            Progress::Measured {
                done,
                total,
                path,
                loudness,
            } => match loudness {
                Some(db) => println!("[{done}/{total}] {} (dbfs={db:.3})", display_name(&path)),
                None => println!("[{done}/{total}] {} unmeasurable", display_name(&path)),
            },
            Progress::TargetResolved {
                target,
                from_median,
            } => {
                let source = if from_median { "library median" } else { "fixed" };
                println!("\nTarget: {target:.3} dBFS ({source})\n");
            }
            Progress::Processed {
                done,
                total,
                report,
            } => {
                let name = display_name(&report.path);
                let level = report
                    .outcome
                    .loudness()
                    .map(|db| format!(" (dbfs={db:.3})"))
                    .unwrap_or_default();
                let status = match &report.outcome {
                    FileOutcome::InRange { .. } => "OK".to_string(),
                    FileOutcome::Normalized { after, delta, .. } => {
                        format!("Normalized {delta:+.2} dB -> {after:.3}")
                    }
                    FileOutcome::Limited {
                        wanted, applied, ..
                    } if *applied == 0.0 => {
                        format!("no peak headroom for {wanted:+.2} dB, left as is")
                    }
                    FileOutcome::Limited {
                        after,
                        wanted,
                        applied,
                        ..
                    } => format!("Limited {applied:+.2} of {wanted:+.2} dB -> {after:.3}"),
                    FileOutcome::WouldAdjust { delta, .. } => {
                        format!("would adjust {delta:+.2} dB")
                    }
                    FileOutcome::Failed(e) => format!("FAILED: {}", e.reason()),
                    FileOutcome::Cancelled => "skipped".to_string(),
                };
                println!("[{done}/{total}] {name}{level}... {status}");
            }
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!("\n=== Summary ===");
    match summary.target {
        Some(target) => println!("Target:      {target:.3} dBFS"),
        None => println!("Target:      not resolved"),
    }
    println!("In range:    {}", summary.in_range());
    println!("Normalized:  {}", summary.normalized());
    if summary.limited() > 0 {
        println!("Limited:     {} (peak headroom)", summary.limited());
    }
    if summary.would_adjust() > 0 {
        println!("Would adjust: {}", summary.would_adjust());
    }
    println!("Failed:      {}", summary.failed());
    if summary.cancelled {
        println!("Not processed: {} (interrupted)", summary.not_processed());
    }
    println!("Cache hits:  {}", summary.cache_hits);

    let failures = summary
        .unmeasurable
        .iter()
        .chain(summary.files.iter().filter_map(|r| match &r.outcome {
            FileOutcome::Failed(e) => Some(e),
            _ => None,
        }))
        .collect::<Vec<_>>();

    if !failures.is_empty() {
        println!("\nFailures:");
        for failure in failures {
            println!("  {failure}");
        }
    }
}
