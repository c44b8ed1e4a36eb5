//! Measure-only command.

use std::path::Path;
use std::process::ExitCode;

use super::{display_name, interrupted, report_error, run_interruptible};
use crate::config::NormalizeSettings;
use crate::normalizer::{Normalizer, Progress};

/// Measure every track under `root`, print levels and the median.
pub fn cmd_measure(root: &Path, settings: NormalizeSettings) -> anyhow::Result<ExitCode> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let normalizer = Normalizer::new(settings).with_events(tx);
    let cancel = normalizer.cancel_flag();

    let printer = std::thread::spawn(move || {
        for event in rx {
            if let Progress::Measured {
                done,
                total,
                path,
                loudness,
            } = event
            {
                match loudness {
                    Some(db) => println!("[{done}/{total}] {} (dbfs={db:.3})", display_name(&path)),
                    None => println!("[{done}/{total}] {} unmeasurable", display_name(&path)),
                }
            }
        }
    });

    let root = root.to_path_buf();
    let result = run_interruptible(cancel, move || normalizer.measure(&root))?;
    let _ = printer.join();

    let report = match result {
        Ok(report) => report,
        Err(e) => return Ok(report_error(&e)),
    };

    println!();
    println!("Measured:    {}/{}", report.measured(), report.samples.len());
    if report.not_measured > 0 {
        println!("Not measured: {} (interrupted)", report.not_measured);
    }
    println!("Cache hits:  {}", report.cache_hits);
    match report.median {
        Some(median) => println!("Median:      {median:.3} dBFS"),
        None => println!("Median:      none (nothing measurable)"),
    }

    Ok(if report.cancelled {
        interrupted()
    } else {
        ExitCode::SUCCESS
    })
}
