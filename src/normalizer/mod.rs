//! Library-wide loudness normalization.
//!
//! A run goes through these steps:
//!
//! 1. Resolve the root and scan it for candidate files
//! 2. Load the loudness cache
//! 3. Measurement phase (skipped when a target is given): measure every
//!    candidate on the measurement pool, cache hits first
//! 4. Checkpoint the cache, fix the target (median or explicit)
//! 5. Rewrite phase: on the rewrite pool, leave in-range files alone and
//!    rewrite the rest with a uniform gain, tags and artwork restored
//! 6. Final cache checkpoint
//!
//! Failures in one file never stop the batch; they show up in that file's
//! [`FileOutcome`]. Only a bad root or a library with nothing measurable
//! fails the whole run.
//!
//! Cancellation is cooperative: a set [`CancelFlag`] stops new files from
//! being dispatched, files already in flight finish, and the cache is
//! flushed before returning.

mod report;
mod rewrite;

pub use report::{FileOutcome, FileReport, MeasureReport, Progress, RunSummary};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_channel::Sender;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::NormalizeSettings;
use crate::encoder::{Encoder, FormatEncoder};
use crate::error::{Error, FileError, Result, ResultExt};
use crate::loudness::{DecodingMeter, LoudnessCache, LoudnessMeter, LoudnessSample, median, resolve_target};
use crate::scanner;

/// Shared interrupt flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs measurement and rewrites over a library.
pub struct Normalizer {
    settings: NormalizeSettings,
    meter: Arc<dyn LoudnessMeter>,
    encoder: Arc<dyn Encoder>,
    events: Option<Sender<Progress>>,
    cancel: CancelFlag,
}

impl Normalizer {
    /// Normalizer that decodes with symphonia and encodes with the
    /// container's default encoder.
    pub fn new(settings: NormalizeSettings) -> Self {
        Self {
            settings,
            meter: Arc::new(DecodingMeter),
            encoder: Arc::new(FormatEncoder::default()),
            events: None,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_meter(mut self, meter: Arc<dyn LoudnessMeter>) -> Self {
        self.meter = meter;
        self
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Send [`Progress`] events to `events` while running.
    pub fn with_events(mut self, events: Sender<Progress>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Normalize every audio file under `root` towards a common level.
    pub fn run(&self, root: &Path) -> Result<RunSummary> {
        self.settings.validate()?;
        let (root, files) = self.discover(root)?;
        let cache = LoudnessCache::load(&root);

        let mut unmeasurable = Vec::new();
        let (target, target_from_median, candidates) = match self.settings.target_loudness {
            Some(target) => (target, false, files),
            None => {
                let measured = self.measure_all(&files, &cache)?;
                self.checkpoint(&cache);

                if self.cancel.is_cancelled() {
                    info!(target: "normalizer", "Cancelled during measurement, nothing rewritten");
                    return Ok(RunSummary {
                        root,
                        target: None,
                        target_from_median: true,
                        unmeasurable: Vec::new(),
                        files: Vec::new(),
                        cancelled: true,
                        cache_hits: cache.hits(),
                    });
                }

                let samples = measured.iter().filter_map(to_sample).collect::<Vec<_>>();
                let target = resolve_target(&root, &samples, None)?;

                let mut candidates = Vec::with_capacity(measured.len());
                for (path, result) in measured {
                    match result {
                        Some(Ok(_)) => candidates.push(path),
                        Some(Err(e)) => unmeasurable.push(e),
                        None => {}
                    }
                }
                (target, true, candidates)
            }
        };

        info!(
            target: "normalizer",
            target_dbfs = format_args!("{target:.2}"),
            from_median = target_from_median,
            tolerance_db = self.settings.tolerance_db,
            files = candidates.len(),
            dry_run = self.settings.dry_run,
            "Target resolved"
        );
        self.emit(Progress::TargetResolved {
            target,
            from_median: target_from_median,
        });

        let files = self.rewrite_all(&candidates, target, &cache)?;
        self.checkpoint(&cache);

        let summary = RunSummary {
            root,
            target: Some(target),
            target_from_median,
            unmeasurable,
            files,
            cancelled: self.cancel.is_cancelled(),
            cache_hits: cache.hits(),
        };

        info!(
            target: "normalizer",
            normalized = summary.normalized(),
            limited = summary.limited(),
            in_range = summary.in_range(),
            would_adjust = summary.would_adjust(),
            failed = summary.failed(),
            not_processed = summary.not_processed(),
            cache_hits = summary.cache_hits,
            cache_entries = cache.len(),
            "Run complete"
        );
        Ok(summary)
    }

    /// Measure every file under `root` without modifying anything except
    /// the cache.
    pub fn measure(&self, root: &Path) -> Result<MeasureReport> {
        self.settings.validate()?;
        let (root, files) = self.discover(root)?;
        let cache = LoudnessCache::load(&root);

        let measured = self.measure_all(&files, &cache)?;
        self.checkpoint(&cache);

        let samples = measured.iter().filter_map(to_sample).collect::<Vec<_>>();
        let values = samples.iter().filter_map(|s| s.loudness).collect::<Vec<_>>();

        Ok(MeasureReport {
            root,
            median: median(&values),
            not_measured: measured.len() - samples.len(),
            samples,
            cancelled: self.cancel.is_cancelled(),
            cache_hits: cache.hits(),
        })
    }

    fn discover(&self, root: &Path) -> Result<(PathBuf, Vec<PathBuf>)> {
        let root = scanner::resolve_root(root)?;
        let files = scanner::scan(&root, &self.settings.extensions);
        if files.is_empty() {
            return Err(Error::EmptyLibrary(root));
        }

        info!(target: "normalizer", root = %root.display(), files = files.len(), "Scanned library");
        self.emit(Progress::Scanned { files: files.len() });
        Ok((root, files))
    }

    /// Measurement phase. `None` marks files skipped after cancellation.
    #[allow(clippy::type_complexity)]
    fn measure_all(
        &self,
        files: &[PathBuf],
        cache: &LoudnessCache,
    ) -> Result<Vec<(PathBuf, Option<std::result::Result<f64, FileError>>)>> {
        let pool = build_pool(self.settings.measurement_concurrency, "measure")?;
        let total = files.len();
        let done = AtomicUsize::new(0);

        let results = pool.install(|| {
            files
                .par_iter()
                .map(|path| {
                    if self.cancel.is_cancelled() {
                        return (path.clone(), None);
                    }
                    let result = self.loudness_of(path, cache);
                    self.emit(Progress::Measured {
                        done: done.fetch_add(1, Ordering::SeqCst) + 1,
                        total,
                        path: path.clone(),
                        loudness: result.as_ref().ok().copied(),
                    });
                    (path.clone(), Some(result))
                })
                .collect::<Vec<_>>()
        });

        debug!(
            target: "normalizer::measure",
            files = total,
            measured = done.load(Ordering::SeqCst),
            "Measurement phase finished"
        );
        Ok(results)
    }

    /// Cached loudness, or a fresh measurement which is then cached.
    fn loudness_of(
        &self,
        path: &Path,
        cache: &LoudnessCache,
    ) -> std::result::Result<f64, FileError> {
        if let Some(loudness) = cache.get(path) {
            debug!(target: "normalizer::measure", path = %path.display(), loudness, "Cache hit");
            return Ok(loudness);
        }

        match self.meter.measure(path) {
            Ok(loudness) => {
                debug!(target: "normalizer::measure", path = %path.display(), loudness, "Measured");
                cache.put(path, loudness);
                Ok(loudness)
            }
            Err(e) => {
                warn!(target: "normalizer::measure", path = %path.display(), error = %e, "Unmeasurable, excluded");
                Err(FileError::unmeasurable(path, e))
            }
        }
    }

    /// Rewrite phase, outcomes in input order.
    fn rewrite_all(
        &self,
        files: &[PathBuf],
        target: f64,
        cache: &LoudnessCache,
    ) -> Result<Vec<FileReport>> {
        let pool = build_pool(self.settings.rewrite_concurrency, "rewrite")?;
        let total = files.len();
        let done = AtomicUsize::new(0);

        let reports = pool.install(|| {
            files
                .par_iter()
                .map(|path| {
                    if self.cancel.is_cancelled() {
                        return FileReport {
                            path: path.clone(),
                            outcome: FileOutcome::Cancelled,
                        };
                    }
                    let report = FileReport {
                        path: path.clone(),
                        outcome: self.process_file(path, target, cache),
                    };
                    self.emit(Progress::Processed {
                        done: done.fetch_add(1, Ordering::SeqCst) + 1,
                        total,
                        report: report.clone(),
                    });
                    report
                })
                .collect::<Vec<_>>()
        });
        Ok(reports)
    }

    /// Flush the cache, logging instead of failing the run.
    fn checkpoint(&self, cache: &LoudnessCache) {
        if cache.is_empty() && !cache.file_path().exists() {
            return;
        }
        if let Err(e) = cache.flush() {
            warn!(
                target: "cache",
                path = %cache.file_path().display(),
                error = %e,
                "Failed to write loudness cache"
            );
        }
    }

    fn emit(&self, event: Progress) {
        if let Some(events) = &self.events {
            // Receiver gone means nobody is listening any more
            let _ = events.send(event);
        }
    }
}

/// `None` for files the measurement never reached.
fn to_sample(
    (path, result): &(PathBuf, Option<std::result::Result<f64, FileError>>),
) -> Option<LoudnessSample> {
    let result = result.as_ref()?;
    Some(LoudnessSample {
        path: path.clone(),
        loudness: result.as_ref().ok().copied(),
    })
}

fn build_pool(threads: usize, name: &'static str) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |i| format!("{name}-{i}"))
        .build()
        .map_err(|e| Error::WorkerPool(e.to_string()))
        .with_context(format!("starting {threads} {name} workers"))
}
