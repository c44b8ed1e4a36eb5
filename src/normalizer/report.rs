//! Per-file outcomes and run summaries.

use std::path::{Path, PathBuf};

use crate::error::FileError;
use crate::loudness::LoudnessSample;

/// Where a file ended up.
///
/// `Pending → Measuring → InRange` or
/// `Pending → Measuring → NeedsAdjustment → Rewriting → {Normalized | Limited | Failed}`.
/// A file never dispatched because the run was interrupted is `Cancelled`.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Already within tolerance of the target; untouched
    InRange { loudness: f64 },
    /// Rewritten with a gain of `delta` dB
    Normalized { before: f64, after: f64, delta: f64 },
    /// Gain capped by peak headroom; `applied` is 0 when the file was left as is
    Limited {
        before: f64,
        after: f64,
        wanted: f64,
        applied: f64,
    },
    /// Dry run: would have been rewritten with a gain of `delta` dB
    WouldAdjust { loudness: f64, delta: f64 },
    /// Skipped for the rest of the run
    Failed(FileError),
    /// Not started because the run was interrupted
    Cancelled,
}

impl FileOutcome {
    /// Loudness the decision was based on, when one is known.
    pub fn loudness(&self) -> Option<f64> {
        match self {
            Self::InRange { loudness } | Self::WouldAdjust { loudness, .. } => Some(*loudness),
            Self::Normalized { before, .. } | Self::Limited { before, .. } => Some(*before),
            Self::Failed(_) | Self::Cancelled => None,
        }
    }
}

/// Outcome for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// Progress events sent to an observer while a run is in flight.
#[derive(Debug, Clone)]
pub enum Progress {
    /// Scan finished
    Scanned { files: usize },
    /// One file measured (or not) during the measurement phase
    Measured {
        done: usize,
        total: usize,
        path: PathBuf,
        loudness: Option<f64>,
    },
    /// Target fixed for the rest of the run
    TargetResolved { target: f64, from_median: bool },
    /// One file finished the rewrite phase
    Processed {
        done: usize,
        total: usize,
        report: FileReport,
    },
}

/// Result of a normalization run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub root: PathBuf,
    /// `None` only when the run was interrupted before the target was known
    pub target: Option<f64>,
    pub target_from_median: bool,
    /// Files that failed measurement and were excluded from the median
    pub unmeasurable: Vec<FileError>,
    /// Rewrite phase outcomes, in scan order
    pub files: Vec<FileReport>,
    pub cancelled: bool,
    pub cache_hits: usize,
}

impl RunSummary {
    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn in_range(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::InRange { .. }))
    }

    pub fn normalized(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Normalized { .. }))
    }

    pub fn limited(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Limited { .. }))
    }

    pub fn would_adjust(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::WouldAdjust { .. }))
    }

    /// Failures from both phases.
    pub fn failed(&self) -> usize {
        self.unmeasurable.len() + self.count(|o| matches!(o, FileOutcome::Failed(_)))
    }

    pub fn not_processed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Cancelled))
    }

    /// Outcome for a specific file.
    pub fn outcome(&self, path: &Path) -> Option<&FileOutcome> {
        self.files
            .iter()
            .find(|r| r.path == path)
            .map(|r| &r.outcome)
    }
}

/// Result of a measure-only run.
#[derive(Debug, Clone)]
pub struct MeasureReport {
    pub root: PathBuf,
    /// One sample per file the measurement reached, in scan order
    pub samples: Vec<LoudnessSample>,
    /// Files never measured because the run was interrupted
    pub not_measured: usize,
    pub median: Option<f64>,
    pub cancelled: bool,
    pub cache_hits: usize,
}

impl MeasureReport {
    pub fn measured(&self) -> usize {
        self.samples.iter().filter(|s| s.loudness.is_some()).count()
    }
}
