//! Library target level.
//!
//! The median is used rather than the mean so a handful of very loud or very
//! quiet outliers do not drag the whole library with them.

use std::path::Path;

use super::LoudnessSample;
use crate::error::{Error, Result};

/// Median of a set of values. Odd count: middle value; even count: mean of
/// the two middle values. `None` for an empty set.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Resolve the run's target loudness.
///
/// An explicit target is returned unchanged. Otherwise the median of every
/// measured sample is used; unmeasurable samples are ignored.
pub fn resolve_target(
    root: &Path,
    samples: &[LoudnessSample],
    explicit: Option<f64>,
) -> Result<f64> {
    if let Some(target) = explicit {
        return Ok(target);
    }

    if samples.is_empty() {
        return Err(Error::EmptyLibrary(root.to_path_buf()));
    }

    let measured: Vec<f64> = samples.iter().filter_map(|s| s.loudness).collect();
    median(&measured).ok_or_else(|| Error::NoMeasurableAudio {
        root: root.to_path_buf(),
        attempted: samples.len(),
    })
}
