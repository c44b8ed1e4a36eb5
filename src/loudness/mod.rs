//! Loudness measurement.
//!
//! Loudness here is the full-file average level in dBFS: the RMS of every
//! interleaved sample relative to full scale. 0 dBFS is a full-scale square
//! wave; real music sits well below that.
//!
//! Digital silence has no finite level and is reported as unmeasurable,
//! never as 0 dBFS.

mod cache;
mod target;

pub use cache::{CACHE_FILE_NAME, CacheError, LoudnessCache};
pub use target::{median, resolve_target};

use std::path::{Path, PathBuf};

use crate::audio::{DecodeError, decode_file};

/// One measurement taken during a run. `loudness` is `None` when the file
/// could not be measured.
#[derive(Debug, Clone, PartialEq)]
pub struct LoudnessSample {
    pub path: PathBuf,
    pub loudness: Option<f64>,
}

/// Measurement errors.
#[derive(Debug, thiserror::Error)]
pub enum MeasureError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Audio is digitally silent")]
    Silent,
}

/// Anything that can produce a file's loudness.
pub trait LoudnessMeter: Send + Sync {
    /// Measure a file without modifying it.
    fn measure(&self, path: &Path) -> Result<f64, MeasureError>;
}

/// Decodes the whole file and computes its RMS level.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecodingMeter;

impl LoudnessMeter for DecodingMeter {
    fn measure(&self, path: &Path) -> Result<f64, MeasureError> {
        let audio = decode_file(path)?;
        dbfs(&audio.samples).ok_or(MeasureError::Silent)
    }
}

/// RMS level of interleaved samples in dBFS. `None` for empty or silent input.
pub fn dbfs(samples: &[f32]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_squares / samples.len() as f64).sqrt();

    if rms > 0.0 && rms.is_finite() {
        Some(20.0 * rms.log10())
    } else {
        None
    }
}

/// Linear amplitude factor for a gain in dB.
pub fn db_to_gain(delta_db: f64) -> f32 {
    10f64.powf(delta_db / 20.0) as f32
}

/// Apply a uniform gain of `delta_db` and clamp to full scale.
///
/// Returns how many samples had to be clipped.
pub fn apply_gain(samples: &mut [f32], delta_db: f64) -> usize {
    let gain = db_to_gain(delta_db);
    let mut clipped = 0;

    for s in samples.iter_mut() {
        let v = *s * gain;
        if v > 1.0 {
            *s = 1.0;
            clipped += 1;
        } else if v < -1.0 {
            *s = -1.0;
            clipped += 1;
        } else {
            *s = v;
        }
    }

    clipped
}

/// Largest absolute sample value.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// How many dB the samples can be raised before the peak reaches full
/// scale. Zero for audio already at or over full scale, `None` for silence.
pub fn headroom_db(samples: &[f32]) -> Option<f64> {
    let peak = peak(samples) as f64;
    if peak > 0.0 && peak.is_finite() {
        Some((-20.0 * peak.log10()).max(0.0))
    } else {
        None
    }
}

/// Gain that moves towards `delta_db` without pushing the peak past full
/// scale. Cuts are never limited.
pub fn limit_gain(delta_db: f64, headroom_db: f64) -> f64 {
    if delta_db > 0.0 {
        delta_db.min(headroom_db)
    } else {
        delta_db
    }
}

/// Whether `current` lies within `[target - tolerance, target + tolerance]`.
pub fn within_tolerance(current: f64, target: f64, tolerance: f64) -> bool {
    (current - target).abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sine_samples, write_sine_wav};
    use tempfile::tempdir;

    #[test]
    fn test_dbfs_of_full_scale_square() {
        let samples = vec![1.0f32, -1.0, 1.0, -1.0];
        let level = dbfs(&samples).unwrap();
        assert!(level.abs() < 1e-9);
    }

    #[test]
    fn test_dbfs_of_sine_matches_amplitude() {
        // Sine RMS is amplitude / sqrt(2)
        let samples = sine_samples(-14.0, 44_100, 1);
        let level = dbfs(&samples).unwrap();
        assert!((level - -14.0).abs() < 0.01, "got {level}");
    }

    #[test]
    fn test_dbfs_silence_and_empty_are_unmeasurable() {
        assert_eq!(dbfs(&[]), None);
        assert_eq!(dbfs(&[0.0; 1024]), None);
    }

    #[test]
    fn test_apply_gain_moves_level_by_delta() {
        let mut samples = sine_samples(-20.0, 44_100, 2);
        let clipped = apply_gain(&mut samples, 6.0);
        assert_eq!(clipped, 0);
        let level = dbfs(&samples).unwrap();
        assert!((level - -14.0).abs() < 0.01, "got {level}");
    }

    #[test]
    fn test_apply_gain_clamps_and_counts() {
        let mut samples = vec![0.9f32, -0.9, 0.1];
        let clipped = apply_gain(&mut samples, 6.0);
        assert_eq!(clipped, 2);
        assert_eq!(samples[0], 1.0);
        assert_eq!(samples[1], -1.0);
        assert!(samples[2] < 1.0);
    }

    #[test]
    fn test_headroom_of_half_scale_peak() {
        let samples = vec![0.5f32, -0.25, 0.1];
        assert_eq!(peak(&samples), 0.5);
        let headroom = headroom_db(&samples).unwrap();
        assert!((headroom - 6.0206).abs() < 1e-3, "got {headroom}");

        assert_eq!(headroom_db(&[0.0; 16]), None);
        assert_eq!(headroom_db(&[1.0, -1.0]), Some(0.0));
        assert_eq!(headroom_db(&[1.5]), Some(0.0));
    }

    #[test]
    fn test_limit_gain() {
        assert_eq!(limit_gain(9.0, 6.0), 6.0);
        assert_eq!(limit_gain(3.0, 6.0), 3.0);
        // Cuts can always be applied in full
        assert_eq!(limit_gain(-9.0, 0.0), -9.0);
    }

    #[test]
    fn test_limited_gain_never_clips() {
        let mut samples = vec![0.5f32, -0.5, 0.05, -0.05];
        let gain = limit_gain(12.0, headroom_db(&samples).unwrap());
        apply_gain(&mut samples, gain);
        assert!((peak(&samples) - 1.0).abs() < 1e-6);
        assert!((samples[2] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_within_tolerance_is_inclusive() {
        assert!(within_tolerance(-12.0, -14.0, 2.0));
        assert!(within_tolerance(-16.0, -14.0, 2.0));
        assert!(!within_tolerance(-10.0, -14.0, 2.0));
        assert!(within_tolerance(-14.0, -14.0, 0.0));
    }

    #[test]
    fn test_decoding_meter_measures_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, -18.0, 0.5);

        let level = DecodingMeter.measure(&path).unwrap();
        assert!((level - -18.0).abs() < 0.05, "got {level}");
    }

    #[test]
    fn test_decoding_meter_reports_silence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        crate::test_utils::write_silent_wav(&path, 0.25);

        assert!(matches!(
            DecodingMeter.measure(&path),
            Err(MeasureError::Silent)
        ));
    }

    #[test]
    fn test_decoding_meter_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, -18.0, 0.25);
        let before = std::fs::read(&path).unwrap();

        DecodingMeter.measure(&path).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }
}
