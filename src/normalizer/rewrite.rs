//! Per-file decision and rewrite.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use super::{FileOutcome, Normalizer};
use crate::audio::{AudioFormat, DecodedAudio, decode_file};
use crate::error::FileError;
use crate::loudness::{
    LoudnessCache, apply_gain, dbfs, headroom_db, limit_gain, within_tolerance,
};
use crate::metadata::{self, MetadataError};

/// Smallest gain worth re-encoding a file for, in dB.
const MIN_GAIN_DB: f64 = 0.1;

/// What a rewrite attempt actually did.
enum Rewrite {
    /// Fresh decode showed the cached value was stale and the file is fine
    AlreadyInRange { loudness: f64 },
    Done { before: f64, after: f64, delta: f64 },
    /// Peak headroom capped the gain short of the band
    Limited {
        before: f64,
        after: f64,
        wanted: f64,
        applied: f64,
    },
}

impl Normalizer {
    /// Decide what to do with one file and do it.
    pub(super) fn process_file(&self, path: &Path, target: f64, cache: &LoudnessCache) -> FileOutcome {
        let current = match self.loudness_of(path, cache) {
            Ok(loudness) => loudness,
            Err(e) => return FileOutcome::Failed(e),
        };

        let tolerance = self.settings.tolerance_db;
        if within_tolerance(current, target, tolerance) {
            debug!(target: "normalizer::rewrite", path = %path.display(), loudness = current, "In range");
            return FileOutcome::InRange { loudness: current };
        }

        let delta = target - current;
        if self.settings.dry_run {
            info!(
                target: "normalizer::rewrite",
                path = %path.display(),
                loudness = current,
                delta_db = format_args!("{delta:+.2}"),
                "Would adjust"
            );
            return FileOutcome::WouldAdjust {
                loudness: current,
                delta,
            };
        }

        let outcome = match self.rewrite(path, target, cache) {
            Ok(Rewrite::AlreadyInRange { loudness }) => FileOutcome::InRange { loudness },
            Ok(Rewrite::Done {
                before,
                after,
                delta,
            }) => {
                info!(
                    target: "normalizer::rewrite",
                    path = %path.display(),
                    before = format_args!("{before:.2}"),
                    after = format_args!("{after:.2}"),
                    delta_db = format_args!("{delta:+.2}"),
                    "Normalized"
                );
                FileOutcome::Normalized {
                    before,
                    after,
                    delta,
                }
            }
            Ok(Rewrite::Limited {
                before,
                after,
                wanted,
                applied,
            }) => {
                warn!(
                    target: "normalizer::rewrite",
                    path = %path.display(),
                    before = format_args!("{before:.2}"),
                    after = format_args!("{after:.2}"),
                    wanted_db = format_args!("{wanted:+.2}"),
                    applied_db = format_args!("{applied:+.2}"),
                    "Not enough peak headroom to reach the target"
                );
                FileOutcome::Limited {
                    before,
                    after,
                    wanted,
                    applied,
                }
            }
            Err(e) => {
                warn!(target: "normalizer::rewrite", path = %path.display(), error = %e, "Rewrite failed");
                FileOutcome::Failed(e)
            }
        };

        // Audio replaced or stale value corrected: persist what we learned
        if !matches!(&outcome, FileOutcome::Failed(FileError::RewriteFailed { .. })) {
            self.checkpoint(cache);
        }
        outcome
    }

    /// Snapshot metadata, apply gain, replace the file, restore metadata.
    ///
    /// Until the replace succeeds the original file is untouched.
    fn rewrite(&self, path: &Path, target: f64, cache: &LoudnessCache) -> Result<Rewrite, FileError> {
        let format = AudioFormat::from_path(path)
            .filter(AudioFormat::is_rewritable)
            .ok_or_else(|| FileError::rewrite_failed(path, "unsupported container"))?;
        let store = metadata::store_for(&format)
            .ok_or_else(|| MetadataError::Unsupported(format.clone()))
            .map_err(|e| FileError::rewrite_failed(path, e))?;

        let bundle = store
            .snapshot(path)
            .map_err(|e| FileError::rewrite_failed(path, e))?;

        let mut audio = decode_file(path).map_err(|e| FileError::rewrite_failed(path, e))?;
        let before = dbfs(&audio.samples)
            .ok_or_else(|| FileError::unmeasurable(path, "audio is digitally silent"))?;

        // The decode is authoritative over whatever the cache said
        cache.put(path, before);
        if within_tolerance(before, target, self.settings.tolerance_db) {
            debug!(target: "normalizer::rewrite", path = %path.display(), loudness = before, "Stale cache entry, already in range");
            return Ok(Rewrite::AlreadyInRange { loudness: before });
        }

        let wanted = target - before;
        let headroom = headroom_db(&audio.samples).unwrap_or(0.0);
        let delta = limit_gain(wanted, headroom);

        // No usable headroom, so the file stays as it is
        if delta < MIN_GAIN_DB && wanted > 0.0 {
            debug!(
                target: "normalizer::rewrite",
                path = %path.display(),
                headroom_db = format_args!("{headroom:.2}"),
                "No headroom left, file kept as is"
            );
            return Ok(Rewrite::Limited {
                before,
                after: before,
                wanted,
                applied: 0.0,
            });
        }

        let clipped = apply_gain(&mut audio.samples, delta);
        if clipped > 0 {
            debug!(target: "normalizer::rewrite", path = %path.display(), clipped, "Samples clamped at full scale");
        }
        let after = dbfs(&audio.samples).unwrap_or(before + delta);

        self.replace_audio(path, &audio, &format)?;
        cache.put(path, after);

        store
            .write_tags_and_artwork(path, &bundle)
            .map_err(|e| FileError::metadata_restore_failed(path, e))?;

        if delta < wanted && !within_tolerance(after, target, self.settings.tolerance_db) {
            return Ok(Rewrite::Limited {
                before,
                after,
                wanted,
                applied: delta,
            });
        }
        Ok(Rewrite::Done {
            before,
            after,
            delta,
        })
    }

    /// Encode next to the original, then rename over it.
    fn replace_audio(
        &self,
        path: &Path,
        audio: &DecodedAudio,
        format: &AudioFormat,
    ) -> Result<(), FileError> {
        let dir = path
            .parent()
            .ok_or_else(|| FileError::rewrite_failed(path, "file has no parent directory"))?;

        // `.tmp` so a leftover from a killed run is never scanned as audio
        let temp = tempfile::Builder::new()
            .prefix(".leveler-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| FileError::rewrite_failed(path, e))?;

        self.encoder
            .encode(audio, format, temp.path())
            .map_err(|e| FileError::rewrite_failed(path, e))?;

        if let Ok(meta) = fs::metadata(path)
            && let Err(e) = fs::set_permissions(temp.path(), meta.permissions())
        {
            debug!(target: "normalizer::rewrite", path = %path.display(), error = %e, "Could not copy permissions");
        }

        temp.persist(path)
            .map_err(|e| FileError::rewrite_failed(path, e.error))?;
        Ok(())
    }
}
