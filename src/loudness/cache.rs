//! Persistent per-library loudness cache.
//!
//! One JSON object per scanned root, stored as `loudness_cache.json` inside
//! that root and mapping absolute path strings to dBFS values. A cached value
//! only says "this file was measured at X"; it never says the file is already
//! normalized, so every run re-checks it against the current target.
//!
//! Keys are the exact path strings used by the scanner. No case or separator
//! normalization is done, so a hit needs a byte-identical path.
//!
//! A missing, empty or corrupt file yields an empty cache and the run goes
//! on; the next flush writes a valid file. Entries this version does not
//! understand (non-numeric values) are carried through flushes untouched.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// File name of the cache inside the scanned root.
pub const CACHE_FILE_NAME: &str = "loudness_cache.json";

/// Cache errors. Only `flush` surfaces them; `load` logs and starts empty.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to read cache {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Cache file {0} is corrupt: {1}")]
    Corrupt(PathBuf, serde_json::Error),

    #[error("Failed to serialize cache: {0}")]
    Serialize(serde_json::Error),

    #[error("Failed to write cache {0}: {1}")]
    Write(PathBuf, std::io::Error),
}

#[derive(Debug, Default)]
struct Entries {
    loudness: BTreeMap<String, f64>,
    /// Keys with values we don't interpret, kept for forward compatibility
    extra: Map<String, Value>,
}

/// Thread-safe loudness cache owned by one library root for one run.
///
/// Workers share it by reference; all mutation goes through [`put`], which
/// takes the lock. [`flush`] holds the same lock while writing, so
/// checkpoint flushes from different workers never interleave.
///
/// [`put`]: LoudnessCache::put
/// [`flush`]: LoudnessCache::flush
#[derive(Debug)]
pub struct LoudnessCache {
    file: PathBuf,
    entries: Mutex<Entries>,
    hits: AtomicUsize,
}

impl LoudnessCache {
    /// Location of the cache file for a library root.
    pub fn cache_path(root: &Path) -> PathBuf {
        root.join(CACHE_FILE_NAME)
    }

    /// An empty cache that will flush into `root`.
    pub fn empty(root: &Path) -> Self {
        Self {
            file: Self::cache_path(root),
            entries: Mutex::new(Entries::default()),
            hits: AtomicUsize::new(0),
        }
    }

    /// Load the cache for `root`. Never fails: problems are logged and an
    /// empty cache is returned.
    pub fn load(root: &Path) -> Self {
        let file = Self::cache_path(root);
        let entries = match read_entries(&file) {
            Ok(Some(entries)) => {
                info!(
                    target: "cache",
                    path = %file.display(),
                    entries = entries.loudness.len(),
                    "Loaded loudness cache"
                );
                entries
            }
            Ok(None) => {
                debug!(target: "cache", path = %file.display(), "No loudness cache, starting empty");
                Entries::default()
            }
            Err(e) => {
                warn!(target: "cache", error = %e, "Ignoring unreadable loudness cache");
                Entries::default()
            }
        };

        let mut cache = Self::empty(root);
        *cache.entries.get_mut() = entries;
        cache
    }

    /// Key used for a path.
    pub fn key(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    /// Cached loudness for a file, if any.
    pub fn get(&self, path: &Path) -> Option<f64> {
        let value = self.entries.lock().loudness.get(&Self::key(path)).copied();
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Record a file's loudness. Non-finite values are not stored.
    pub fn put(&self, path: &Path, loudness: f64) {
        if !loudness.is_finite() {
            warn!(target: "cache", path = %path.display(), loudness, "Refusing to cache non-finite loudness");
            return;
        }
        let key = Self::key(path);
        let mut entries = self.entries.lock();
        entries.extra.remove(&key);
        entries.loudness.insert(key, loudness);
    }

    /// Write the full mapping to disk (temp file + rename).
    pub fn flush(&self) -> Result<(), CacheError> {
        let entries = self.entries.lock();

        let mut object = entries.extra.clone();
        for (key, value) in &entries.loudness {
            if let Some(number) = serde_json::Number::from_f64(*value) {
                object.insert(key.clone(), Value::Number(number));
            }
        }

        let contents =
            serde_json::to_string_pretty(&Value::Object(object)).map_err(CacheError::Serialize)?;

        let dir = self.file.parent().unwrap_or_else(|| Path::new("."));
        let mut temp =
            NamedTempFile::new_in(dir).map_err(|e| CacheError::Write(self.file.clone(), e))?;
        temp.write_all(contents.as_bytes())
            .and_then(|_| temp.flush())
            .map_err(|e| CacheError::Write(self.file.clone(), e))?;
        temp.persist(&self.file)
            .map_err(|e| CacheError::Write(self.file.clone(), e.error))?;

        debug!(
            target: "cache",
            path = %self.file.display(),
            entries = entries.loudness.len(),
            "Flushed loudness cache"
        );
        Ok(())
    }

    /// Path of the backing file.
    pub fn file_path(&self) -> &Path {
        &self.file
    }

    /// Number of cached measurements.
    pub fn len(&self) -> usize {
        self.entries.lock().loudness.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many lookups were answered from the cache this run.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }
}

fn read_entries(file: &Path) -> Result<Option<Entries>, CacheError> {
    let contents = match std::fs::read_to_string(file) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::Read(file.to_path_buf(), e)),
    };

    if contents.trim().is_empty() {
        return Ok(None);
    }

    let object: Map<String, Value> = serde_json::from_str(&contents)
        .map_err(|e| CacheError::Corrupt(file.to_path_buf(), e))?;

    let mut entries = Entries::default();
    for (key, value) in object {
        match value.as_f64() {
            Some(loudness) => {
                entries.loudness.insert(key, loudness);
            }
            None => {
                entries.extra.insert(key, value);
            }
        }
    }
    Ok(Some(entries))
}
