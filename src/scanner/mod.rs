//! Library scanning.
//!
//! The scan is materialized into a sorted `Vec` before any work starts: the
//! measure and rewrite phases both consume the same list, and neither should
//! see files that appear or vanish mid-run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Extensions recognized when nothing else is configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "mp4", "wav"];

/// Set of lowercase audio extensions, stored without the leading dot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ExtensionSet(BTreeSet<String>);

impl ExtensionSet {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            extensions
                .into_iter()
                .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        )
    }

    /// Whether the path's extension (case-insensitive) is in the set.
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| self.0.contains(&ext.to_lowercase()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for ExtensionSet {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS)
    }
}

impl From<Vec<String>> for ExtensionSet {
    fn from(v: Vec<String>) -> Self {
        Self::new(v)
    }
}

impl From<ExtensionSet> for Vec<String> {
    fn from(set: ExtensionSet) -> Self {
        set.0.into_iter().collect()
    }
}

/// Check that `root` exists and is a directory, returning its absolute form.
///
/// The absolute path is what every cache key is derived from.
pub fn resolve_root(root: &Path) -> Result<PathBuf> {
    let absolute = root
        .canonicalize()
        .map_err(|e| Error::invalid_root(root, e.to_string()))?;

    if !absolute.is_dir() {
        return Err(Error::invalid_root(root, "not a directory"));
    }
    Ok(absolute)
}

/// Recursively collect every file under `root` whose extension is in
/// `extensions`. The result is sorted, so a fixed filesystem always gives the
/// same list.
///
/// Unreadable directory entries are logged and skipped.
pub fn scan(root: &Path, extensions: &ExtensionSet) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                warn!(target: "scanner", error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| extensions.matches(e.path()))
        .map(|e| e.into_path())
        .collect();

    paths.sort();
    debug!(
        target: "scanner",
        root = %root.display(),
        extensions = ?extensions.iter().collect::<Vec<_>>(),
        "Scan finished"
    );
    info!(target: "scanner", count = paths.len(), "Found audio files");
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_scan_audio_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        File::create(root.join("song.mp3")).unwrap();
        File::create(root.join("music.flac")).unwrap();
        File::create(root.join("notes.txt")).unwrap(); // Should be ignored
        File::create(root.join("image.png")).unwrap(); // Should be ignored
        File::create(root.join("UPPERCASE.M4A")).unwrap(); // Case-insensitive
        File::create(root.join("loudness_cache.json")).unwrap(); // Never audio

        let subdir = root.join("subdir").join("deeper");
        std::fs::create_dir_all(&subdir).unwrap();
        File::create(subdir.join("track.wav")).unwrap();
        File::create(subdir.join("ignore.doc")).unwrap();

        let paths = scan(root, &ExtensionSet::default());

        let file_names: Vec<String> = paths
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(|s| s.to_string()))
            .collect();

        assert_eq!(paths.len(), 4);
        assert!(file_names.contains(&"song.mp3".to_string()));
        assert!(file_names.contains(&"music.flac".to_string()));
        assert!(file_names.contains(&"track.wav".to_string()));
        assert!(file_names.contains(&"UPPERCASE.M4A".to_string()));
    }

    #[test]
    fn test_scan_is_sorted_and_repeatable() {
        let dir = tempdir().unwrap();
        for name in ["c.mp3", "a.mp3", "b.flac"] {
            File::create(dir.path().join(name)).unwrap();
        }

        let first = scan(dir.path(), &ExtensionSet::default());
        let second = scan(dir.path(), &ExtensionSet::default());
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(first, sorted);
    }

    #[test]
    fn test_custom_extensions() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("a.mp3")).unwrap();
        File::create(dir.path().join("b.ogg")).unwrap();

        let set = ExtensionSet::new([".OGG"]);
        let paths = scan(dir.path(), &set);
        assert_eq!(paths, vec![dir.path().join("b.ogg")]);
    }

    #[test]
    fn test_extension_set_normalizes() {
        let set = ExtensionSet::new([".MP3", " flac ", ""]);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["flac", "mp3"]);
        assert!(set.matches(Path::new("/x/Y.Mp3")));
        assert!(!set.matches(Path::new("/x/mp3")));
    }

    #[test]
    fn test_resolve_root() {
        let dir = tempdir().unwrap();
        let resolved = resolve_root(dir.path()).unwrap();
        assert!(resolved.is_absolute());

        let missing = dir.path().join("missing");
        assert!(matches!(resolve_root(&missing), Err(Error::InvalidRoot { .. })));

        let file = dir.path().join("a.mp3");
        File::create(&file).unwrap();
        assert!(matches!(resolve_root(&file), Err(Error::InvalidRoot { .. })));
    }
}
