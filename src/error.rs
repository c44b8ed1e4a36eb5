//! Application-wide error types.
//!
//! Two tiers of failure exist during a run:
//!
//! - [`Error`]: run-level errors. Returned from [`crate::normalizer::Normalizer`]
//!   before any file is touched (bad root, nothing to measure) or for setup
//!   problems (config, worker pools).
//! - [`FileError`]: file-scoped errors. Recorded in a file's outcome and
//!   reported, but the batch keeps going.
//!
//! Subsystems keep their own `thiserror` enums (`DecodeError`, `EncodeError`,
//! `MetadataError`, `CacheError`, `ConfigError`); the CLI layer uses `anyhow`.

use std::path::{Path, PathBuf};

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Run-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Root path missing or not a directory
    #[error("Invalid library root {path}: {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    /// Scan found no candidate audio files
    #[error("No audio files found under {0}")]
    EmptyLibrary(PathBuf),

    /// Every candidate failed measurement
    #[error("None of the {attempted} audio files under {root} could be measured")]
    NoMeasurableAudio { root: PathBuf, attempted: usize },

    /// Invalid settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Thread pool could not be created
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an invalid root error.
    pub fn invalid_root(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidRoot {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// True for errors caused by unusable input (bad root, empty or
    /// unmeasurable library). These get the distinct failure exit.
    pub fn is_fatal_input(&self) -> bool {
        match self {
            Self::InvalidRoot { .. } | Self::EmptyLibrary(_) | Self::NoMeasurableAudio { .. } => {
                true
            }
            Self::WithContext { source, .. } => source.is_fatal_input(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

/// Error confined to a single file. The file is skipped for the rest of the
/// run; nothing already rewritten is rolled back.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FileError {
    /// Decode failed, zero-length or silent audio
    #[error("Could not measure {path}: {reason}")]
    Unmeasurable { path: PathBuf, reason: String },

    /// Snapshot, decode, encode or replace failed; file left as it was
    #[error("Could not rewrite {path}: {reason}")]
    RewriteFailed { path: PathBuf, reason: String },

    /// Audio was replaced but tags/artwork could not be written back
    #[error("Rewrote {path} but could not restore metadata: {reason}")]
    MetadataRestoreFailed { path: PathBuf, reason: String },
}

impl FileError {
    pub fn unmeasurable(path: &Path, reason: impl ToString) -> Self {
        Self::Unmeasurable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn rewrite_failed(path: &Path, reason: impl ToString) -> Self {
        Self::RewriteFailed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn metadata_restore_failed(path: &Path, reason: impl ToString) -> Self {
        Self::MetadataRestoreFailed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// The file this error refers to.
    pub fn path(&self) -> &Path {
        match self {
            Self::Unmeasurable { path, .. }
            | Self::RewriteFailed { path, .. }
            | Self::MetadataRestoreFailed { path, .. } => path,
        }
    }

    /// The underlying cause, without the path.
    pub fn reason(&self) -> &str {
        match self {
            Self::Unmeasurable { reason, .. }
            | Self::RewriteFailed { reason, .. }
            | Self::MetadataRestoreFailed { reason, .. } => reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::EmptyLibrary(PathBuf::from("/music"));
        assert!(err.to_string().contains("/music"));
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::config("tolerance must be >= 0").context("while loading settings");
        let msg = err.to_string();
        assert!(msg.contains("while loading settings"));
        assert!(msg.contains("tolerance"));
    }

    #[test]
    fn test_fatal_input_classification() {
        assert!(Error::invalid_root("/nope", "does not exist").is_fatal_input());
        assert!(Error::EmptyLibrary(PathBuf::from("/music")).is_fatal_input());
        assert!(
            Error::NoMeasurableAudio {
                root: PathBuf::from("/music"),
                attempted: 3
            }
            .is_fatal_input()
        );
        assert!(
            Error::EmptyLibrary(PathBuf::from("/music"))
                .context("scan")
                .is_fatal_input()
        );
        assert!(!Error::config("bad").is_fatal_input());
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(Error::config("test"));
        let with_ctx = result.with_context("additional context");
        assert!(with_ctx.unwrap_err().to_string().contains("additional context"));
    }

    #[test]
    fn test_file_error_accessors() {
        let err = FileError::rewrite_failed(Path::new("/music/a.mp3"), "encoder exited with 1");
        assert_eq!(err.path(), Path::new("/music/a.mp3"));
        assert_eq!(err.reason(), "encoder exited with 1");
        assert!(err.to_string().contains("a.mp3"));
    }
}
