//! Audio containers and whole-file decoding.

mod decoder;

pub use decoder::{DecodeError, DecodedAudio, decode_file};

use std::fmt;
use std::path::Path;

/// Container format, derived from the file extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Mp3,
    Flac,
    /// MPEG-4 audio (`.m4a` / `.mp4`)
    M4a,
    Wav,
    /// Recognized by the scanner (user-added extension) but not rewritable
    Other(String),
}

impl AudioFormat {
    /// Derive the format from a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        Some(match ext.as_str() {
            "mp3" => Self::Mp3,
            "flac" => Self::Flac,
            "m4a" | "mp4" => Self::M4a,
            "wav" => Self::Wav,
            _ => Self::Other(ext),
        })
    }

    /// Whether the rewriter can write this container back.
    pub fn is_rewritable(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mp3 => f.write_str("mp3"),
            Self::Flac => f.write_str("flac"),
            Self::M4a => f.write_str("m4a"),
            Self::Wav => f.write_str("wav"),
            Self::Other(ext) => f.write_str(ext),
        }
    }
}
