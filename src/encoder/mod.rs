//! Writing adjusted audio back into its original container.
//!
//! WAV is written natively. MP3, FLAC and M4A go through `ffmpeg`, fed raw
//! PCM on stdin. Neither path carries tags over; the rewriter restores the
//! metadata snapshot afterwards.

mod ffmpeg;
mod wav;

pub use ffmpeg::FfmpegEncoder;
pub use wav::WavEncoder;

use std::path::{Path, PathBuf};

use crate::audio::{AudioFormat, DecodedAudio};

/// Encoding errors.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("ffmpeg not found. Install it or set tools.ffmpeg_path in the config")]
    ToolNotFound,

    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed ({status}): {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("WAV writer error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Cannot encode {0} files")]
    Unsupported(AudioFormat),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encodes decoded audio into a container at `dest`.
pub trait Encoder: Send + Sync {
    fn encode(
        &self,
        audio: &DecodedAudio,
        format: &AudioFormat,
        dest: &Path,
    ) -> Result<(), EncodeError>;
}

/// Picks the native WAV writer or ffmpeg depending on the container.
#[derive(Debug, Clone, Default)]
pub struct FormatEncoder {
    ffmpeg: FfmpegEncoder,
    wav: WavEncoder,
}

impl FormatEncoder {
    /// Use a specific ffmpeg binary instead of searching for one.
    pub fn with_ffmpeg_path(path: Option<PathBuf>) -> Self {
        Self {
            ffmpeg: FfmpegEncoder::new(path),
            wav: WavEncoder,
        }
    }
}

impl Encoder for FormatEncoder {
    fn encode(
        &self,
        audio: &DecodedAudio,
        format: &AudioFormat,
        dest: &Path,
    ) -> Result<(), EncodeError> {
        match format {
            AudioFormat::Wav => self.wav.encode(audio, format, dest),
            AudioFormat::Mp3 | AudioFormat::Flac | AudioFormat::M4a => {
                self.ffmpeg.encode(audio, format, dest)
            }
            AudioFormat::Other(_) => Err(EncodeError::Unsupported(format.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::codecs::CODEC_TYPE_NULL;
    use tempfile::tempdir;

    #[test]
    fn test_other_formats_are_rejected() {
        let dir = tempdir().unwrap();
        let audio = DecodedAudio {
            samples: vec![0.1; 64],
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: Some(16),
            codec: CODEC_TYPE_NULL,
        };

        let result = FormatEncoder::default().encode(
            &audio,
            &AudioFormat::Other("ogg".to_string()),
            &dir.path().join("out.ogg"),
        );
        assert!(matches!(result, Err(EncodeError::Unsupported(_))));
    }

    #[test]
    fn test_wav_is_written_natively() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.wav");
        let audio = DecodedAudio {
            samples: vec![0.25, -0.25, 0.5, -0.5],
            sample_rate: 48_000,
            channels: 2,
            bits_per_sample: Some(16),
            codec: CODEC_TYPE_NULL,
        };

        FormatEncoder::default()
            .encode(&audio, &AudioFormat::Wav, &dest)
            .unwrap();

        let reader = hound::WavReader::open(&dest).unwrap();
        assert_eq!(reader.spec().sample_rate, 48_000);
        assert_eq!(reader.len(), 4);
    }
}
