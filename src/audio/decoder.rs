//! Whole-file decoder using symphonia.
//!
//! Supported formats:
//! - MP3
//! - FLAC
//! - AAC / ALAC (in MP4 container)
//! - WAV/PCM
//! - OGG Vorbis (measure only)

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecType, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Failed to open file: {0}")]
    Open(#[from] std::io::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("No audio track found")]
    NoAudioTrack,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("File contains no audio frames")]
    Empty,
}

/// A fully decoded file: interleaved samples normalised to [-1.0, 1.0].
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Bit depth of the source stream, when the codec reports one
    pub bits_per_sample: Option<u32>,
    /// Codec of the source stream; MP4 may hold either AAC or ALAC
    pub codec: CodecType,
}

impl DecodedAudio {
    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Decode the entire audio stream of a file.
///
/// Corrupt packets are skipped, the way a player would; anything that stops
/// the stream from being read at all is an error.
pub fn decode_file(path: &Path) -> Result<DecodedAudio, DecodeError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension() {
        hint.with_extension(&ext.to_string_lossy());
    }

    let format_opts = FormatOptions {
        enable_gapless: true,
        ..Default::default()
    };
    let metadata_opts = MetadataOptions::default();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &metadata_opts)
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let bits_per_sample = codec_params.bits_per_sample;
    let codec = codec_params.codec;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut skipped_packets = 0usize;

    loop {
        let packet = match reader.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(DecodeError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => {
                skipped_packets += 1;
                continue;
            }
            Err(e) => return Err(DecodeError::Decode(e.to_string())),
        };

        // Stream parameters from the first decoded buffer win over the
        // container's claims (AAC in MP4 often omits the channel layout).
        let spec = *decoded.spec();
        if sample_buf.is_none() {
            sample_rate = spec.rate;
            channels = spec.channels.count() as u16;
        }

        let buf = sample_buf.get_or_insert_with(|| {
            SampleBuffer::<f32>::new(decoded.capacity() as u64, spec)
        });
        if buf.capacity() < decoded.capacity() * spec.channels.count() {
            *buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        }
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    if skipped_packets > 0 {
        debug!(
            target: "audio::decode",
            path = %path.display(),
            skipped = skipped_packets,
            "Skipped undecodable packets"
        );
    }

    if samples.is_empty() || channels == 0 || sample_rate == 0 {
        return Err(DecodeError::Empty);
    }

    let audio = DecodedAudio {
        samples,
        sample_rate,
        channels,
        bits_per_sample,
        codec,
    };
    debug!(
        target: "audio::decode",
        path = %path.display(),
        frames = audio.frames(),
        sample_rate,
        channels,
        "Decoded"
    );
    Ok(audio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_sine_wav;
    use std::io::Write;
    use tempfile::{NamedTempFile, tempdir};

    #[test]
    fn test_decoder_nonexistent_file() {
        let result = decode_file(Path::new("/nonexistent/file.mp3"));
        assert!(matches!(result, Err(DecodeError::Open(_))));
    }

    #[test]
    fn test_decoder_rejects_text_file() {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        writeln!(file, "This is just some text, not music.").expect("Failed to write");

        assert!(decode_file(file.path()).is_err());
    }

    #[test]
    fn test_decode_wav_fixture() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, -12.0, 0.5);

        let audio = decode_file(&path).unwrap();
        assert_eq!(audio.sample_rate, 44_100);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.bits_per_sample, Some(16));
        assert_eq!(audio.frames(), 22_050);
        assert_eq!(audio.codec, symphonia::core::codecs::CODEC_TYPE_PCM_S16LE);
    }
}
