use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use super::{EncodeError, Encoder};
use crate::audio::{AudioFormat, DecodedAudio};

/// Integer PCM WAV writer. Keeps the source bit depth (8/16/24/32), 16-bit
/// when the source did not report one.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavEncoder;

impl WavEncoder {
    fn bit_depth(audio: &DecodedAudio) -> u16 {
        match audio.bits_per_sample {
            Some(b @ (8 | 16 | 24 | 32)) => b as u16,
            _ => 16,
        }
    }
}

impl Encoder for WavEncoder {
    fn encode(
        &self,
        audio: &DecodedAudio,
        format: &AudioFormat,
        dest: &Path,
    ) -> Result<(), EncodeError> {
        if *format != AudioFormat::Wav {
            return Err(EncodeError::Unsupported(format.clone()));
        }

        let bits = Self::bit_depth(audio);
        let spec = WavSpec {
            channels: audio.channels,
            sample_rate: audio.sample_rate,
            bits_per_sample: bits,
            sample_format: SampleFormat::Int,
        };

        let max = ((1i64 << (bits - 1)) - 1) as f64;
        let mut writer = WavWriter::create(dest, spec)?;
        for &s in &audio.samples {
            let v = (s.clamp(-1.0, 1.0) as f64 * max).round() as i32;
            writer.write_sample(v)?;
        }
        writer.finalize()?;
        Ok(())
    }
}
