//! Test utilities and fixtures for music-leveler tests.
//!
//! Fixtures are synthesized rather than checked in: sine waves at an exact
//! RMS level are written as 16-bit stereo WAV files, which both the decoder
//! and the native WAV encoder handle without any external tools.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::write_sine_wav;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("tone.wav");
//! write_sine_wav(&path, -14.0, 0.5); // measures as -14 dBFS
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, Tag, TagExt};
use symphonia::core::codecs::CodecType;

use crate::audio::{AudioFormat, DecodedAudio};
use crate::encoder::{Encoder, FfmpegEncoder};
use crate::loudness::{DecodingMeter, LoudnessMeter, MeasureError};

/// Sample rate of every synthesized fixture.
pub const FIXTURE_RATE: u32 = 44_100;

/// Interleaved sine samples whose RMS level is `dbfs`.
///
/// A sine's RMS is its amplitude over sqrt(2), so the amplitude is chosen
/// as `sqrt(2) * 10^(dbfs/20)`. Uses a whole number of cycles so the level
/// is exact.
pub fn sine_samples(dbfs: f64, frames: usize, channels: usize) -> Vec<f32> {
    let amplitude = std::f64::consts::SQRT_2 * 10f64.powf(dbfs / 20.0);
    let freq = 441.0; // 100 samples per cycle at 44.1 kHz
    let mut samples = Vec::with_capacity(frames * channels);
    for n in 0..frames {
        let t = n as f64 / FIXTURE_RATE as f64;
        let v = (amplitude * (2.0 * std::f64::consts::PI * freq * t).sin()) as f32;
        for _ in 0..channels {
            samples.push(v);
        }
    }
    samples
}

/// Write a 16-bit stereo WAV sine at `dbfs`, `seconds` long.
pub fn write_sine_wav(path: &Path, dbfs: f64, seconds: f64) {
    let frames = (FIXTURE_RATE as f64 * seconds) as usize;
    write_wav(path, &sine_samples(dbfs, frames, 2));
}

/// Write a 16-bit stereo WAV with a loud opening burst and a quiet tail.
///
/// The first tenth is a sine peaking at half scale, the rest is 40 dB
/// quieter, so the file measures around -19 dBFS with only 6 dB of peak
/// headroom.
pub fn write_burst_wav(path: &Path, seconds: f64) {
    let frames = (FIXTURE_RATE as f64 * seconds) as usize;
    let burst = frames / 10;
    let loud = sine_samples(20.0 * (0.5f64 / std::f64::consts::SQRT_2).log10(), frames, 2);
    let samples = loud
        .iter()
        .enumerate()
        .map(|(i, &s)| if i / 2 < burst { s } else { s * 0.01 })
        .collect::<Vec<_>>();
    write_wav(path, &samples);
}

/// Write a digitally silent 16-bit stereo WAV.
pub fn write_silent_wav(path: &Path, seconds: f64) {
    let frames = (FIXTURE_RATE as f64 * seconds) as usize;
    write_wav(path, &vec![0.0; frames * 2]);
}

fn write_wav(path: &Path, samples: &[f32]) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: FIXTURE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("Failed to create WAV");
    for &s in samples {
        writer
            .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
            .expect("Failed to write sample");
    }
    writer.finalize().expect("Failed to finalize WAV");
}

/// Whether ffmpeg-backed fixtures and rewrites can run on this machine.
pub fn ffmpeg_available() -> bool {
    FfmpegEncoder::default().is_available()
}

/// Encode a 16-bit stereo sine at `dbfs` into `format` through ffmpeg.
///
/// `codec` picks between AAC and ALAC for M4A. Check [`ffmpeg_available`]
/// first.
pub fn write_sine_as(path: &Path, format: &AudioFormat, codec: CodecType, dbfs: f64, seconds: f64) {
    let frames = (FIXTURE_RATE as f64 * seconds) as usize;
    let audio = DecodedAudio {
        samples: sine_samples(dbfs, frames, 2),
        sample_rate: FIXTURE_RATE,
        channels: 2,
        bits_per_sample: Some(16),
        codec,
    };
    FfmpegEncoder::default()
        .encode(&audio, format, path)
        .expect("ffmpeg failed to encode fixture");
}

/// Give a file its container's primary tag with title, artist and a front
/// cover.
pub fn tag_file(path: &Path, title: &str, artist: &str, cover: &[u8]) {
    let tag_type = Probe::open(path)
        .and_then(|p| p.read())
        .expect("Failed to read fixture")
        .primary_tag_type();
    let mut tag = Tag::new(tag_type);
    tag.set_title(title.to_string());
    tag.set_artist(artist.to_string());
    tag.push_picture(Picture::new_unchecked(
        PictureType::CoverFront,
        Some(MimeType::Png),
        None,
        cover.to_vec(),
    ));
    tag.save_to_path(path, WriteOptions::default())
        .expect("Failed to tag fixture");
}

/// Write bytes that no decoder will accept under an audio extension.
pub fn write_garbage(path: &Path) {
    std::fs::write(path, b"definitely not audio data, just some bytes").expect("Failed to write");
}

/// A [`DecodingMeter`] that counts how often it actually decodes.
#[derive(Debug, Default)]
pub struct CountingMeter {
    inner: DecodingMeter,
    calls: AtomicUsize,
}

impl CountingMeter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LoudnessMeter for CountingMeter {
    fn measure(&self, path: &Path) -> Result<f64, MeasureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.measure(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loudness::dbfs;
    use tempfile::tempdir;

    #[test]
    fn test_sine_samples_level() {
        let samples = sine_samples(-10.0, 44_100, 2);
        assert_eq!(samples.len(), 88_200);
        assert!((dbfs(&samples).unwrap() - -10.0).abs() < 0.01);
    }

    #[test]
    fn test_burst_fixture_level_and_headroom() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("burst.wav");
        write_burst_wav(&path, 1.0);

        let audio = crate::audio::decode_file(&path).unwrap();
        assert!((dbfs(&audio.samples).unwrap() - -19.0).abs() < 0.1);
        assert!((crate::loudness::headroom_db(&audio.samples).unwrap() - 6.02).abs() < 0.01);
    }

    #[test]
    fn test_counting_meter_counts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_sine_wav(&path, -14.0, 0.1);

        let meter = CountingMeter::default();
        let level = meter.measure(&path).unwrap();
        assert!((level - -14.0).abs() < 0.05);
        assert_eq!(meter.calls(), 1);
    }
}
