//! Encoding through the `ffmpeg` command-line tool.
//!
//! Samples are streamed to ffmpeg's stdin as raw little-endian `f32`, so the
//! gain has already been applied in-process and ffmpeg only encodes.
//!
//! Install ffmpeg:
//! - Windows: `winget install Gyan.FFmpeg`
//! - macOS: `brew install ffmpeg`
//! - Linux: `apt install ffmpeg` or equivalent

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, Command, Stdio};
use std::sync::OnceLock;

use symphonia::core::codecs::{CODEC_TYPE_ALAC, CodecType};
use tracing::debug;

use super::{EncodeError, Encoder};
use crate::audio::{AudioFormat, DecodedAudio};

/// Common installation paths for ffmpeg on Windows
#[cfg(windows)]
const FFMPEG_PATHS: &[&str] = &[
    "ffmpeg", // In PATH
    r"C:\ffmpeg\bin\ffmpeg.exe",
    r"C:\Program Files\ffmpeg\bin\ffmpeg.exe",
];

#[cfg(not(windows))]
const FFMPEG_PATHS: &[&str] = &[
    "ffmpeg", // In PATH
    "/usr/bin/ffmpeg",
    "/usr/local/bin/ffmpeg",
    "/opt/homebrew/bin/ffmpeg",
];

/// Find the ffmpeg executable, checking common installation paths
fn find_ffmpeg() -> Option<PathBuf> {
    FFMPEG_PATHS
        .iter()
        .find(|&path| responds_to_version(Path::new(path)))
        .map(PathBuf::from)
}

fn responds_to_version(path: &Path) -> bool {
    Command::new(path)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Encoder backed by an external ffmpeg binary.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoder {
    configured: Option<PathBuf>,
    resolved: OnceLock<Option<PathBuf>>,
}

impl FfmpegEncoder {
    /// `path` overrides the search; `None` searches PATH and the usual
    /// install locations on first use.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            configured: path,
            resolved: OnceLock::new(),
        }
    }

    fn binary(&self) -> Result<&Path, EncodeError> {
        self.resolved
            .get_or_init(|| match &self.configured {
                Some(path) => Some(path.clone()),
                None => find_ffmpeg(),
            })
            .as_deref()
            .ok_or(EncodeError::ToolNotFound)
    }

    /// Whether an ffmpeg binary can be run
    pub fn is_available(&self) -> bool {
        self.binary().is_ok_and(responds_to_version)
    }
}

/// Output codec arguments for a container.
///
/// Lossless sources stay lossless: FLAC keeps its bit depth and ALAC in MP4
/// is written as ALAC, never transcoded to AAC.
fn codec_args(
    format: &AudioFormat,
    bits_per_sample: Option<u32>,
    source: CodecType,
) -> Option<Vec<&'static str>> {
    let args = match format {
        AudioFormat::Mp3 => vec!["-c:a", "libmp3lame", "-q:a", "2", "-f", "mp3"],
        AudioFormat::Flac => match bits_per_sample {
            Some(bits) if bits > 16 => vec![
                "-c:a",
                "flac",
                "-sample_fmt",
                "s32",
                "-bits_per_raw_sample",
                "24",
                "-f",
                "flac",
            ],
            _ => vec!["-c:a", "flac", "-sample_fmt", "s16", "-f", "flac"],
        },
        AudioFormat::M4a if source == CODEC_TYPE_ALAC => match bits_per_sample {
            Some(bits) if bits > 16 => vec![
                "-c:a",
                "alac",
                "-sample_fmt",
                "s32p",
                "-bits_per_raw_sample",
                "24",
                "-f",
                "ipod",
            ],
            _ => vec!["-c:a", "alac", "-sample_fmt", "s16p", "-f", "ipod"],
        },
        AudioFormat::M4a => vec!["-c:a", "aac", "-b:a", "256k", "-f", "ipod"],
        AudioFormat::Wav | AudioFormat::Other(_) => return None,
    };
    Some(args)
}

fn write_pcm(stdin: ChildStdin, samples: &[f32]) -> std::io::Result<()> {
    let mut writer = BufWriter::with_capacity(64 * 1024, stdin);
    for s in samples {
        writer.write_all(&s.to_le_bytes())?;
    }
    writer.flush()
}

impl Encoder for FfmpegEncoder {
    fn encode(
        &self,
        audio: &DecodedAudio,
        format: &AudioFormat,
        dest: &Path,
    ) -> Result<(), EncodeError> {
        let codec = codec_args(format, audio.bits_per_sample, audio.codec)
            .ok_or_else(|| EncodeError::Unsupported(format.clone()))?;
        let ffmpeg = self.binary()?;

        let mut cmd = Command::new(ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "f32le"])
            .args(["-ar", &audio.sample_rate.to_string()])
            .args(["-ac", &audio.channels.to_string()])
            .args(["-i", "pipe:0"])
            // Tags are restored from the snapshot, not by ffmpeg
            .args(["-map_metadata", "-1", "-fflags", "+bitexact", "-flags:a", "+bitexact"])
            .args(&codec)
            .arg(dest)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        debug!(target: "encoder", dest = %dest.display(), %format, "Running ffmpeg");

        let tool = ffmpeg.display().to_string();
        let mut child = cmd.spawn().map_err(|e| EncodeError::Spawn {
            tool: tool.clone(),
            source: e,
        })?;
        let stdin = child.stdin.take().ok_or_else(|| EncodeError::Spawn {
            tool: tool.clone(),
            source: std::io::Error::other("stdin was not captured"),
        })?;

        // Feed stdin from a second thread so a chatty stderr can't deadlock us
        let (write_result, output) = std::thread::scope(|s| {
            let writer = s.spawn(|| write_pcm(stdin, &audio.samples));
            let output = child.wait_with_output();
            (writer.join(), output)
        });

        let output = output?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EncodeError::ToolFailed {
                tool,
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        match write_result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(EncodeError::Io(e)),
            Err(_) => Err(EncodeError::Io(std::io::Error::other(
                "PCM writer thread panicked",
            ))),
        }
    }
}
