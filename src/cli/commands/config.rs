//! Configuration inspection command.

use crate::config::{self, Config};
use crate::encoder::FfmpegEncoder;

/// Print the config location and effective values, optionally writing the
/// defaults to disk first.
pub fn cmd_config(current: &Config, init: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if init {
        match &path {
            Some(p) if p.exists() => println!("Config already exists at {}", p.display()),
            _ => {
                let written = config::save(&Config::default())?;
                println!("✓ Wrote default config to {}", written.display());
            }
        }
        println!();
    }

    match &path {
        Some(p) if p.exists() => println!("Config file: {}", p.display()),
        Some(p) => println!("Config file: {} (not created, using defaults)", p.display()),
        None => println!("Config file: unavailable on this platform"),
    }

    let ffmpeg = FfmpegEncoder::new(current.tools.ffmpeg_path.clone());
    if ffmpeg.is_available() {
        println!("✓ ffmpeg: found (MP3, FLAC and M4A can be rewritten)");
    } else {
        println!("✗ ffmpeg: NOT FOUND (only WAV files can be rewritten)");
    }

    println!();
    print!("{}", toml::to_string_pretty(current)?);
    Ok(())
}
