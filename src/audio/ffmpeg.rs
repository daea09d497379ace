//! ffmpeg-backed audio converter.

use super::Converter;
use crate::config::{ConverterSettings, Settings};
use crate::error::{Result, StemmeError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Renders audio to mono 16-bit PCM WAV with an ffmpeg subprocess.
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    ffmpeg_path: PathBuf,
    sample_rate: u32,
}

impl FfmpegConverter {
    /// Create a converter from explicit settings.
    pub fn new(settings: &ConverterSettings) -> Self {
        Self {
            ffmpeg_path: Settings::expand_path(&settings.ffmpeg_path),
            sample_rate: settings.sample_rate,
        }
    }

    /// Path of the ffmpeg binary this converter runs.
    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    /// Run `ffmpeg -version` and return the first line of its output.
    pub async fn version(&self) -> Result<String> {
        let result = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await;

        match result {
            Ok(out) if out.status.success() => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                Ok(stdout.lines().next().unwrap_or_default().to_string())
            }
            Ok(_) => Err(StemmeError::ToolNotFound(format!(
                "{} is installed but not working correctly",
                self.ffmpeg_path.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StemmeError::ToolNotFound(
                self.ffmpeg_path.display().to_string(),
            )),
            Err(e) => Err(StemmeError::ToolNotFound(format!(
                "{}: {}",
                self.ffmpeg_path.display(),
                e
            ))),
        }
    }
}

/// Maps a declared file extension to the ffmpeg demuxer that reads it.
fn demuxer_for(format: &str) -> &str {
    match format {
        "m4a" | "m4b" | "mp4" | "mov" | "3gp" => "mov",
        "oga" | "opus" => "ogg",
        "mka" | "mkv" | "webm" => "matroska",
        "aif" | "aiff" => "aiff",
        "mpga" => "mp3",
        "wma" | "wmv" | "asf" => "asf",
        other => other,
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    #[instrument(skip(self), fields(source = %source.display()))]
    async fn convert(&self, source: &Path, format: Option<&str>, dest: &Path) -> Result<()> {
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(StemmeError::FileNotFound(source.display().to_string()));
        }

        debug!("Converting {:?} ({}) to WAV", source, format.unwrap_or("auto"));

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-hide_banner")
            .arg("-loglevel").arg("error");

        if let Some(fmt) = format {
            cmd.arg("-f").arg(demuxer_for(fmt));
        }

        let result = cmd
            .arg("-i").arg(source)
            .arg("-vn")
            .arg("-ac").arg("1")
            .arg("-ar").arg(self.sample_rate.to_string())
            .arg("-c:a").arg("pcm_s16le")
            .arg("-f").arg("wav")
            .arg("-y")
            .arg(dest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        match result {
            Ok(out) if out.status.success() => {
                if tokio::fs::try_exists(dest).await.unwrap_or(false) {
                    Ok(())
                } else {
                    Err(StemmeError::Conversion("ffmpeg produced no output".into()))
                }
            }
            Ok(out) => {
                let err = String::from_utf8_lossy(&out.stderr);
                Err(StemmeError::Conversion(format!("ffmpeg failed: {}", err.trim())))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StemmeError::ToolNotFound(
                self.ffmpeg_path.display().to_string(),
            )),
            Err(e) => Err(StemmeError::Conversion(format!("ffmpeg error: {e}"))),
        }
    }
}
