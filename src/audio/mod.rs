//! Audio normalization.
//!
//! Uploaded audio arrives in whatever container the client had at hand.
//! Before recognition it is rendered to mono 16-bit PCM WAV by a
//! [`Converter`]; the production implementation shells out to ffmpeg.

mod ffmpeg;

pub use ffmpeg::FfmpegConverter;

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Trait for audio format converters.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Render `source` as WAV at `dest`.
    ///
    /// `format` is the declared source format (a lowercase file extension).
    /// When `None`, the converter detects the format itself.
    async fn convert(&self, source: &Path, format: Option<&str>, dest: &Path) -> Result<()>;
}

/// Extracts the declared source format from a filename.
///
/// The format is the text after the last `.`, lowercased. Names without
/// an extension declare no format.
pub fn declared_format(filename: &str) -> Option<String> {
    let name = Path::new(filename).file_name()?.to_str()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Path of the WAV rendering that sits beside an uploaded file.
///
/// The upload's extension is replaced by `wav`. An upload that is already
/// a `.wav` gets a `.normalized.wav` sibling instead, since the converter
/// cannot write over its own input.
pub fn wav_path_for(upload: &Path) -> PathBuf {
    let is_wav = upload
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));

    if is_wav {
        upload.with_extension("normalized.wav")
    } else {
        upload.with_extension("wav")
    }
}
