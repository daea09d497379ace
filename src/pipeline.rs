//! Upload → convert → recognize pipeline.
//!
//! Every request writes at most two scratch files into the shared temp
//! directory: the upload itself and its WAV rendering. Both are tracked in
//! [`ScratchFiles`] and removed before the request finishes, whatever the
//! outcome.

use crate::audio::{declared_format, wav_path_for, Converter};
use crate::error::{Result, StemmeError};
use crate::recognition::Recognizer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Name used when the client supplies no usable filename.
pub const FALLBACK_FILENAME: &str = "upload";

/// Longest sanitized filename kept, in bytes.
///
/// Leaves room for the request prefix and a `.normalized.wav` rendering
/// within the usual 255-byte name limit.
pub const MAX_FILENAME_BYTES: usize = 200;

/// Extensions longer than this are treated as part of the name.
const MAX_EXTENSION_BYTES: usize = 16;

/// Scratch artifacts created on behalf of a single request.
///
/// Paths are recorded before the file is written, so a partially written
/// file is still removed. Anything left when the value is dropped (for
/// example because the request future was cancelled) is removed then.
#[derive(Debug, Default)]
pub struct ScratchFiles {
    upload: Option<PathBuf>,
    wav: Option<PathBuf>,
}

impl ScratchFiles {
    /// Remove every tracked file that exists.
    ///
    /// Failures are logged and never stop the remaining removals.
    pub async fn cleanup(&mut self) {
        for path in [self.upload.take(), self.wav.take()].into_iter().flatten() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("Removed {:?}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Cleanup error for {:?}: {}", path, e),
            }
        }
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in [self.upload.take(), self.wav.take()].into_iter().flatten() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed {:?} on drop", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Cleanup error for {:?}: {}", path, e),
            }
        }
    }
}

/// Reduce a client-supplied filename to a safe final path component.
///
/// Long names are shortened to [`MAX_FILENAME_BYTES`], keeping the
/// extension.
pub fn sanitize_filename(filename: Option<&str>) -> String {
    let name = filename
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or(FALLBACK_FILENAME);
    truncate_filename(name)
}

fn truncate_filename(name: &str) -> String {
    if name.len() <= MAX_FILENAME_BYTES {
        return name.to_string();
    }

    let (stem, extension) = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= MAX_EXTENSION_BYTES => name.split_at(dot),
        _ => (name, ""),
    };

    let mut end = MAX_FILENAME_BYTES - extension.len();
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &stem[..end], extension)
}

/// Coordinates scratch storage, conversion and recognition.
pub struct TranscriptionPipeline {
    temp_dir: PathBuf,
    converter: Arc<dyn Converter>,
    recognizer: Arc<dyn Recognizer>,
}

impl TranscriptionPipeline {
    /// Create a pipeline over an existing temp directory.
    pub fn new(
        temp_dir: impl Into<PathBuf>,
        converter: Arc<dyn Converter>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            converter,
            recognizer,
        }
    }

    /// Directory holding per-request scratch files.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Transcribe uploaded bytes.
    ///
    /// The declared format is taken from the filename's extension.
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn transcribe_upload(&self, filename: Option<&str>, bytes: &[u8]) -> Result<String> {
        let filename = sanitize_filename(filename);
        let mut scratch = ScratchFiles::default();

        let result = self.run(&filename, bytes, &mut scratch).await;
        scratch.cleanup().await;

        match &result {
            Ok(text) => info!(chars = text.len(), "Transcription complete"),
            Err(StemmeError::SpeechNotRecognized) => info!("Speech not recognized"),
            Err(e) => warn!("Transcription failed: {}", e),
        }
        result
    }

    /// Transcribe a file that already exists on disk.
    ///
    /// The source is copied into the temp directory first and is never
    /// modified or removed.
    pub async fn transcribe_file(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StemmeError::FileNotFound(path.display().to_string()),
            _ => StemmeError::Io(e),
        })?;

        let filename = path.file_name().and_then(|n| n.to_str());
        self.transcribe_upload(filename, &bytes).await
    }

    async fn run(&self, filename: &str, bytes: &[u8], scratch: &mut ScratchFiles) -> Result<String> {
        let upload = self.temp_dir.join(format!("{}-{}", Uuid::new_v4(), filename));
        scratch.upload = Some(upload.clone());
        tokio::fs::write(&upload, bytes).await?;
        debug!("Saved incoming file to {:?}", upload);

        let format = declared_format(filename);
        let wav = wav_path_for(&upload);
        scratch.wav = Some(wav.clone());
        self.converter.convert(&upload, format.as_deref(), &wav).await?;
        debug!("Exported WAV to {:?}", wav);

        let audio = tokio::fs::read(&wav).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StemmeError::FileNotFound(wav.display().to_string()),
            _ => StemmeError::Io(e),
        })?;

        self.recognizer.recognize(&audio).await
    }
}
