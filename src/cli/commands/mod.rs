//! CLI command implementations.

mod config;
mod doctor;
mod serve;
mod transcribe;

pub use config::run_config;
pub use doctor::run_doctor;
pub use serve::run_serve;
pub use transcribe::run_transcribe;

use crate::audio::FfmpegConverter;
use crate::config::Settings;
use crate::pipeline::TranscriptionPipeline;
use crate::recognition::{CredentialSource, GoogleSpeechRecognizer};
use std::sync::Arc;
use tracing::info;

/// Wire the production converter and recognizer into a pipeline.
///
/// Credentials are resolved here, once, before the recognition client
/// exists.
pub(crate) fn build_pipeline(settings: &Settings) -> anyhow::Result<TranscriptionPipeline> {
    let converter = FfmpegConverter::new(&settings.converter);
    let credentials = CredentialSource::resolve(&settings.recognition)?;
    info!(
        ffmpeg = %converter.ffmpeg_path().display(),
        credentials = %credentials.describe(),
        "Initializing transcription pipeline"
    );

    let recognizer = GoogleSpeechRecognizer::new(&settings.recognition, credentials)?;

    Ok(TranscriptionPipeline::new(
        settings.temp_dir(),
        Arc::new(converter),
        Arc::new(recognizer),
    ))
}
