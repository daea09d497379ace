//! Transcribe command - one-off transcription of a local file.

use super::build_pipeline;
use crate::cli::Output;
use crate::config::Settings;
use crate::error::StemmeError;
use anyhow::Result;
use std::path::Path;

/// Run the transcribe command.
pub async fn run_transcribe(input: &str, settings: Settings) -> Result<()> {
    let pipeline = build_pipeline(&settings)?;

    let spinner = Output::spinner(&format!("Transcribing {}...", input));
    let result = pipeline.transcribe_file(Path::new(input)).await;
    spinner.finish_and_clear();

    match result {
        Ok(transcript) => {
            println!("{}", transcript);
            Ok(())
        }
        Err(StemmeError::SpeechNotRecognized) => {
            Output::warning("Speech not recognized");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
