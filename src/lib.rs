//! Stemme - Speech-to-Text Upload Gateway
//!
//! A small HTTP service that accepts an uploaded audio file, normalizes it to
//! WAV and asks a speech recognition service for a transcript.
//!
//! The name "Stemme" is the Norwegian word for "voice."
//!
//! # Architecture
//!
//! - `config` - Configuration management
//! - `audio` - Format normalization (ffmpeg)
//! - `recognition` - Speech recognition (Google Cloud Speech-to-Text)
//! - `pipeline` - Upload → convert → recognize → cleanup sequencing
//! - `server` - HTTP endpoints
//! - `cli` - Command-line interface
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stemme::audio::FfmpegConverter;
//! use stemme::config::Settings;
//! use stemme::pipeline::TranscriptionPipeline;
//! use stemme::recognition::{CredentialSource, GoogleSpeechRecognizer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let credentials = CredentialSource::resolve(&settings.recognition)?;
//!
//!     let pipeline = TranscriptionPipeline::new(
//!         settings.temp_dir(),
//!         Arc::new(FfmpegConverter::new(&settings.converter)),
//!         Arc::new(GoogleSpeechRecognizer::new(&settings.recognition, credentials)?),
//!     );
//!
//!     let text = pipeline.transcribe_file("memo.m4a".as_ref()).await?;
//!     println!("{}", text);
//!
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod recognition;
pub mod server;

pub use error::{Result, StemmeError};
