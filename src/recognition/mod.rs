//! Speech recognition.
//!
//! A [`Recognizer`] turns a complete WAV rendering into text. "No speech
//! detected" is reported as [`StemmeError::SpeechNotRecognized`], distinct
//! from service and transport failures.
//!
//! [`StemmeError::SpeechNotRecognized`]: crate::error::StemmeError::SpeechNotRecognized

pub mod credentials;
mod google;

pub use credentials::{AuthorizedUser, CredentialSource, ServiceAccountKey, TokenProvider};
pub use google::GoogleSpeechRecognizer;

use crate::error::Result;
use async_trait::async_trait;

/// Trait for speech recognition services.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize the whole of a WAV file as a single utterance.
    async fn recognize(&self, wav: &[u8]) -> Result<String>;
}
