//! Error types for Stemme.

use axum::http::StatusCode;
use thiserror::Error;

/// Library-level error type for Stemme operations.
#[derive(Error, Debug)]
pub enum StemmeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No file uploaded")]
    NoFileUploaded,

    #[error("Speech not recognized")]
    SpeechNotRecognized,

    #[error("{0}")]
    UploadTooLarge(String),

    #[error("Failed to read uploaded file: {0}")]
    UploadRead(String),

    #[error("File not found or conversion failed: {0}")]
    FileNotFound(String),

    #[error("Audio conversion failed: {0}")]
    Conversion(String),

    #[error("Speech recognition failed: {0}")]
    Recognition(String),

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),
}

impl StemmeError {
    /// HTTP status a caller should see for this error.
    ///
    /// A missing file and a negative recognition result are 400s, a body
    /// over the upload limit is 413, and everything else is an
    /// infrastructure fault.
    pub fn status_code(&self) -> StatusCode {
        match self {
            StemmeError::NoFileUploaded | StemmeError::SpeechNotRecognized => {
                StatusCode::BAD_REQUEST
            }
            StemmeError::UploadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type alias for Stemme operations.
pub type Result<T> = std::result::Result<T, StemmeError>;
