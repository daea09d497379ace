//! HTTP handlers.

use super::AppState;
use crate::error::{Result, StemmeError};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

/// Fixed body of the root status endpoint.
pub const STATUS_MESSAGE: &str = "Speech-to-Text backend is running!";

/// Name of the multipart field carrying the audio.
pub const FILE_FIELD: &str = "file";

#[derive(Serialize)]
struct StatusResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct TranscriptResponse {
    transcript: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(err: &StemmeError) -> Response {
    (
        err.status_code(),
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

pub(super) async fn status() -> impl IntoResponse {
    Json(StatusResponse {
        message: STATUS_MESSAGE,
    })
}

/// An uploaded file pulled out of a multipart body.
struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

fn upload_error(e: MultipartError) -> StemmeError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        StemmeError::UploadTooLarge(e.body_text())
    } else {
        StemmeError::UploadRead(e.body_text())
    }
}

/// Find the `file` part of a multipart body.
///
/// Only parts that carry a filename count as files. A malformed body with no
/// readable file part carries none. Going over the size limit, or failing to
/// read the file part itself, is an error.
async fn read_upload(multipart: &mut Multipart) -> Result<Option<Upload>> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(upload_error(e));
            }
            Err(e) => {
                warn!(error = %e, "Failed to read multipart body");
                return Ok(None);
            }
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };

        let bytes = field.bytes().await.map_err(upload_error)?;
        return Ok(Some(Upload {
            filename,
            bytes: bytes.to_vec(),
        }));
    }
}

pub(super) async fn transcribe(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "Request is not a multipart upload");
            return error_response(&StemmeError::NoFileUploaded);
        }
    };

    let upload = match read_upload(&mut multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => return error_response(&StemmeError::NoFileUploaded),
        Err(e) => {
            warn!("Failed to read upload: {}", e);
            return error_response(&e);
        }
    };

    debug!(filename = %upload.filename, bytes = upload.bytes.len(), "Received upload");

    match state
        .pipeline
        .transcribe_upload(Some(upload.filename.as_str()), &upload.bytes)
        .await
    {
        Ok(transcript) => Json(TranscriptResponse { transcript }).into_response(),
        Err(e) => {
            if e.status_code().is_server_error() {
                error!(filename = %upload.filename, "Error during transcription: {}", e);
            }
            error_response(&e)
        }
    }
}
