//! Serve command - run the HTTP transcription server.

use super::build_pipeline;
use crate::cli::Output;
use crate::config::Settings;
use crate::server::{self, AppState};
use std::sync::Arc;

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    let pipeline = build_pipeline(&settings)?;

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);

    Output::header("Stemme API Server");
    println!();
    Output::success(&format!("Listening on http://{}:{}", host, port));
    println!();
    println!("Endpoints:");
    Output::kv("Status", "GET  /");
    Output::kv("Transcribe", "POST /transcribe (multipart field \"file\")");
    println!();
    Output::kv("Temp directory", &settings.temp_dir().display().to_string());
    Output::info("Press Ctrl+C to stop the server.");

    let state = AppState::new(Arc::new(pipeline));
    server::serve(state, &settings, &host, port).await
}
