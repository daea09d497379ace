//! HTTP API server.
//!
//! Exposes a status endpoint and a multipart upload endpoint that runs the
//! transcription pipeline.

mod handlers;

pub use handlers::{FILE_FIELD, STATUS_MESSAGE};

use crate::config::Settings;
use crate::pipeline::TranscriptionPipeline;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<TranscriptionPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<TranscriptionPipeline>) -> Self {
        Self { pipeline }
    }
}

/// Build the CORS layer.
///
/// Every origin is allowed. With credentials enabled the request's origin,
/// methods and headers are mirrored back, since browsers reject `*` for
/// credentialed requests.
fn cors_layer(allow_credentials: bool) -> CorsLayer {
    if allow_credentials {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Build the application router.
pub fn router(state: AppState, settings: &Settings) -> Router {
    Router::new()
        .route("/", get(handlers::status))
        .route("/transcribe", post(handlers::transcribe))
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes()))
        .layer(cors_layer(settings.server.allow_credentials))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl+C.
pub async fn serve(state: AppState, settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let app = router(state, settings);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
