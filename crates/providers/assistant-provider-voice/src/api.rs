//! HTTP surface: health, streamed speech synthesis and prewarm

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::encoders::EncoderSettings;
use crate::prewarm::{PrewarmManager, PrewarmRequest};
use crate::speech::synthesize_speech;
use crate::types::{SpeechRequest, VoiceError};
use crate::workers::SpeechWorker;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Worker selected at startup
    pub worker: Arc<dyn SpeechWorker>,
    /// Prewarm registry
    pub prewarm: Arc<PrewarmManager>,
    /// Codec parameters for responses
    pub encoder_settings: EncoderSettings,
}

impl AppState {
    /// State around `worker` with an empty prewarm registry
    pub fn new(worker: Arc<dyn SpeechWorker>, encoder_settings: EncoderSettings) -> Self {
        Self {
            worker,
            prewarm: Arc::new(PrewarmManager::default()),
            encoder_settings,
        }
    }

    /// Replace the prewarm registry
    pub fn with_prewarm(mut self, prewarm: Arc<PrewarmManager>) -> Self {
        self.prewarm = prewarm;
        self
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    worker: &'static str,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// Error returned by handlers as a JSON body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    details: Option<String>,
}

impl ApiError {
    /// 400 with a message
    pub fn bad_request(error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            details,
        }
    }

    /// HTTP status of this error
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<VoiceError> for ApiError {
    fn from(err: VoiceError) -> Self {
        if err.is_client_error() {
            warn!(error = %err, "Rejected speech request");
            return Self::bad_request(err.to_string(), None);
        }
        if err.is_model_unavailable() {
            warn!(error = %err, "Voice model unavailable");
            return Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                error: "Voice model unavailable".to_string(),
                details: Some(err.to_string()),
            };
        }
        error!(error = %err, "Speech synthesis failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: "Speech synthesis failed".to_string(),
            details: Some(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("Invalid request body", Some(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.error,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/audio/speech", post(speech))
        .route("/v1/audio/prewarm", post(prewarm))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        worker: state.worker.worker_type(),
    })
}

async fn speech(
    State(state): State<AppState>,
    payload: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let response = synthesize_speech(state.worker.as_ref(), &request, &state.encoder_settings).await?;
    info!(
        format = %response.format,
        sample_rate = response.pcm_spec.sample_rate(),
        chars = request.text.chars().count(),
        "Streaming speech"
    );

    let headers = [
        (header::CONTENT_TYPE, response.content_type().to_string()),
        (header::CACHE_CONTROL, "no-store".to_string()),
        (header::CONTENT_DISPOSITION, response.format.content_disposition()),
    ];
    Ok((StatusCode::OK, headers, Body::from_stream(response.body)).into_response())
}

async fn prewarm(
    State(state): State<AppState>,
    payload: Option<Json<PrewarmRequest>>,
) -> impl IntoResponse {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let voice = request.voice.clone().filter(|v| !v.trim().is_empty());
    state.prewarm.request_optional(request);

    if let Some(voice) = voice {
        let worker = Arc::clone(&state.worker);
        tokio::spawn(async move {
            match worker.preload(Some(&voice)).await {
                Ok(()) => info!(voice = %voice, "Prewarm complete"),
                Err(e) => warn!(voice = %voice, error = %e, "Prewarm failed"),
            }
        });
    }

    (StatusCode::ACCEPTED, Json(StatusResponse { status: "accepted" }))
}
