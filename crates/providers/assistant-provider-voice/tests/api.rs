//! HTTP router tests driven through `tower::ServiceExt::oneshot`

use std::sync::Arc;
use std::time::Duration;

use assistant_provider_voice::{
    router, AppState, EncoderSettings, ModelCache, ModelStore, ModelUnavailableReason, NeuralWorker, PcmSpec,
    PrewarmManager, SyntheticWorker, VoiceError, VoiceModel,
};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

fn synthetic_app() -> (Router, Arc<PrewarmManager>) {
    let prewarm = Arc::new(PrewarmManager::default());
    let state = AppState::new(
        Arc::new(SyntheticWorker::new(PcmSpec::default())),
        EncoderSettings::default(),
    )
    .with_prewarm(Arc::clone(&prewarm));
    (router(state), prewarm)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_body(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn read_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&read_body(response).await).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = synthetic_app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({"status": "ok", "worker": "tts:synthetic"}));
}

#[tokio::test]
async fn test_speech_headers_per_format() {
    let cases = [
        ("pcm", "audio/pcm"),
        ("mp3", "audio/mpeg"),
        ("opus", "audio/ogg; codecs=opus"),
    ];
    for (format, mime) in cases {
        let (app, _) = synthetic_app();
        let response = app
            .oneshot(post_json("/v1/audio/speech", json!({"text": "hello", "format": format})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK, "format {}", format);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], mime);
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            format!("inline; filename=\"speech.{}\"", format).as_str()
        );
        assert!(!read_body(response).await.is_empty());
    }
}

#[tokio::test]
async fn test_pcm_body_length() {
    let (app, _) = synthetic_app();
    let response = app
        .oneshot(post_json("/v1/audio/speech", json!({"text": "hey", "format": "pcm"})))
        .await
        .unwrap();
    assert_eq!(read_body(response).await.len(), 3 * 320);
}

#[tokio::test]
async fn test_format_defaults_to_mp3() {
    let (app, _) = synthetic_app();
    let response = app
        .oneshot(post_json("/v1/audio/speech", json!({"text": "hello"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
}

#[tokio::test]
async fn test_unsupported_format_is_bad_request() {
    let (app, _) = synthetic_app();
    let response = app
        .oneshot(post_json("/v1/audio/speech", json!({"text": "hello", "format": "flac"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["error"], "Unsupported audio format: flac");
}

#[tokio::test]
async fn test_empty_and_missing_text_are_bad_requests() {
    for payload in [json!({"text": ""}), json!({"text": "  \n"}), json!({"format": "pcm"})] {
        let (app, _) = synthetic_app();
        let response = app.oneshot(post_json("/v1/audio/speech", payload.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "payload {}", payload);
        assert!(read_json(response).await["error"].is_string());
    }
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (app, _) = synthetic_app();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/audio/speech")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["error"], "Invalid request body");
    assert!(body["details"].is_string());
}

#[tokio::test]
async fn test_prewarm_is_recorded() {
    let (app, prewarm) = synthetic_app();
    let response = app
        .oneshot(post_json(
            "/v1/audio/prewarm",
            json!({"resource_id": "tts:synthetic:default", "language": "en"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(read_json(response).await, json!({"status": "accepted"}));

    let recorded = prewarm.list_optional_requests();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].resource_id.as_deref(), Some("tts:synthetic:default"));
    assert_eq!(recorded[0].language.as_deref(), Some("en"));
}

#[tokio::test]
async fn test_prewarm_without_body_is_accepted() {
    let (app, prewarm) = synthetic_app();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/audio/prewarm")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(prewarm.list_optional_requests().len(), 1);
}

struct NoModels;

impl ModelStore for NoModels {
    fn load(&self, voice_id: &str) -> Result<Arc<dyn VoiceModel>, VoiceError> {
        Err(VoiceError::ModelUnavailable {
            voice_id: voice_id.to_string(),
            reason: ModelUnavailableReason::EngineMissing,
            message: "piper not installed".to_string(),
        })
    }
}

fn neural_app() -> (Router, Arc<ModelCache>) {
    let cache = Arc::new(ModelCache::new(Arc::new(NoModels)));
    let worker = NeuralWorker::new("tts:piper", Arc::clone(&cache), Some("amy".to_string()), 4096);
    let state = AppState::new(Arc::new(worker), EncoderSettings::default());
    (router(state), cache)
}

#[tokio::test]
async fn test_model_unavailable_is_service_unavailable() {
    let (app, _) = neural_app();
    let response = app
        .oneshot(post_json("/v1/audio/speech", json!({"text": "hello"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json(response).await;
    assert_eq!(body["error"], "Voice model unavailable");
    assert!(body["details"].as_str().unwrap().contains("engine not installed"));
}

#[tokio::test]
async fn test_invalid_voice_is_bad_request() {
    let (app, _) = neural_app();
    let response = app
        .oneshot(post_json("/v1/audio/speech", json!({"text": "hello", "voice": "../secret"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_prewarm_failure_does_not_affect_response() {
    let (app, cache) = neural_app();
    let response = app
        .oneshot(post_json("/v1/audio/prewarm", json!({"voice": "amy"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cache.current_voice().await.is_none());
}
