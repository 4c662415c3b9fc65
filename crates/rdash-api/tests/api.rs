//! Router-level tests for the analysis API.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use rdash_ai::{AiResult, Media, ModelBackend, ModelRequest, ProcessorRegistry, VideoProcessor};
use rdash_api::{create_router, ApiConfig, AppState};
use rdash_models::{BackendKind, SubmissionMode};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOUNDARY: &str = "rdash-test-boundary";
const LOCAL: [u8; 4] = [127, 0, 0, 1];
const REMOTE: [u8; 4] = [203, 0, 113, 7];

/// Whole-video backend that records which file it was handed.
#[derive(Default)]
struct RecordingBackend {
    seen: Mutex<Vec<(PathBuf, bool)>>,
}

#[async_trait]
impl ModelBackend for RecordingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gemini
    }

    fn model_name(&self) -> &str {
        "recording"
    }

    fn submission_mode(&self) -> SubmissionMode {
        SubmissionMode::WholeVideo
    }

    async fn generate(&self, request: ModelRequest<'_>) -> AiResult<String> {
        if let Media::Video { path, .. } = request.media {
            self.seen
                .lock()
                .unwrap()
                .push((path.to_path_buf(), path.exists()));
        }
        Ok(r#"{"segments":[{"start_time":0,"end_time":1,"description":"arm moves"}]}"#.to_string())
    }
}

impl RecordingBackend {
    fn calls(&self) -> Vec<(PathBuf, bool)> {
        self.seen.lock().unwrap().clone()
    }
}

struct TestApp {
    router: Router,
    backend: Arc<RecordingBackend>,
    upload_dir: PathBuf,
    _dir: TempDir,
}

fn test_app(peer: [u8; 4], configure: impl FnOnce(&mut ApiConfig)) -> TestApp {
    let dir = TempDir::new().unwrap();
    let upload_dir = dir.path().join("temp_videos");

    let mut config = ApiConfig {
        upload_dir: upload_dir.clone(),
        metrics_enabled: false,
        ..ApiConfig::default()
    };
    configure(&mut config);

    let backend = Arc::new(RecordingBackend::default());
    let registry = ProcessorRegistry::new(VideoProcessor::new(backend.clone()));
    let state = AppState::with_registry(config, registry);

    TestApp {
        router: create_router(state, None).layer(MockConnectInfo(SocketAddr::from((peer, 40000)))),
        backend,
        upload_dir,
        _dir: dir,
    }
}

fn app() -> TestApp {
    test_app(LOCAL, |_| {})
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn analyze_request(parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n", name, value)
                        .as_bytes(),
                );
            }
            Part::File(name, filename, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/analyze")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"status": "ok"}));
}

#[tokio::test]
async fn test_ready_reports_backends() {
    let app = app();
    let request = Request::get("/ready").body(Body::empty()).unwrap();
    let (status, body) = send(&app.router, request).await;

    // Depends on whether FFmpeg is installed
    assert!(status == StatusCode::OK || status == StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["default_backend"], "gemini");
    assert_eq!(body["backends"], serde_json::json!(["gemini"]));
    assert!(body["checks"]["ffmpeg"]["status"].is_string());
}

#[tokio::test]
async fn test_response_headers() {
    let app = app();
    let request = Request::get("/health")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.headers()["x-request-id"], "req-42");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
}

#[tokio::test]
async fn test_missing_video_and_url() {
    let app = app();
    let (status, body) = send(&app.router, analyze_request(&[Part::Text("model", "gpt4")])).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No video file or URL provided");
}

#[tokio::test]
async fn test_empty_filename() {
    let app = app();
    let (status, body) = send(&app.router, analyze_request(&[Part::File("video", "", b"data")])).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No video file selected");
}

#[tokio::test]
async fn test_disallowed_extension() {
    let app = app();
    let (status, body) = send(
        &app.router,
        analyze_request(&[Part::File("video", "notes.txt", b"hello")]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "File type not allowed");
    assert_eq!(file_count(&app.upload_dir), 0);
}

#[tokio::test]
async fn test_invalid_url_scheme() {
    let app = app();
    let (status, body) = send(
        &app.router,
        analyze_request(&[Part::Text("video_url", "ftp://example.com/clip.mp4")]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("http://"));
}

#[tokio::test]
async fn test_download_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let app = app();
    let url = format!("{}/missing.mp4", server.uri());
    let (status, body) = send(&app.router, analyze_request(&[Part::Text("video_url", &url)])).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Failed to download video from URL");
    assert_eq!(file_count(&app.upload_dir), 0);
}

#[tokio::test]
async fn test_unreadable_video_is_rejected_and_removed() {
    let app = app();
    let (status, body) = send(
        &app.router,
        analyze_request(&[Part::File("video", "clip.mp4", b"definitely not a video")]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Failed to extract frames from video");
    assert_eq!(file_count(&app.upload_dir), 0);
    assert!(app.backend.calls().is_empty());
}

#[tokio::test]
async fn test_oversized_upload() {
    let app = test_app(LOCAL, |config| config.max_upload_bytes = 16);
    let (status, body) = send(
        &app.router,
        analyze_request(&[Part::File("video", "clip.mp4", &[0u8; 64])]),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].as_str().unwrap().contains("too large"));
    assert_eq!(file_count(&app.upload_dir), 0);
}

#[tokio::test]
async fn test_cleanup_rejects_remote_callers() {
    let app = test_app(REMOTE, |_| {});
    let request = Request::post("/cleanup").body(Body::empty()).unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_cleanup_sweeps_stale_files() {
    let app = test_app(LOCAL, |config| config.temp_max_age = Duration::ZERO);
    std::fs::create_dir_all(&app.upload_dir).unwrap();
    std::fs::write(app.upload_dir.join("orphan.mp4"), b"left behind").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let request = Request::post("/cleanup").body(Body::empty()).unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"removed": 1, "failed": 0}));
    assert_eq!(file_count(&app.upload_dir), 0);
}

#[tokio::test]
async fn test_cleanup_keeps_recent_files() {
    let app = app();
    std::fs::create_dir_all(&app.upload_dir).unwrap();
    std::fs::write(app.upload_dir.join("in-flight.mp4"), b"busy").unwrap();

    let request = Request::post("/cleanup").body(Body::empty()).unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 0);
    assert_eq!(file_count(&app.upload_dir), 1);
}

/// Two identical uploads get separate temp files, each removed afterwards.
#[tokio::test]
#[ignore = "requires ffmpeg and ffprobe on PATH"]
async fn test_identical_uploads_use_distinct_temp_files() {
    let source_dir = TempDir::new().unwrap();
    let source = source_dir.path().join("source.mp4");
    let status = tokio::process::Command::new("ffmpeg")
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "lavfi",
            "-i",
            "testsrc=duration=3:size=64x48:rate=2",
            "-pix_fmt",
            "yuv420p",
        ])
        .arg(&source)
        .status()
        .await
        .unwrap();
    assert!(status.success());
    let bytes = std::fs::read(&source).unwrap();

    let app = app();
    for model in ["gemini", "claude"] {
        let (status, body) = send(
            &app.router,
            analyze_request(&[
                Part::Text("model", model),
                Part::File("video", "robot run.mp4", &bytes),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["segments"][0]["description"], "arm moves");
    }

    let calls = app.backend.calls();
    assert_eq!(calls.len(), 2);
    assert_ne!(calls[0].0, calls[1].0);
    for (path, existed) in &calls {
        assert!(existed);
        assert!(!path.exists());
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.ends_with("_robot_run.mp4"));
    }
    assert_eq!(file_count(&app.upload_dir), 0);
}
