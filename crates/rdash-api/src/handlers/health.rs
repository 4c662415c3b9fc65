//! Health check handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rdash_media::{check_ffmpeg, check_ffprobe, MediaResult};
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub checks: ReadinessChecks,
    pub default_backend: &'static str,
    pub backends: Vec<&'static str>,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub ffmpeg: CheckStatus,
    pub ffprobe: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckStatus {
    fn from_result<T>(result: MediaResult<T>) -> Self {
        match result {
            Ok(_) => Self {
                status: "ok",
                error: None,
            },
            Err(e) => Self {
                status: "error",
                error: Some(e.to_string()),
            },
        }
    }

    fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Readiness check endpoint (readiness probe).
/// Frame sampling needs both FFmpeg binaries on the PATH.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let checks = ReadinessChecks {
        ffmpeg: CheckStatus::from_result(check_ffmpeg()),
        ffprobe: CheckStatus::from_result(check_ffprobe()),
    };
    let all_ok = checks.ffmpeg.is_ok() && checks.ffprobe.is_ok();

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "not_ready" },
        checks,
        default_backend: state.registry.default_kind().as_str(),
        backends: state
            .registry
            .available()
            .into_iter()
            .map(|kind| kind.as_str())
            .collect(),
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
