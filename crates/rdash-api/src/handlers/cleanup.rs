//! Stale temp file sweep.

use axum::extract::State;
use axum::Json;
use rdash_media::{sweep_stale_files, SweepReport};

use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;

/// Delete temp videos older than the configured max age.
///
/// Mounted behind the loopback guard.
pub async fn cleanup(State(state): State<AppState>) -> ApiResult<Json<SweepReport>> {
    let report = sweep_stale_files(&state.config.upload_dir, state.config.temp_max_age).await?;
    metrics::record_temp_files_swept(report.removed);
    Ok(Json(report))
}
