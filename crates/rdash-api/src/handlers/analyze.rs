//! Video analysis endpoint.

use std::path::Path;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::Json;
use rdash_media::{download_video, has_allowed_extension, is_supported_url, TempVideo};
use rdash_models::AnalysisResult;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Fields of an analysis request.
#[derive(Debug, Default)]
struct AnalyzeForm {
    /// Uploaded file, already written to disk
    video: Option<TempVideo>,
    video_url: Option<String>,
    model: Option<String>,
    custom_prompt: Option<String>,
}

impl AnalyzeForm {
    /// Read every field, streaming the first `video` file to the upload dir.
    async fn read(multipart: &mut Multipart, config: &ApiConfig) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "video" if form.video.is_none() => {
                    let filename = field
                        .file_name()
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(str::to_string)
                        .ok_or_else(|| ApiError::bad_request("No video file selected"))?;

                    if !has_allowed_extension(&filename) {
                        return Err(ApiError::bad_request("File type not allowed"));
                    }

                    let video = TempVideo::for_upload(&config.upload_dir, &filename).await?;
                    let written = save_field(&mut field, video.path(), config.max_upload_bytes).await?;
                    debug!(file = %video.file_name(), bytes = written, "Saved uploaded video");
                    form.video = Some(video);
                }
                "video_url" => form.video_url = non_empty(field.text().await?),
                "model" => form.model = non_empty(field.text().await?),
                "custom_prompt" => form.custom_prompt = non_empty(field.text().await?),
                _ => debug!(field = %name, "Ignoring multipart field"),
            }
        }

        Ok(form)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Stream a multipart field into `dest`, failing once it exceeds `max_bytes`.
async fn save_field(field: &mut Field<'_>, dest: &Path, max_bytes: u64) -> ApiResult<u64> {
    let mut file = File::create(dest)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create temp file: {}", e)))?;
    let mut written: u64 = 0;

    while let Some(chunk) = field.chunk().await? {
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(ApiError::too_large(max_bytes));
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to write temp file: {}", e)))?;
    }

    file.flush()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to write temp file: {}", e)))?;
    Ok(written)
}

/// Download `url` into a fresh temp file.
async fn fetch_url(config: &ApiConfig, url: &str) -> ApiResult<TempVideo> {
    if !is_supported_url(url) {
        return Err(ApiError::bad_request(
            "Invalid video URL: must start with http:// or https://",
        ));
    }

    let video = TempVideo::for_download(&config.upload_dir).await?;
    match download_video(url, video.path(), &config.download_options()).await {
        Ok(bytes) => {
            debug!(file = %video.file_name(), bytes, "Downloaded video");
            Ok(video)
        }
        Err(e) if e.is_too_large() => Err(ApiError::too_large(config.max_upload_bytes)),
        Err(e) => {
            warn!(url, "Failed to download video: {}", e);
            Err(ApiError::bad_request("Failed to download video from URL"))
        }
    }
}

/// Analyze an uploaded or linked video for robot activity segments.
///
/// Multipart fields: `video` (file) or `video_url`, plus optional `model`
/// and `custom_prompt`. The temp file is removed on every exit path.
pub async fn analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<AnalysisResult>> {
    let form = AnalyzeForm::read(&mut multipart, &state.config).await?;

    let video = match (form.video, form.video_url) {
        (Some(video), _) => video,
        (None, Some(url)) => fetch_url(&state.config, &url).await?,
        (None, None) => return Err(ApiError::bad_request("No video file or URL provided")),
    };

    let processor = state.registry.resolve(form.model.as_deref());

    let sampled = state
        .sampler
        .for_mode(processor.submission_mode())
        .sample(video.path())
        .await;
    if sampled.is_empty() {
        return Err(ApiError::bad_request("Failed to extract frames from video"));
    }

    info!(
        file = %video.file_name(),
        backend = %processor.kind(),
        frames = sampled.len(),
        custom_prompt = form.custom_prompt.is_some(),
        "Analyzing video"
    );

    let analysis = processor
        .analyze_sampled(video.path(), &sampled, form.custom_prompt.as_deref())
        .await;

    Ok(Json(analysis.result))
}
