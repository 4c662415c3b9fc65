//! Google Gemini backend (whole video).
//!
//! Small videos are sent inline as base64. Larger ones go through the File
//! API:
//!
//! ```text
//! Uploading -> Processing -> Active -> generate
//!                         -> Failed
//!                         -> TimedOut
//! ```
//!
//! Polling and generation are retried individually against the uploaded
//! file, so a transient error never repeats the upload. The upload itself
//! is attempted once.
//!
//! Once an upload succeeds the remote copy is deleted on every exit path.
//! If the call is cancelled before the deletion runs, the guard hands the
//! deletion to a background task.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rdash_models::{BackendKind, SubmissionMode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{check_status, http_client, send_error};
use crate::config::{BackendConfig, UploadConfig};
use crate::error::{AiError, AiResult};
use crate::processor::{Media, ModelBackend, ModelRequest};
use crate::retry::{retry_model_call, RetryPolicy};

const BACKEND: &str = "gemini";
const UPLOAD_TEMPERATURE: f32 = 0.2;
const UPLOAD_MAX_OUTPUT_TOKENS: u32 = 2048;

/// Lifecycle of a video uploaded through the File API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Uploading,
    Processing,
    Active,
    Failed,
    TimedOut,
}

impl UploadState {
    /// Map the File API `state` field. Unknown or missing means still processing.
    pub fn from_remote(state: Option<&str>) -> Self {
        match state {
            Some("ACTIVE") => UploadState::Active,
            Some("FAILED") => UploadState::Failed,
            _ => UploadState::Processing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadState::Active | UploadState::Failed | UploadState::TimedOut
        )
    }
}

pub struct GeminiBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    upload: UploadConfig,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part<'a> {
    Text(&'a str),
    InlineData(Blob),
    FileData(FileData<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

/// File API resource.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteFile {
    /// `files/<id>`
    name: String,
    uri: String,
    mime_type: Option<String>,
    state: Option<String>,
}

impl GeminiBackend {
    pub fn new(config: &BackendConfig, upload: &UploadConfig) -> AiResult<Self> {
        Ok(Self {
            client: http_client(BACKEND, config.request_timeout)?,
            api_key: config.require_key()?.to_string(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout,
            upload: upload.clone(),
            retry: RetryPolicy::default(),
        })
    }

    /// Retry policy for each poll and generation request.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn generate_inline(&self, path: &Path, mime_type: &'static str, prompt: &str) -> AiResult<String> {
        let bytes = tokio::fs::read(path).await?;
        debug!(bytes = bytes.len(), mime_type, "Sending video inline to Gemini");

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::InlineData(Blob {
                        mime_type,
                        data: BASE64.encode(&bytes),
                    }),
                    Part::Text(prompt),
                ],
            }],
            generation_config: None,
        };

        self.generate_with_retry(&request).await
    }

    async fn generate_uploaded(&self, path: &Path, mime_type: &'static str, prompt: &str) -> AiResult<String> {
        debug!(state = ?UploadState::Uploading, path = %path.display(), "Uploading video to Gemini File API");
        let file = self.upload_file(path, mime_type).await?;
        let guard = RemoteFileGuard::new(self.client.clone(), self.file_url(&file.name), self.api_key.clone());

        let result = async {
            let file = self.wait_until_active(file).await?;
            let request = GenerateRequest {
                contents: vec![Content {
                    parts: vec![
                        Part::Text(prompt),
                        Part::FileData(FileData {
                            mime_type: file.mime_type.as_deref().unwrap_or(mime_type),
                            file_uri: &file.uri,
                        }),
                    ],
                }],
                generation_config: Some(GenerationConfig {
                    temperature: UPLOAD_TEMPERATURE,
                    max_output_tokens: UPLOAD_MAX_OUTPUT_TOKENS,
                }),
            };
            self.generate_with_retry(&request).await
        }
        .await;

        guard.release().await;
        result
    }

    async fn upload_file(&self, path: &Path, mime_type: &str) -> AiResult<RemoteFile> {
        let bytes = tokio::fs::read(path).await?;
        let size = bytes.len();

        let response = self
            .client
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .header("X-Goog-Upload-Protocol", "raw")
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| AiError::UploadFailed(e.to_string()))?;

        let response = check_status(BACKEND, response)
            .await
            .map_err(|e| AiError::UploadFailed(e.to_string()))?;

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| AiError::UploadFailed(format!("Invalid upload response: {}", e)))?;

        info!(file = %uploaded.file.name, bytes = size, "Uploaded video to Gemini File API");
        Ok(uploaded.file)
    }

    async fn get_file(&self, name: &str) -> AiResult<RemoteFile> {
        let response = self
            .client
            .get(self.file_url(name))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| send_error(BACKEND, self.timeout, e))?;

        check_status(BACKEND, response)
            .await?
            .json()
            .await
            .map_err(|e| AiError::transport(BACKEND, format!("Invalid file resource: {}", e)))
    }

    /// Poll until the file leaves processing, bounded by `poll_max_wait`.
    async fn wait_until_active(&self, mut file: RemoteFile) -> AiResult<RemoteFile> {
        let deadline = Instant::now() + self.upload.poll_max_wait;
        let mut state = UploadState::from_remote(file.state.as_deref());

        while !state.is_terminal() {
            let now = Instant::now();
            if now >= deadline {
                warn!(file = %file.name, "Gave up waiting for uploaded file to become active");
                state = UploadState::TimedOut;
                break;
            }

            tokio::time::sleep(self.upload.poll_interval.min(deadline - now)).await;
            let name = file.name.clone();
            file = retry_model_call(&self.retry, "gemini.get_file", || self.get_file(&name)).await?;

            let next = UploadState::from_remote(file.state.as_deref());
            if next != state {
                debug!(file = %file.name, from = ?state, to = ?next, "Upload state changed");
            }
            state = next;
        }

        match state {
            UploadState::Active => Ok(file),
            UploadState::Failed => Err(AiError::ProcessingFailed(format!(
                "{} entered FAILED state",
                file.name
            ))),
            _ => Err(AiError::Timeout(self.upload.poll_max_wait.as_secs())),
        }
    }

    async fn generate_with_retry(&self, request: &GenerateRequest<'_>) -> AiResult<String> {
        retry_model_call(&self.retry, "gemini.generate", || self.generate_content(request)).await
    }

    async fn generate_content(&self, request: &GenerateRequest<'_>) -> AiResult<String> {
        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .json(request)
            .send()
            .await
            .map_err(|e| send_error(BACKEND, self.timeout, e))?;

        let response: GenerateResponse = check_status(BACKEND, response)
            .await?
            .json()
            .await
            .map_err(|e| AiError::transport(BACKEND, format!("Invalid response body: {}", e)))?;

        response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|content| content.parts.into_iter().find_map(|p| p.text))
            .filter(|text| !text.trim().is_empty())
            .ok_or(AiError::EmptyResponse(BACKEND))
    }

    fn file_url(&self, name: &str) -> String {
        format!("{}/v1beta/{}", self.base_url, name)
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gemini
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn submission_mode(&self) -> SubmissionMode {
        SubmissionMode::WholeVideo
    }

    fn retries_internally(&self) -> bool {
        true
    }

    async fn generate(&self, request: ModelRequest<'_>) -> AiResult<String> {
        let Media::Video { path, mime_type } = request.media else {
            return Err(AiError::UnsupportedMedia(BACKEND));
        };

        let size = tokio::fs::metadata(path).await?.len();
        if size < self.upload.inline_limit_bytes {
            self.generate_inline(path, mime_type, request.prompt).await
        } else {
            self.generate_uploaded(path, mime_type, request.prompt).await
        }
    }
}

/// Deletes an uploaded file when released or dropped.
struct RemoteFileGuard {
    client: Client,
    url: String,
    api_key: String,
    released: bool,
}

impl RemoteFileGuard {
    fn new(client: Client, url: String, api_key: String) -> Self {
        Self {
            client,
            url,
            api_key,
            released: false,
        }
    }

    async fn release(mut self) {
        self.released = true;
        delete_remote_file(&self.client, &self.url, &self.api_key).await;
    }
}

impl Drop for RemoteFileGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = self.client.clone();
                let url = std::mem::take(&mut self.url);
                let api_key = std::mem::take(&mut self.api_key);
                handle.spawn(async move {
                    delete_remote_file(&client, &url, &api_key).await;
                });
            }
            Err(_) => warn!(url = %self.url, "No runtime to delete uploaded file"),
        }
    }
}

/// Best-effort deletion. Failures are logged.
async fn delete_remote_file(client: &Client, url: &str, api_key: &str) {
    let result = client
        .delete(url)
        .query(&[("key", api_key)])
        .send()
        .await
        .map_err(|e| AiError::transport(BACKEND, e));

    let result = match result {
        Ok(response) => check_status(BACKEND, response).await.map(|_| ()),
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => debug!(url, "Deleted uploaded file"),
        Err(e) => warn!(url, "Failed to delete uploaded file: {}", e),
    }
}
