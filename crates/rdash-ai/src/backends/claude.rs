//! Anthropic messages API backend (image frames only).

use std::time::Duration;

use async_trait::async_trait;
use rdash_models::{BackendKind, SubmissionMode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_status, encode_frames, http_client, send_error};
use crate::config::BackendConfig;
use crate::error::{AiError, AiResult};
use crate::processor::{Media, ModelBackend, ModelRequest};
use crate::prompt::SYSTEM_INSTRUCTION;

const BACKEND: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1000;
const TEMPERATURE: f32 = 0.2;

pub struct ClaudeBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_images: usize,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<UserMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock<'a> {
    Text { text: &'a str },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl ClaudeBackend {
    pub fn new(config: &BackendConfig) -> AiResult<Self> {
        Ok(Self {
            client: http_client(BACKEND, config.request_timeout)?,
            api_key: config.require_key()?.to_string(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_images: config.max_images,
            timeout: config.request_timeout,
        })
    }
}

#[async_trait]
impl ModelBackend for ClaudeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Claude
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn submission_mode(&self) -> SubmissionMode {
        SubmissionMode::Frames {
            max_images: self.max_images,
        }
    }

    async fn generate(&self, request: ModelRequest<'_>) -> AiResult<String> {
        let Media::Frames(frames) = &request.media else {
            return Err(AiError::UnsupportedMedia(BACKEND));
        };

        let images = encode_frames(frames)?;
        let mut content = Vec::with_capacity(images.len() + 1);
        content.push(ContentBlock::Text {
            text: request.prompt,
        });
        content.extend(images.into_iter().map(|data| ContentBlock::Image {
            source: ImageSource {
                kind: "base64",
                media_type: "image/jpeg",
                data,
            },
        }));

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            system: SYSTEM_INSTRUCTION,
            messages: vec![UserMessage {
                role: "user",
                content,
            }],
        };

        debug!(model = %self.model, frames = frames.len(), "Sending frames to Anthropic");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(BACKEND, self.timeout, e))?;

        let response: MessagesResponse = check_status(BACKEND, response)
            .await?
            .json()
            .await
            .map_err(|e| AiError::transport(BACKEND, format!("Invalid response body: {}", e)))?;

        response
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or(AiError::EmptyResponse(BACKEND))
    }
}
