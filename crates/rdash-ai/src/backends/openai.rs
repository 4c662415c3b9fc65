//! OpenAI chat completions backend (image frames only).

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

const BACKEND: &str = "openai";
const MAX_TOKENS: u32 = 1000;

pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_images: usize,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum Message<'a> {
    System { content: &'a str },
    User { content: Vec<ContentPart<'a>> },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiBackend {
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
impl ModelBackend for OpenAiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpt4
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
        content.push(ContentPart::Text {
            text: request.prompt,
        });
        content.extend(images.into_iter().map(|data| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:image/jpeg;base64,{}", data),
                detail: "high",
            },
        }));

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                Message::System {
                    content: SYSTEM_INSTRUCTION,
                },
                Message::User { content },
            ],
            max_tokens: MAX_TOKENS,
        };

        debug!(model = %self.model, frames = frames.len(), "Sending frames to OpenAI");

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(BACKEND, self.timeout, e))?;

        let response: ChatResponse = check_status(BACKEND, response)
            .await?
            .json()
            .await
            .map_err(|e| AiError::transport(BACKEND, format!("Invalid response body: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(AiError::EmptyResponse(BACKEND))
    }
}
