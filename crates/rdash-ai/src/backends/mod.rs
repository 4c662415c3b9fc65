//! Model backend implementations.

mod claude;
mod gemini;
mod openai;

pub use claude::ClaudeBackend;
pub use gemini::{GeminiBackend, UploadState};
pub use openai::OpenAiBackend;

use std::time::Duration;

use rdash_media::Frame;
use reqwest::{Client, Response};

use crate::error::{AiError, AiResult};

/// Longest error body kept in error messages.
const MAX_ERROR_BODY: usize = 512;

fn http_client(backend: &'static str, timeout: Duration) -> AiResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AiError::transport(backend, format!("Failed to build HTTP client: {}", e)))
}

/// Map transport errors, keeping timeouts distinguishable.
fn send_error(backend: &'static str, timeout: Duration, err: reqwest::Error) -> AiError {
    if err.is_timeout() {
        AiError::Timeout(timeout.as_secs())
    } else {
        AiError::transport(backend, err)
    }
}

/// Turn a non-success response into [`AiError::Api`].
async fn check_status(backend: &'static str, response: Response) -> AiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|&i| message.is_char_boundary(i))
            .unwrap_or(0);
        message.truncate(cut);
    }

    Err(AiError::Api {
        backend,
        status: status.as_u16(),
        message,
    })
}

/// JPEG base64 payloads for a frame list.
fn encode_frames(frames: &[&Frame]) -> AiResult<Vec<String>> {
    frames
        .iter()
        .map(|frame| frame.to_jpeg_base64().map_err(AiError::from))
        .collect()
}
