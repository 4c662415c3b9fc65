//! Multimodal model clients for robot activity analysis.
//!
//! This crate provides:
//! - Prompt construction with a fixed output schema
//! - Extraction of the result JSON from free-form model output
//! - A synthetic fallback segmentation for unparseable responses
//! - The per-backend [`VideoProcessor`] façade, which never fails
//! - Gemini, OpenAI and Anthropic backends behind [`ModelBackend`]
//! - A configuration-driven [`ProcessorRegistry`]

pub mod backends;
pub mod config;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod processor;
pub mod prompt;
pub mod registry;
pub mod retry;

pub use backends::{ClaudeBackend, GeminiBackend, OpenAiBackend, UploadState};
pub use config::{AiConfig, BackendConfig, UploadConfig};
pub use error::{AiError, AiResult};
pub use extract::{extract_json, parse_response, Extracted, ParseOutcome};
pub use fallback::fallback_segments;
pub use processor::{Analysis, Media, ModelBackend, ModelRequest, Outcome, VideoProcessor};
pub use prompt::{PromptBuilder, SYSTEM_INSTRUCTION};
pub use registry::ProcessorRegistry;
pub use retry::RetryPolicy;
