//! Model backend selection.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default image cap for frame-submission backends without an explicit limit.
pub const DEFAULT_MAX_IMAGES: usize = 20;

/// Multimodal model backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Google Gemini (accepts whole video files)
    #[default]
    Gemini,
    /// OpenAI GPT-4 family (image frames only)
    Gpt4,
    /// Anthropic Claude (image frames only)
    Claude,
}

impl BackendKind {
    /// All known backends.
    pub const ALL: [BackendKind; 3] = [BackendKind::Gemini, BackendKind::Gpt4, BackendKind::Claude];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Gemini => "gemini",
            BackendKind::Gpt4 => "gpt4",
            BackendKind::Claude => "claude",
        }
    }

    /// Environment variable holding this backend's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            BackendKind::Gemini => "GEMINI_API_KEY",
            BackendKind::Gpt4 => "OPENAI_API_KEY",
            BackendKind::Claude => "ANTHROPIC_API_KEY",
        }
    }

    /// How this backend receives media. Fixed per backend.
    pub fn submission_mode(&self) -> SubmissionMode {
        match self {
            BackendKind::Gemini => SubmissionMode::WholeVideo,
            BackendKind::Gpt4 => SubmissionMode::Frames { max_images: 10 },
            BackendKind::Claude => SubmissionMode::Frames { max_images: 15 },
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = BackendParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(BackendKind::Gemini),
            "gpt4" | "gpt-4" | "gpt4v" | "openai" => Ok(BackendKind::Gpt4),
            "claude" | "anthropic" => Ok(BackendKind::Claude),
            _ => Err(BackendParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown model backend: {0}")]
pub struct BackendParseError(String);

/// How media is handed to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SubmissionMode {
    /// Raw video bytes, inline or via a file upload API
    WholeVideo,
    /// A capped set of sampled still frames
    Frames { max_images: usize },
}

impl SubmissionMode {
    pub fn uses_frames(&self) -> bool {
        matches!(self, SubmissionMode::Frames { .. })
    }

    /// Image cap, if any.
    pub fn max_images(&self) -> Option<usize> {
        match self {
            SubmissionMode::WholeVideo => None,
            SubmissionMode::Frames { max_images } => Some(*max_images),
        }
    }
}
