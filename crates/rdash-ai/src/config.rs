//! Model backend configuration.
//!
//! Built once at startup and handed to the registry. Each backend reads
//! `<PREFIX>_API_KEY`, `<PREFIX>_MODEL`, `<PREFIX>_BASE_URL` and
//! `<PREFIX>_MAX_IMAGES`, where the prefix is `GEMINI`, `OPENAI` or `ANTHROPIC`.

use std::time::Duration;

use rdash_models::{BackendKind, DEFAULT_MAX_IMAGES};

use crate::error::{AiError, AiResult};

/// Settings for one model backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// `None` when the key is unset or blank
    pub api_key: Option<String>,
    pub model: String,
    /// API origin, overridable for self-hosted gateways and tests
    pub base_url: String,
    /// Image cap for frame submission
    pub max_images: usize,
    /// Timeout for a single HTTP request
    pub request_timeout: Duration,
}

impl BackendConfig {
    pub fn defaults(kind: BackendKind) -> Self {
        let (model, base_url) = match kind {
            BackendKind::Gemini => (
                "gemini-1.5-pro-latest",
                "https://generativelanguage.googleapis.com",
            ),
            BackendKind::Gpt4 => ("gpt-4o", "https://api.openai.com"),
            BackendKind::Claude => ("claude-3-opus-20240229", "https://api.anthropic.com"),
        };

        Self {
            kind,
            api_key: None,
            model: model.to_string(),
            base_url: base_url.to_string(),
            max_images: kind
                .submission_mode()
                .max_images()
                .unwrap_or(DEFAULT_MAX_IMAGES),
            request_timeout: Duration::from_secs(600),
        }
    }

    /// Defaults with an API key, as used by tests and embedders.
    pub fn with_key(kind: BackendKind, api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::defaults(kind)
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The API key, or the error that refuses to build this backend.
    pub fn require_key(&self) -> AiResult<&str> {
        self.api_key
            .as_deref()
            .ok_or(AiError::MissingApiKey(self.kind.api_key_var()))
    }

    fn env_prefix(kind: BackendKind) -> &'static str {
        match kind {
            BackendKind::Gemini => "GEMINI",
            BackendKind::Gpt4 => "OPENAI",
            BackendKind::Claude => "ANTHROPIC",
        }
    }

    fn from_lookup(kind: BackendKind, lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let prefix = Self::env_prefix(kind);
        let defaults = Self::defaults(kind);
        let var = |suffix: &str| {
            lookup(&format!("{prefix}_{suffix}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            kind,
            api_key: lookup(kind.api_key_var())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            model: var("MODEL").unwrap_or(defaults.model),
            base_url: var("BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            max_images: var("MAX_IMAGES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_images),
            request_timeout: lookup("AI_REQUEST_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }
}

/// Gemini large-file upload settings.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Videos smaller than this are sent inline
    pub inline_limit_bytes: u64,
    /// Delay between file state polls
    pub poll_interval: Duration,
    /// Give up waiting for the file to become active after this long
    pub poll_max_wait: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            inline_limit_bytes: 20 * 1024 * 1024,
            poll_interval: Duration::from_secs(2),
            poll_max_wait: Duration::from_secs(300),
        }
    }
}

/// Configuration for every model backend.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub gemini: BackendConfig,
    pub openai: BackendConfig,
    pub anthropic: BackendConfig,
    pub upload: UploadConfig,
    /// Backend used when a request names none, or one that is unavailable
    pub default_backend: BackendKind,
    /// Bound on one whole analysis call, including uploads and polling
    pub analysis_timeout: Duration,
    /// Extra attempts for retryable model errors
    pub max_retries: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            gemini: BackendConfig::defaults(BackendKind::Gemini),
            openai: BackendConfig::defaults(BackendKind::Gpt4),
            anthropic: BackendConfig::defaults(BackendKind::Claude),
            upload: UploadConfig::default(),
            default_backend: BackendKind::Gemini,
            analysis_timeout: Duration::from_secs(900),
            max_retries: 1,
        }
    }
}

impl AiConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let upload_defaults = UploadConfig::default();
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            gemini: BackendConfig::from_lookup(BackendKind::Gemini, &lookup),
            openai: BackendConfig::from_lookup(BackendKind::Gpt4, &lookup),
            anthropic: BackendConfig::from_lookup(BackendKind::Claude, &lookup),
            upload: UploadConfig {
                inline_limit_bytes: lookup("GEMINI_INLINE_LIMIT_MB")
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .map(|mb| mb * 1024 * 1024)
                    .unwrap_or(upload_defaults.inline_limit_bytes),
                poll_interval: secs("GEMINI_POLL_INTERVAL_SECS", upload_defaults.poll_interval),
                poll_max_wait: secs("GEMINI_POLL_MAX_WAIT_SECS", upload_defaults.poll_max_wait),
            },
            default_backend: defaults.default_backend,
            analysis_timeout: secs("AI_ANALYSIS_TIMEOUT_SECS", defaults.analysis_timeout),
            max_retries: lookup("AI_MAX_RETRIES")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }

    pub fn backend(&self, kind: BackendKind) -> &BackendConfig {
        match kind {
            BackendKind::Gemini => &self.gemini,
            BackendKind::Gpt4 => &self.openai,
            BackendKind::Claude => &self.anthropic,
        }
    }

    /// Refuse configurations whose default backend cannot be built.
    pub fn validate(&self) -> AiResult<()> {
        self.backend(self.default_backend).require_key()?;

        for kind in BackendKind::ALL {
            let backend = self.backend(kind);
            if backend.model.is_empty() {
                return Err(AiError::config(format!("{} model name is empty", kind)));
            }
            if !backend.base_url.starts_with("http://") && !backend.base_url.starts_with("https://") {
                return Err(AiError::config(format!(
                    "{} base URL must be http(s): {}",
                    kind, backend.base_url
                )));
            }
        }

        if self.upload.poll_interval.is_zero() {
            return Err(AiError::config("GEMINI_POLL_INTERVAL_SECS must be positive"));
        }

        Ok(())
    }
}
