//! Backend selection.

use std::collections::HashMap;
use std::sync::Arc;

use rdash_media::FrameSampler;
use rdash_models::BackendKind;
use tracing::{info, warn};

use crate::backends::{ClaudeBackend, GeminiBackend, OpenAiBackend};
use crate::config::AiConfig;
use crate::error::{AiError, AiResult};
use crate::processor::{ModelBackend, VideoProcessor};
use crate::retry::RetryPolicy;

/// Processors keyed by backend, with a default that is always present.
#[derive(Debug)]
pub struct ProcessorRegistry {
    default: Arc<VideoProcessor>,
    processors: HashMap<BackendKind, Arc<VideoProcessor>>,
}

impl ProcessorRegistry {
    /// A registry holding only the default processor.
    pub fn new(default: VideoProcessor) -> Self {
        let default = Arc::new(default);
        let mut processors = HashMap::new();
        processors.insert(default.kind(), default.clone());
        Self {
            default,
            processors,
        }
    }

    /// Build every backend the configuration allows.
    ///
    /// Fails when the default backend has no key. Other backends are
    /// registered only when their key is present.
    pub fn from_config(config: &AiConfig, sampler: FrameSampler) -> AiResult<Self> {
        config.validate()?;

        let retry = RetryPolicy::default().with_max_retries(config.max_retries);
        let make = |backend: Arc<dyn ModelBackend>| {
            VideoProcessor::new(backend)
                .with_sampler(sampler.clone())
                .with_timeout(config.analysis_timeout)
                .with_retry(retry.clone())
        };

        let build = |kind: BackendKind| -> AiResult<Arc<dyn ModelBackend>> {
            let backend_config = config.backend(kind);
            let backend: Arc<dyn ModelBackend> = match kind {
                BackendKind::Gemini => Arc::new(
                    GeminiBackend::new(backend_config, &config.upload)?.with_retry(retry.clone()),
                ),
                BackendKind::Gpt4 => Arc::new(OpenAiBackend::new(backend_config)?),
                BackendKind::Claude => Arc::new(ClaudeBackend::new(backend_config)?),
            };
            Ok(backend)
        };

        let mut registry = Self::new(make(build(config.default_backend)?));

        for kind in BackendKind::ALL {
            if kind == config.default_backend {
                continue;
            }
            if !config.backend(kind).has_key() {
                info!(backend = %kind, "No API key configured, backend disabled");
                continue;
            }
            registry.register(make(build(kind)?));
        }

        info!(
            default = %registry.default_kind(),
            available = ?registry.available(),
            "Model backends registered"
        );

        Ok(registry)
    }

    /// Add or replace a processor.
    pub fn register(&mut self, processor: VideoProcessor) {
        let processor = Arc::new(processor);
        if processor.kind() == self.default.kind() {
            self.default = processor.clone();
        }
        self.processors.insert(processor.kind(), processor);
    }

    pub fn default_kind(&self) -> BackendKind {
        self.default.kind()
    }

    /// Registered backends, in declaration order.
    pub fn available(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|kind| self.processors.contains_key(kind))
            .collect()
    }

    /// Processor for a requested backend name.
    ///
    /// Missing, unknown or unregistered names resolve to the default.
    pub fn resolve(&self, requested: Option<&str>) -> Arc<VideoProcessor> {
        let requested = requested.map(str::trim).filter(|s| !s.is_empty());

        let default_kind = self.default_kind();
        match requested.map(str::parse::<BackendKind>) {
            None => {}
            Some(Ok(kind)) => match self.processors.get(&kind) {
                Some(processor) => return processor.clone(),
                None => warn!(requested = %kind, default = %default_kind, "Backend not available, using default"),
            },
            Some(Err(e)) => warn!(default = %default_kind, "{}, using default", e),
        }

        self.default.clone()
    }
}

impl TryFrom<&AiConfig> for ProcessorRegistry {
    type Error = AiError;

    fn try_from(config: &AiConfig) -> AiResult<Self> {
        Self::from_config(config, FrameSampler::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> AiConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AiConfig::from_lookup(move |key| env.get(key).cloned())
    }

    #[test]
    fn test_missing_default_key_refuses_to_build() {
        let err = ProcessorRegistry::try_from(&config(&[("OPENAI_API_KEY", "sk")])).unwrap_err();
        assert!(matches!(err, AiError::MissingApiKey("GEMINI_API_KEY")));
    }

    #[test]
    fn test_only_keyed_backends_registered() {
        let registry =
            ProcessorRegistry::try_from(&config(&[("GEMINI_API_KEY", "g"), ("ANTHROPIC_API_KEY", "a")]))
                .unwrap();

        assert_eq!(registry.default_kind(), BackendKind::Gemini);
        assert_eq!(
            registry.available(),
            vec![BackendKind::Gemini, BackendKind::Claude]
        );
        assert!(!registry.available().contains(&BackendKind::Gpt4));
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let registry =
            ProcessorRegistry::try_from(&config(&[("GEMINI_API_KEY", "g"), ("OPENAI_API_KEY", "o")]))
                .unwrap();

        assert_eq!(registry.resolve(None).kind(), BackendKind::Gemini);
        assert_eq!(registry.resolve(Some("")).kind(), BackendKind::Gemini);
        assert_eq!(registry.resolve(Some("gpt4")).kind(), BackendKind::Gpt4);
        assert_eq!(registry.resolve(Some("OpenAI")).kind(), BackendKind::Gpt4);
        // Known but not configured
        assert_eq!(registry.resolve(Some("claude")).kind(), BackendKind::Gemini);
        // Unknown
        assert_eq!(registry.resolve(Some("llava")).kind(), BackendKind::Gemini);
    }

    #[test]
    fn test_configured_caps_reach_processors() {
        let registry = ProcessorRegistry::try_from(&config(&[
            ("GEMINI_API_KEY", "g"),
            ("ANTHROPIC_API_KEY", "a"),
            ("ANTHROPIC_MAX_IMAGES", "4"),
        ]))
        .unwrap();

        let claude = registry.resolve(Some("claude"));
        assert_eq!(claude.submission_mode().max_images(), Some(4));
        assert!(!registry.resolve(None).submission_mode().uses_frames());
    }
}
