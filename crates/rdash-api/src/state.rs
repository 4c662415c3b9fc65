//! Application state.

use std::sync::Arc;

use rdash_ai::{AiConfig, AiResult, ProcessorRegistry};
use rdash_media::FrameSampler;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub registry: Arc<ProcessorRegistry>,
    pub sampler: FrameSampler,
}

impl AppState {
    /// Create new application state.
    ///
    /// Fails when the default backend cannot be built, so the server never
    /// starts without a usable model.
    pub fn new(config: ApiConfig, ai_config: &AiConfig) -> AiResult<Self> {
        let sampler = FrameSampler::new(config.sampler_config());
        let registry = ProcessorRegistry::from_config(ai_config, sampler.clone())?;
        Ok(Self::with_registry(config, registry))
    }

    /// State around an already built registry.
    pub fn with_registry(config: ApiConfig, registry: ProcessorRegistry) -> Self {
        let sampler = FrameSampler::new(config.sampler_config());
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            sampler,
        }
    }
}
