//! Per-backend analysis façade.
//!
//! [`VideoProcessor`] turns one backend's calling convention into the common
//! [`AnalysisResult`] contract. The backend itself only has to implement
//! [`ModelBackend::generate`]: submit a prompt with media, return the text.
//! Everything around that call (frame capping, prompting, timeouts, retries,
//! extraction, fallback) lives here and never fails past this boundary.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rdash_media::{mime_type_for, Frame, FrameSampler, SampledVideo};
use rdash_models::{AnalysisResult, BackendKind, SubmissionMode};
use tracing::{info, warn};

use crate::error::{AiError, AiResult};
use crate::extract::{parse_response, ParseOutcome};
use crate::fallback::fallback_segments;
use crate::prompt::PromptBuilder;
use crate::retry::{retry_model_call, RetryPolicy};

/// Media handed to a backend for one call.
#[derive(Debug, Clone)]
pub enum Media<'a> {
    /// The whole local video file
    Video {
        path: &'a Path,
        mime_type: &'static str,
    },
    /// Sampled frames, in chronological order
    Frames(Vec<&'a Frame>),
}

/// One model call.
#[derive(Debug, Clone)]
pub struct ModelRequest<'a> {
    pub prompt: &'a str,
    pub media: Media<'a>,
}

/// A multimodal model API.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Model identifier sent to the API.
    fn model_name(&self) -> &str;

    /// How this backend receives media. Fixed per backend.
    fn submission_mode(&self) -> SubmissionMode;

    /// Backends that retry their own requests are called once per analysis.
    fn retries_internally(&self) -> bool {
        false
    }

    /// Submit a prompt with media and return the model's raw text.
    async fn generate(&self, request: ModelRequest<'_>) -> AiResult<String>;
}

/// How an analysis concluded. Reported through logs and metrics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The model returned the expected structure
    Parsed,
    /// The model returned JSON without segments
    Coerced,
    /// The response was unusable and segments were synthesized
    Fallback,
    /// Nothing to analyze or fall back on
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Parsed => "parsed",
            Outcome::Coerced => "coerced",
            Outcome::Fallback => "fallback",
            Outcome::Failed => "failed",
        }
    }
}

/// Result of [`VideoProcessor::analyze_sampled`].
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub result: AnalysisResult,
    pub outcome: Outcome,
}

impl Analysis {
    fn new(result: AnalysisResult, outcome: Outcome) -> Self {
        Self { result, outcome }
    }
}

/// Orchestrates one backend: capping, prompting, calling, extracting.
pub struct VideoProcessor {
    backend: Arc<dyn ModelBackend>,
    sampler: FrameSampler,
    timeout: Duration,
    retry: RetryPolicy,
}

impl VideoProcessor {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            sampler: FrameSampler::default(),
            timeout: Duration::from_secs(900),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_sampler(mut self, sampler: FrameSampler) -> Self {
        self.sampler = sampler;
        self
    }

    /// Bound on one whole model call, retries included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn submission_mode(&self) -> SubmissionMode {
        self.backend.submission_mode()
    }

    /// Sample the video, then analyze it.
    pub async fn analyze(&self, video_path: &Path, custom_prompt: Option<&str>) -> AnalysisResult {
        let sampled = self
            .sampler
            .for_mode(self.submission_mode())
            .sample(video_path)
            .await;
        self.analyze_sampled(video_path, &sampled, custom_prompt)
            .await
            .result
    }

    /// Analyze a video whose frames have already been sampled.
    pub async fn analyze_sampled(
        &self,
        video_path: &Path,
        sampled: &SampledVideo,
        custom_prompt: Option<&str>,
    ) -> Analysis {
        let kind = self.kind();
        let start = Instant::now();
        let analysis = self.run(video_path, sampled, custom_prompt).await;

        if !analysis.result.is_chronological() {
            warn!(backend = %kind, "Model returned segments out of chronological order");
        }

        info!(
            backend = %kind,
            model = self.model_name(),
            outcome = analysis.outcome.as_str(),
            segments = analysis.result.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Video analysis complete"
        );
        metrics::counter!(
            "rdash_analyses_total",
            "backend" => kind.as_str(),
            "outcome" => analysis.outcome.as_str()
        )
        .increment(1);

        analysis
    }

    async fn run(
        &self,
        video_path: &Path,
        sampled: &SampledVideo,
        custom_prompt: Option<&str>,
    ) -> Analysis {
        let mode = self.submission_mode();
        let prompts = PromptBuilder::new().with_custom_prompt(custom_prompt);

        let (prompt, media, frame_count) = match mode {
            SubmissionMode::Frames { max_images } => {
                let selected = sampled.capped(max_images);
                if selected.is_empty() {
                    warn!(backend = %self.kind(), "No frames to submit");
                    return Analysis::new(AnalysisResult::empty(), Outcome::Failed);
                }
                let timestamps: Vec<f64> = selected.iter().map(|f| f.timestamp).collect();
                let count = selected.len();
                (
                    prompts.build_for_frames(&timestamps),
                    Media::Frames(selected),
                    count,
                )
            }
            SubmissionMode::WholeVideo => (
                prompts.build_for_video(),
                Media::Video {
                    path: video_path,
                    mime_type: mime_type_for(video_path),
                },
                sampled.len(),
            ),
        };

        match self.call_model(&prompt, media).await {
            Ok(text) => match parse_response(&text) {
                ParseOutcome::Parsed(result) => Analysis::new(result, Outcome::Parsed),
                ParseOutcome::Coerced(result) => {
                    warn!(backend = %self.kind(), "Model response has no segments, returning empty result");
                    Analysis::new(result, Outcome::Coerced)
                }
                ParseOutcome::Failed => {
                    warn!(
                        backend = %self.kind(),
                        response_len = text.len(),
                        "Failed to parse model response as JSON, creating default segments"
                    );
                    self.fallback(sampled, frame_count)
                }
            },
            Err(e) => {
                warn!(backend = %self.kind(), "Model call failed: {}", e);
                self.fallback(sampled, frame_count)
            }
        }
    }

    async fn call_model(&self, prompt: &str, media: Media<'_>) -> AiResult<String> {
        let kind = self.kind();
        let start = Instant::now();

        let request = || {
            self.backend.generate(ModelRequest {
                prompt,
                media: media.clone(),
            })
        };
        let call = async {
            if self.backend.retries_internally() {
                request().await
            } else {
                retry_model_call(&self.retry, kind.as_str(), request).await
            }
        };

        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AiError::Timeout(self.timeout.as_secs())),
        };

        metrics::histogram!("rdash_model_call_duration_seconds", "backend" => kind.as_str())
            .record(start.elapsed().as_secs_f64());

        result
    }

    fn fallback(&self, sampled: &SampledVideo, frame_count: usize) -> Analysis {
        if sampled.is_empty() {
            return Analysis::new(AnalysisResult::empty(), Outcome::Failed);
        }
        Analysis::new(
            fallback_segments(sampled.last_timestamp(), frame_count),
            Outcome::Fallback,
        )
    }
}

impl std::fmt::Debug for VideoProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoProcessor")
            .field("backend", &self.kind())
            .field("model", &self.model_name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
