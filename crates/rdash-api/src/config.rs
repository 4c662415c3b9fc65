//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

use rdash_media::{DownloadOptions, SamplerConfig};

/// Room left in the request body limit for multipart framing and text fields.
const MULTIPART_SLACK_BYTES: u64 = 1024 * 1024;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Directory for uploaded and downloaded videos
    pub upload_dir: PathBuf,
    /// Max size of an uploaded or downloaded video
    pub max_upload_bytes: u64,
    /// Age after which `/cleanup` removes a temp file
    pub temp_max_age: Duration,
    /// Time allowed for a `video_url` download
    pub download_timeout: Duration,
    /// Seconds between sampled frames
    pub sample_interval_secs: f64,
    /// Max width of sampled frames
    pub frame_width: u32,
    /// Serve Prometheus metrics at `/metrics`
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let sampler = SamplerConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origins: vec!["http://localhost:3000".to_string()],
            upload_dir: PathBuf::from("temp_videos"),
            max_upload_bytes: 100 * 1024 * 1024, // 100MB
            temp_max_age: Duration::from_secs(24 * 60 * 60),
            download_timeout: Duration::from_secs(120),
            sample_interval_secs: sampler.interval_secs,
            frame_width: sampler.max_width,
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config using an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        Self {
            host: lookup("API_HOST").unwrap_or(defaults.host),
            port: lookup("API_PORT")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: lookup("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_upload_bytes: parse("MAX_UPLOAD_MB")
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.max_upload_bytes),
            temp_max_age: parse("TEMP_MAX_AGE_HOURS")
                .map(|h| Duration::from_secs(h * 60 * 60))
                .unwrap_or(defaults.temp_max_age),
            download_timeout: parse("DOWNLOAD_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_timeout),
            sample_interval_secs: lookup("SAMPLE_INTERVAL_SECS")
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|i| i.is_finite() && *i > 0.0)
                .unwrap_or(defaults.sample_interval_secs),
            frame_width: lookup("FRAME_MAX_WIDTH")
                .and_then(|s| s.trim().parse().ok())
                .filter(|w| *w > 0)
                .unwrap_or(defaults.frame_width),
            metrics_enabled: lookup("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
        }
    }

    /// Request body limit: one video plus multipart overhead.
    pub fn max_body_size(&self) -> usize {
        usize::try_from(self.max_upload_bytes.saturating_add(MULTIPART_SLACK_BYTES))
            .unwrap_or(usize::MAX)
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            interval_secs: self.sample_interval_secs,
            max_width: self.frame_width,
            ..SamplerConfig::default()
        }
    }

    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            max_bytes: self.max_upload_bytes,
            timeout: self.download_timeout,
        }
    }
}
