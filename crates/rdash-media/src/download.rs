//! Streaming download of remote videos over HTTP(S).

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::error::{MediaError, MediaResult};

/// Limits applied to a single download.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Maximum accepted body size in bytes
    pub max_bytes: u64,
    /// Total time allowed for the request and body
    pub timeout: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_bytes: 100 * 1024 * 1024,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Whether the URL is an absolute `http://` or `https://` URL.
pub fn is_supported_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
        .unwrap_or(false)
}

/// Stream `url` into `dest`, enforcing the size limit as bytes arrive.
///
/// A partially written file is left in place; the caller owns `dest`.
pub async fn download_video(
    url: &str,
    dest: impl AsRef<Path>,
    options: &DownloadOptions,
) -> MediaResult<u64> {
    let dest = dest.as_ref();

    if !is_supported_url(url) {
        return Err(MediaError::InvalidUrl(url.to_string()));
    }

    let client = Client::builder()
        .timeout(options.timeout)
        .build()
        .map_err(|e| MediaError::download_failed(format!("Failed to build HTTP client: {}", e)))?;

    debug!(url, dest = %dest.display(), "Downloading video");

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            MediaError::Timeout(options.timeout.as_secs())
        } else {
            MediaError::download_failed(e.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(MediaError::download_failed(format!("HTTP {}", status)));
    }

    if let Some(len) = response.content_length() {
        if len > options.max_bytes {
            return Err(MediaError::TooLarge {
                limit: options.max_bytes,
            });
        }
    }

    let mut file = File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            if e.is_timeout() {
                MediaError::Timeout(options.timeout.as_secs())
            } else {
                MediaError::download_failed(e.to_string())
            }
        })?;

        written += chunk.len() as u64;
        if written > options.max_bytes {
            return Err(MediaError::TooLarge {
                limit: options.max_bytes,
            });
        }

        file.write_all(&chunk).await?;
    }

    file.flush().await?;

    if written == 0 {
        return Err(MediaError::download_failed("Empty response body"));
    }

    info!(url, bytes = written, "Downloaded video");
    Ok(written)
}
