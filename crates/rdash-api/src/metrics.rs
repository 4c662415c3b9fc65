//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "rdash_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "rdash_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "rdash_http_requests_in_flight";
    pub const TEMP_FILES_SWEPT_TOTAL: &str = "rdash_temp_files_swept_total";
}

/// Paths reported as-is. Anything else is folded into one label.
const KNOWN_PATHS: [&str; 5] = ["/analyze", "/health", "/ready", "/cleanup", "/metrics"];

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", normalize_path(path).to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record files removed by a stale-file sweep.
pub fn record_temp_files_swept(count: usize) {
    counter!(names::TEMP_FILES_SWEPT_TOTAL).increment(count as u64);
}

fn normalize_path(path: &str) -> &'static str {
    KNOWN_PATHS
        .iter()
        .find(|known| **known == path)
        .copied()
        .unwrap_or("unmatched")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/analyze"), "/analyze");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/wp-admin/setup.php"), "unmatched");
        assert_eq!(normalize_path("/analyze/extra"), "unmatched");
    }
}
