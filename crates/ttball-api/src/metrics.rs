//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use regex::Regex;

/// Install the Prometheus recorder and return the render handle.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "ttball_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "ttball_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "ttball_http_requests_in_flight";

    // Ingest metrics
    pub const INGESTS_TOTAL: &str = "ttball_ingests_total";
    pub const FRAMES_EXTRACTED_TOTAL: &str = "ttball_frames_extracted_total";
    pub const DOWNLOAD_DURATION_SECONDS: &str = "ttball_download_duration_seconds";

    // Labeling
    pub const LABELS_SAVED_TOTAL: &str = "ttball_labels_saved_total";

    // Analysis metrics
    pub const ANALYSES_TOTAL: &str = "ttball_analyses_total";
    pub const ANALYSIS_DURATION_SECONDS: &str = "ttball_analysis_duration_seconds";
    pub const BOUNCES_DETECTED_TOTAL: &str = "ttball_bounces_detected_total";

    // Admin
    pub const CLEANUP_DELETED_TOTAL: &str = "ttball_cleanup_deleted_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a finished ingest (`app` is `labeler` or `analyzer`).
pub fn record_ingest(app: &str, source: &str, frames: u32) {
    let labels = [("app", app.to_string()), ("source", source.to_string())];
    counter!(names::INGESTS_TOTAL, &labels).increment(1);
    if frames > 0 {
        counter!(names::FRAMES_EXTRACTED_TOTAL).increment(frames as u64);
    }
}

/// Record yt-dlp download duration.
pub fn record_download_duration(duration_secs: f64) {
    histogram!(names::DOWNLOAD_DURATION_SECONDS).record(duration_secs);
}

/// Record a saved label (`kind` is `ball` or `negative`).
pub fn record_label_saved(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::LABELS_SAVED_TOTAL, &labels).increment(1);
}

/// Record an analysis run.
pub fn record_analysis(status: &str, duration_secs: f64, bounces: usize) {
    let labels = [("status", status.to_string())];
    counter!(names::ANALYSES_TOTAL, &labels).increment(1);
    histogram!(names::ANALYSIS_DURATION_SECONDS, &labels).record(duration_secs);
    if bounces > 0 {
        counter!(names::BOUNCES_DETECTED_TOTAL).increment(bounces as u64);
    }
}

/// Record entries removed by the admin cleanup.
pub fn record_cleanup(deleted: usize) {
    counter!(names::CLEANUP_DELETED_TOTAL).increment(deleted as u64);
}

static ENTITY_SEGMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(task|analysis)/[^/]+/[^/]+").expect("valid regex")
});

static TRAILING_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(frame|label|download)/[^/]+$").expect("valid regex")
});

/// Collapse ids and file names so path labels stay low-cardinality.
fn sanitize_path(path: &str) -> String {
    let path = ENTITY_SEGMENTS.replace_all(path, "/$1/:day/:name");
    let path = TRAILING_PARAM.replace(&path, "/$1/:param");
    path.into_owned()
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
