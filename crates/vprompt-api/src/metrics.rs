//! Prometheus metrics for the gateway.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::services::NotifyOutcome;

/// Install the Prometheus recorder and return a handle to render it.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vprompt_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vprompt_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vprompt_http_requests_in_flight";

    // Task lifecycle
    pub const TASKS_CREATED_TOTAL: &str = "vprompt_tasks_created_total";
    pub const RESULTS_RECEIVED_TOTAL: &str = "vprompt_results_received_total";
    pub const NOTIFICATIONS_TOTAL: &str = "vprompt_notifications_total";

    pub const RATE_LIMIT_HITS_TOTAL: &str = "vprompt_rate_limit_hits_total";
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_task_created() {
    counter!(names::TASKS_CREATED_TOTAL).increment(1);
}

/// Record a result callback by how it was handled (`accepted`, `duplicate`, ...).
pub fn record_result_received(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::RESULTS_RECEIVED_TOTAL, &labels).increment(1);
}

pub fn record_notification(outcome: NotifyOutcome) {
    let labels = [("outcome", outcome.as_str().to_string())];
    counter!(names::NOTIFICATIONS_TOTAL, &labels).increment(1);
}

pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Collapse task IDs in paths so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let mut out = Vec::new();
    let mut after_id_segment = false;
    for segment in path.split('/') {
        if after_id_segment && !segment.is_empty() {
            out.push(":task_id");
            after_id_segment = false;
            continue;
        }
        after_id_segment = segment == "tasks" || segment == "result";
        out.push(segment);
    }
    out.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}
