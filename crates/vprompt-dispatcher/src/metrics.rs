//! Prometheus metrics for the dispatcher.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::dispatcher::TickOutcome;

/// Metric names as constants for consistency.
pub mod names {
    pub const DISPATCH_TICKS_TOTAL: &str = "vprompt_dispatch_ticks_total";
    pub const DISPATCH_DURATION_SECONDS: &str = "vprompt_dispatch_duration_seconds";
    pub const TASKS_DISPATCHED_TOTAL: &str = "vprompt_tasks_dispatched_total";
    pub const FORWARD_FAILURES_TOTAL: &str = "vprompt_forward_failures_total";
    pub const DISPATCH_STALLS_TOTAL: &str = "vprompt_dispatch_stalls_total";
    pub const TASKS_RECLAIMED_TOTAL: &str = "vprompt_tasks_reclaimed_total";
    pub const TASKS_EXPIRED_TOTAL: &str = "vprompt_tasks_expired_total";
    pub const TASKS_DROPPED_TOTAL: &str = "vprompt_tasks_dropped_total";
}

/// Serve `/metrics` on the given port.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Record the outcome of one dispatch tick.
pub fn record_tick(outcome: &TickOutcome, duration_secs: f64) {
    let labels = [("outcome", outcome.as_str().to_string())];
    counter!(names::DISPATCH_TICKS_TOTAL, &labels).increment(1);

    match outcome {
        TickOutcome::Idle => return,
        TickOutcome::Dispatched { worker, .. } => {
            let labels = [("worker", worker.clone())];
            counter!(names::TASKS_DISPATCHED_TOTAL, &labels).increment(1);
        }
        TickOutcome::ForwardFailed { worker, .. } => {
            let labels = [("worker", worker.clone())];
            counter!(names::FORWARD_FAILURES_TOTAL, &labels).increment(1);
        }
        TickOutcome::Stalled { .. } => {
            counter!(names::DISPATCH_STALLS_TOTAL).increment(1);
        }
        TickOutcome::Dropped { .. } => {
            counter!(names::TASKS_DROPPED_TOTAL).increment(1);
        }
        TickOutcome::Lost { .. } => {}
    }
    histogram!(names::DISPATCH_DURATION_SECONDS).record(duration_secs);
}

/// Record tasks returned to WAITING by the reclaim sweep.
pub fn record_reclaimed(count: usize) {
    counter!(names::TASKS_RECLAIMED_TOTAL).increment(count as u64);
}

/// Record tasks deleted by the retention sweep.
pub fn record_expired(count: usize) {
    counter!(names::TASKS_EXPIRED_TOTAL).increment(count as u64);
}
