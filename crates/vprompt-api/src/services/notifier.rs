//! Best-effort owner notification.

use std::time::Duration;

use tracing::{info, warn};
use vprompt_models::{is_http_target, CompletionNotice};

use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// How a notification attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered,
    /// Target is not an http(s) URL (e.g. a device handle)
    Skipped,
    Failed,
}

impl NotifyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyOutcome::Delivered => "delivered",
            NotifyOutcome::Skipped => "skipped",
            NotifyOutcome::Failed => "failed",
        }
    }
}

/// Posts completion notices to owner targets.
///
/// Failures are logged and reported as [`NotifyOutcome::Failed`], never
/// returned as errors.
#[derive(Clone)]
pub struct Notifier {
    http: reqwest::Client,
    timeout: Duration,
}

impl Notifier {
    pub fn new(timeout: Duration) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::internal(format!("Failed to build notifier client: {}", e)))?;
        Ok(Self { http, timeout })
    }

    pub async fn notify(&self, target: &str, notice: &CompletionNotice) -> NotifyOutcome {
        let outcome = self.send(target, notice).await;
        metrics::record_notification(outcome);
        outcome
    }

    async fn send(&self, target: &str, notice: &CompletionNotice) -> NotifyOutcome {
        if !is_http_target(target) {
            info!(task_id = %notice.task_id, "Notification target is not an HTTP URL, skipping");
            return NotifyOutcome::Skipped;
        }

        let response = match self.http.post(target).json(notice).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    task_id = %notice.task_id,
                    timeout_secs = self.timeout.as_secs(),
                    "Notification request failed: {}",
                    e
                );
                return NotifyOutcome::Failed;
            }
        };

        if response.status().is_success() {
            info!(task_id = %notice.task_id, "Owner notified");
            NotifyOutcome::Delivered
        } else {
            warn!(
                task_id = %notice.task_id,
                status = response.status().as_u16(),
                "Notification target rejected the notice"
            );
            NotifyOutcome::Failed
        }
    }
}
