//! Worker HTTP client.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::{debug, warn};
use vprompt_models::{JobSubmission, WorkerHealth};

use crate::config::WorkerClientConfig;
use crate::error::{WorkerClientError, WorkerResult};
use crate::registry::WorkerEndpoint;

/// Client for video processing workers.
#[derive(Clone)]
pub struct WorkerClient {
    http: Client,
    config: WorkerClientConfig,
}

impl WorkerClient {
    /// Create a new worker client.
    pub fn new(config: WorkerClientConfig) -> WorkerResult<Self> {
        let http = Client::builder()
            .timeout(config.submit_timeout)
            .build()
            .map_err(WorkerClientError::Network)?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &WorkerClientConfig {
        &self.config
    }

    /// Ask a worker whether it can take a job.
    ///
    /// Ready iff the worker answers 2xx with `{"status": "ready"}`. Every
    /// failure (status, timeout, connection, body) counts as not ready.
    pub async fn check_ready(&self, endpoint: &WorkerEndpoint) -> bool {
        let url = endpoint.url(&self.config.status_path);

        let response = match self
            .http
            .get(&url)
            .timeout(self.config.health_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(worker = %endpoint, error = %e, "Worker status check error");
                return false;
            }
        };

        if !response.status().is_success() {
            warn!(worker = %endpoint, status = %response.status(), "Worker status check failed");
            return false;
        }

        match response.json::<WorkerHealth>().await {
            Ok(health) => {
                debug!(worker = %endpoint, status = %health.status, "Worker status");
                health.is_ready()
            }
            Err(e) => {
                warn!(worker = %endpoint, error = %e, "Malformed worker status body");
                false
            }
        }
    }

    /// Hand a job to a worker.
    ///
    /// Sends a multipart form with the source `video`, the `config` JSON and
    /// the `response_url` the worker posts its result to.
    pub async fn submit_job(
        &self,
        endpoint: &WorkerEndpoint,
        submission: &JobSubmission,
        video: Vec<u8>,
        video_filename: &str,
    ) -> WorkerResult<()> {
        let url = endpoint.url(&self.config.process_path);
        let config_json = serde_json::to_string(submission)?;

        debug!(worker = %endpoint, task_id = %submission.task_id, bytes = video.len(), "Submitting job");

        let response = self
            .with_retry(|| async {
                let video_part = Part::bytes(video.clone())
                    .file_name(video_filename.to_string())
                    .mime_str("application/octet-stream")?;
                let form = Form::new()
                    .part("video", video_part)
                    .text("config", config_json.clone())
                    .text("response_url", submission.response_url.clone());

                self.http
                    .post(&url)
                    .multipart(form)
                    .send()
                    .await
                    .map_err(WorkerClientError::Network)
            })
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerClientError::Rejected {
                worker: endpoint.id.clone(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> WorkerResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = WorkerResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(250 * 2u64.pow(attempt));
                    warn!(
                        "Worker request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
