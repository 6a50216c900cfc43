//! Dispatch loop.

use std::path::Path;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};
use vprompt_models::{JobSubmission, Task, TaskId};
use vprompt_storage::BlobStore;
use vprompt_store::{SharedStore, TaskStore};
use vprompt_worker_client::{WorkerClient, WorkerEndpoint, WorkerRegistry};

use crate::config::DispatcherConfig;
use crate::error::DispatchResult;
use crate::logging::TaskLogger;
use crate::metrics;

/// What one dispatch tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No task was waiting
    Idle,
    /// A task was waiting but no worker was ready; it stays WAITING
    Stalled { task_id: TaskId },
    /// The task was assigned and handed to the worker
    Dispatched { task_id: TaskId, worker: String },
    /// The task was assigned but the handover failed; it stays IN_PROGRESS
    ForwardFailed { task_id: TaskId, worker: String },
    /// Another dispatcher claimed the task first
    Lost { task_id: TaskId },
    /// The task's stored inputs are gone; it was removed without dispatch
    Dropped { task_id: TaskId },
}

impl TickOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickOutcome::Idle => "idle",
            TickOutcome::Stalled { .. } => "stalled",
            TickOutcome::Dispatched { .. } => "dispatched",
            TickOutcome::ForwardFailed { .. } => "forward_failed",
            TickOutcome::Lost { .. } => "lost",
            TickOutcome::Dropped { .. } => "dropped",
        }
    }
}

/// Single sequential loop matching waiting tasks with ready workers.
pub struct Dispatcher {
    store: SharedStore,
    blobs: BlobStore,
    registry: WorkerRegistry,
    client: WorkerClient,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        store: SharedStore,
        blobs: BlobStore,
        registry: WorkerRegistry,
        client: WorkerClient,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            registry,
            client,
            config,
        }
    }

    /// Run until the shutdown flag flips to true.
    ///
    /// A tick in flight always completes before shutdown is observed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> DispatchResult<()> {
        info!(
            "Starting dispatcher with {} workers (poll interval: {:?})",
            self.registry.len(),
            self.config.poll_interval
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Shutdown signal received, stopping dispatcher");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    let started = Instant::now();
                    match self.tick().await {
                        Ok(outcome) => {
                            metrics::record_tick(&outcome, started.elapsed().as_secs_f64());
                        }
                        Err(e) => error!("Dispatch tick failed: {}", e),
                    }
                }
            }
        }

        info!("Dispatcher stopped");
        Ok(())
    }

    /// One pass: oldest waiting task, first ready worker, assign, forward.
    pub async fn tick(&self) -> DispatchResult<TickOutcome> {
        let Some(task) = self.store.peek_oldest_waiting().await? else {
            debug!("No waiting task");
            return Ok(TickOutcome::Idle);
        };

        let logger = TaskLogger::new(&task.task_id, "dispatch");

        // Inputs are checked before the claim; a task without them never completes
        if let Some(missing) = self.missing_input(&task).await {
            logger.log_error(&format!("stored input {} is missing, dropping task", missing));
            self.store.delete(&task.task_id).await?;
            if let Err(e) = self.blobs.remove_task_dir(&task.task_id).await {
                warn!(task_id = %task.task_id, "Failed to remove blobs of dropped task: {}", e);
            }
            return Ok(TickOutcome::Dropped {
                task_id: task.task_id,
            });
        }

        for endpoint in self.registry.list_candidates() {
            if !self.client.check_ready(endpoint).await {
                continue;
            }

            if !self.store.mark_in_progress(&task.task_id, &endpoint.id).await? {
                logger.log_warning("claimed by another dispatcher");
                return Ok(TickOutcome::Lost {
                    task_id: task.task_id,
                });
            }
            logger.log_start(&format!("assigned to {}", endpoint));

            let forwarded = self
                .forward(&task, endpoint, &logger)
                .instrument(logger.create_span())
                .await;
            return Ok(match forwarded {
                Ok(()) => {
                    logger.log_completion(&format!("handed to {}", endpoint));
                    TickOutcome::Dispatched {
                        task_id: task.task_id,
                        worker: endpoint.id.clone(),
                    }
                }
                Err(e) => {
                    logger.log_error(&format!("forwarding to {} failed: {}", endpoint, e));
                    TickOutcome::ForwardFailed {
                        task_id: task.task_id,
                        worker: endpoint.id.clone(),
                    }
                }
            });
        }

        logger.log_warning("no ready worker");
        Ok(TickOutcome::Stalled {
            task_id: task.task_id,
        })
    }

    async fn missing_input<'a>(&self, task: &'a Task) -> Option<&'a str> {
        for path in [&task.source_video_path, &task.config_path] {
            if !self.blobs.exists(path).await {
                return Some(path.as_str());
            }
        }
        None
    }

    async fn forward(
        &self,
        task: &Task,
        endpoint: &WorkerEndpoint,
        logger: &TaskLogger,
    ) -> DispatchResult<()> {
        let video = self.blobs.read(&task.source_video_path).await?;
        let animate_config = self.blobs.read_config(&task.config_path).await?;
        logger.log_progress(&format!("loaded {} bytes of source video", video.len()));

        let filename = Path::new(&task.source_video_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video.mp4")
            .to_string();

        let submission = JobSubmission::new(
            task.task_id.clone(),
            task.objects.clone(),
            animate_config,
            self.config.response_url.clone(),
        );

        self.client
            .submit_job(endpoint, &submission, video, &filename)
            .await?;
        Ok(())
    }
}
