//! Dispatch loop tests against mock workers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::watch;
use vprompt_dispatcher::{retention, Dispatcher, DispatcherConfig, ReclaimSweep, TickOutcome};
use vprompt_models::{BBox, NewTask, ObjectMap, ObjectPrompt, OwnerToken, TaskId, TaskStatus};
use vprompt_storage::BlobStore;
use vprompt_store::{PartitionedTaskStore, SharedStore, SqliteTaskStore, TaskStore};
use vprompt_worker_client::{WorkerClient, WorkerClientConfig, WorkerRegistry};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    _dir: TempDir,
    store: SharedStore,
    blobs: BlobStore,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let blobs = BlobStore::new(dir.path());
        Self {
            _dir: dir,
            store: Arc::new(PartitionedTaskStore::new()),
            blobs,
        }
    }

    async fn submit(&self) -> TaskId {
        let task_id = TaskId::new();
        let source = self
            .blobs
            .write_source(&task_id, Some("clip.mp4"), b"source-frames")
            .await
            .unwrap();
        let config = self
            .blobs
            .write_config(&task_id, &serde_json::json!({"steps": 12}))
            .await
            .unwrap();

        let mut objects = ObjectMap::new();
        objects.insert("Object_1".into(), ObjectPrompt::new("a cat", BBox::new(0, 0, 10, 10)));
        let new_task = NewTask::new(
            objects,
            source.to_string_lossy(),
            config.to_string_lossy(),
            OwnerToken::from("owner"),
        )
        .with_id(task_id);
        self.store.create(new_task).await.unwrap()
    }

    fn dispatcher(&self, workers: &[&MockServer]) -> Dispatcher {
        let entries: Vec<String> = workers.iter().map(|w| w.uri()).collect();
        let registry = WorkerRegistry::from_entries(&entries, 5000).unwrap();
        let client = WorkerClient::new(WorkerClientConfig {
            health_timeout: Duration::from_millis(300),
            max_retries: 0,
            ..Default::default()
        })
        .unwrap();
        let config = DispatcherConfig {
            poll_interval: Duration::from_millis(20),
            response_url: "http://gateway/process_video_result".into(),
            ..Default::default()
        };
        Dispatcher::new(self.store.clone(), self.blobs.clone(), registry, client, config)
    }
}

async fn worker(status: &str, accepts: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get_worker_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": status})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/process_video"))
        .respond_with(ResponseTemplate::new(200))
        .expect(accepts)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_idle_without_tasks() {
    let harness = Harness::new();
    let worker = worker("ready", 0).await;
    let outcome = harness.dispatcher(&[&worker]).tick().await.unwrap();
    assert_eq!(outcome, TickOutcome::Idle);
}

#[tokio::test]
async fn test_skips_unready_worker() {
    let harness = Harness::new();
    let busy = worker("busy", 0).await;
    let ready = worker("ready", 1).await;
    let task_id = harness.submit().await;

    let outcome = harness.dispatcher(&[&busy, &ready]).tick().await.unwrap();
    assert_eq!(
        outcome,
        TickOutcome::Dispatched {
            task_id: task_id.clone(),
            worker: ready.uri(),
        }
    );

    let task = harness.store.get(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.assigned_worker, Some(ready.uri()));
}

#[tokio::test]
async fn test_dispatches_oldest_first_to_first_ready() {
    let harness = Harness::new();
    let first = worker("ready", 2).await;
    let second = worker("ready", 0).await;
    let older = harness.submit().await;
    let newer = harness.submit().await;

    let dispatcher = harness.dispatcher(&[&first, &second]);
    match dispatcher.tick().await.unwrap() {
        TickOutcome::Dispatched { task_id, .. } => assert_eq!(task_id, older),
        other => panic!("unexpected outcome: {other:?}"),
    }
    match dispatcher.tick().await.unwrap() {
        TickOutcome::Dispatched { task_id, .. } => assert_eq!(task_id, newer),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(dispatcher.tick().await.unwrap(), TickOutcome::Idle);
}

#[tokio::test]
async fn test_forwards_video_and_config() {
    let harness = Harness::new();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get_worker_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ready"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/process_video"))
        .and(body_string_contains("source-frames"))
        .and(body_string_contains(r#""animate_config":"{\"steps\":12}""#))
        .and(body_string_contains("\"response_url\":\"http://gateway/process_video_result\""))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    harness.submit().await;
    let outcome = harness.dispatcher(&[&server]).tick().await.unwrap();
    assert!(matches!(outcome, TickOutcome::Dispatched { .. }));
}

#[tokio::test]
async fn test_stalls_when_no_worker_ready() {
    let harness = Harness::new();
    let busy = worker("busy", 0).await;
    let task_id = harness.submit().await;

    let outcome = harness.dispatcher(&[&busy]).tick().await.unwrap();
    assert_eq!(outcome, TickOutcome::Stalled { task_id: task_id.clone() });

    let task = harness.store.get(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Waiting);
    assert!(task.assigned_worker.is_none());
}

#[tokio::test]
async fn test_forward_failure_keeps_task_in_progress() {
    let harness = Harness::new();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get_worker_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ready"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/process_video"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let task_id = harness.submit().await;
    let outcome = harness.dispatcher(&[&server]).tick().await.unwrap();
    assert_eq!(
        outcome,
        TickOutcome::ForwardFailed {
            task_id: task_id.clone(),
            worker: server.uri(),
        }
    );
    let task = harness.store.get(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn test_task_with_missing_source_is_dropped_before_claim() {
    let harness = Harness::new();
    let ready = worker("ready", 0).await;
    let task_id = harness.submit().await;
    let task = harness.store.get(&task_id).await.unwrap().unwrap();
    std::fs::remove_file(&task.source_video_path).unwrap();

    let dispatcher = harness.dispatcher(&[&ready]);
    assert_eq!(
        dispatcher.tick().await.unwrap(),
        TickOutcome::Dropped { task_id: task_id.clone() }
    );
    assert!(harness.store.get(&task_id).await.unwrap().is_none());
    assert!(!harness.blobs.task_dir(&task_id).unwrap().exists());

    // The queue moves on instead of retrying the broken task
    let next = harness.submit().await;
    let ready_next = worker("ready", 1).await;
    match harness.dispatcher(&[&ready_next]).tick().await.unwrap() {
        TickOutcome::Dispatched { task_id, .. } => assert_eq!(task_id, next),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_reclaim_returns_expired_lease() {
    let harness = Harness::new();
    let task_id = harness.submit().await;
    harness
        .store
        .mark_in_progress_at(&task_id, "worker-A", Utc::now() - chrono::Duration::hours(2))
        .await
        .unwrap();

    let sweep = ReclaimSweep::new(
        harness.store.clone(),
        Duration::from_secs(3600),
        Duration::from_secs(60),
    );
    assert_eq!(sweep.sweep_once().await.unwrap(), vec![task_id.clone()]);
    assert_eq!(
        harness.store.get(&task_id).await.unwrap().unwrap().status,
        TaskStatus::Waiting
    );
    assert!(sweep.sweep_once().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let harness = Harness::new();
    let ready = worker("ready", 1).await;
    let task_id = harness.submit().await;
    let dispatcher = harness.dispatcher(&[&ready]);

    let (tx, rx) = watch::channel(false);
    let store = harness.store.clone();
    let watcher = async move {
        for _ in 0..100 {
            let task = store.get(&task_id).await.unwrap().unwrap();
            if task.status == TaskStatus::InProgress {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tx.send(true).unwrap();
    };

    let (result, ()) = tokio::join!(dispatcher.run(rx), watcher);
    result.unwrap();
}

#[tokio::test]
async fn test_retention_sweep_deletes_old_done_tasks() {
    let dir = TempDir::new().unwrap();
    let blobs = BlobStore::new(dir.path());
    let store: SharedStore = Arc::new(SqliteTaskStore::in_memory().await.unwrap());

    let mut ids = Vec::new();
    for age_days in [10, 2] {
        let task_id = TaskId::new();
        blobs.write_source(&task_id, None, b"v").await.unwrap();
        let new_task = NewTask::new(ObjectMap::new(), "/s", "/c", OwnerToken::from("o")).with_id(task_id.clone());
        store.create(new_task).await.unwrap();
        store.mark_in_progress(&task_id, "w").await.unwrap();
        store
            .mark_done_at(&task_id, "/r", Utc::now() - chrono::Duration::days(age_days))
            .await
            .unwrap();
        ids.push(task_id);
    }

    let removed = retention::sweep(&store, &blobs, 7).await.unwrap();
    assert_eq!(removed, vec![ids[0].clone()]);
    assert!(store.get(&ids[0]).await.unwrap().is_none());
    assert!(!blobs.task_dir(&ids[0]).unwrap().exists());
    assert!(store.get(&ids[1]).await.unwrap().is_some());
    assert!(blobs.task_dir(&ids[1]).unwrap().exists());

    assert!(retention::sweep(&store, &blobs, -1).await.is_err());
}
