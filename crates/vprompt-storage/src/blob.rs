//! Local filesystem blob store.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use vprompt_models::TaskId;

use crate::error::{BlobError, BlobResult};

/// Extension used when an upload carries no usable filename.
pub const DEFAULT_EXTENSION: &str = "mp4";

/// Configuration for the blob store.
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Directory under which every task directory lives
    pub root: PathBuf,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/blobs"),
        }
    }
}

impl BlobConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            root: std::env::var("BLOB_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.root),
        }
    }
}

/// Blob store keyed by task identifier.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Create a blob store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create from configuration.
    pub fn from_config(config: &BlobConfig) -> Self {
        Self::new(config.root.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every blob of a task.
    pub fn task_dir(&self, task_id: &TaskId) -> BlobResult<PathBuf> {
        if !task_id.is_path_safe() {
            return Err(BlobError::invalid_key(task_id.as_str()));
        }
        Ok(self.root.join(task_id.as_str()))
    }

    pub fn source_path(&self, task_id: &TaskId, ext: &str) -> BlobResult<PathBuf> {
        Ok(self
            .task_dir(task_id)?
            .join(format!("{}_source.{}", task_id, ext)))
    }

    pub fn config_path(&self, task_id: &TaskId) -> BlobResult<PathBuf> {
        Ok(self.task_dir(task_id)?.join(format!("{}_config.json", task_id)))
    }

    /// Path of one result upload. Every intake attempt gets its own file so
    /// a losing concurrent callback can never overwrite the recorded result.
    pub fn result_path(&self, task_id: &TaskId, attempt: &str, ext: &str) -> BlobResult<PathBuf> {
        Ok(self
            .task_dir(task_id)?
            .join(format!("{}_result_{}.{}", task_id, attempt, ext)))
    }

    /// Create the task directory. Succeeds if it already exists.
    pub async fn create_task_dir(&self, task_id: &TaskId) -> BlobResult<PathBuf> {
        let dir = self.task_dir(task_id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| BlobError::write_failed(format!("create {}: {}", dir.display(), e)))?;
        Ok(dir)
    }

    /// Store the uploaded source video, returning its path.
    pub async fn write_source(
        &self,
        task_id: &TaskId,
        filename: Option<&str>,
        data: &[u8],
    ) -> BlobResult<PathBuf> {
        self.create_task_dir(task_id).await?;
        let path = self.source_path(task_id, &extension_of(filename))?;
        write_atomic(&path, data).await?;
        info!(task_id = %task_id, bytes = data.len(), "Stored source video");
        Ok(path)
    }

    /// Store the job configuration as JSON, returning its path.
    pub async fn write_config(
        &self,
        task_id: &TaskId,
        config: &serde_json::Value,
    ) -> BlobResult<PathBuf> {
        self.create_task_dir(task_id).await?;
        let path = self.config_path(task_id)?;
        let data = serde_json::to_vec_pretty(config)?;
        write_atomic(&path, &data).await?;
        debug!(task_id = %task_id, "Stored job config");
        Ok(path)
    }

    /// Store a worker's result video under a fresh attempt path, returning it.
    ///
    /// The bytes land in a temp file first and are renamed onto the result
    /// path, so readers never observe a partial result.
    pub async fn write_result(
        &self,
        task_id: &TaskId,
        filename: Option<&str>,
        data: &[u8],
    ) -> BlobResult<PathBuf> {
        self.create_task_dir(task_id).await?;
        let attempt = uuid::Uuid::new_v4().simple().to_string();
        let path = self.result_path(task_id, &attempt[..12], &extension_of(filename))?;
        write_atomic(&path, data).await?;
        info!(task_id = %task_id, bytes = data.len(), "Stored result video");
        Ok(path)
    }

    /// Read a blob by path.
    pub async fn read(&self, path: impl AsRef<Path>) -> BlobResult<Vec<u8>> {
        let path = path.as_ref();
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::not_found(path.display().to_string()))
            }
            Err(e) => Err(BlobError::read_failed(format!("{}: {}", path.display(), e))),
        }
    }

    /// Open a blob for streaming.
    pub async fn open(&self, path: impl AsRef<Path>) -> BlobResult<tokio::fs::File> {
        let path = path.as_ref();
        match tokio::fs::File::open(path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::not_found(path.display().to_string()))
            }
            Err(e) => Err(BlobError::read_failed(format!("{}: {}", path.display(), e))),
        }
    }

    /// Delete a single blob. Returns `Ok(false)` when it was already gone.
    pub async fn remove_blob(&self, path: impl AsRef<Path>) -> BlobResult<bool> {
        let path = path.as_ref();
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BlobError::delete_failed(format!("{}: {}", path.display(), e))),
        }
    }

    /// Read and parse a stored job configuration.
    pub async fn read_config(&self, path: impl AsRef<Path>) -> BlobResult<serde_json::Value> {
        let bytes = self.read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn exists(&self, path: impl AsRef<Path>) -> bool {
        tokio::fs::metadata(path.as_ref())
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Remove a task directory and everything in it.
    ///
    /// Returns `Ok(false)` when there was nothing to remove.
    pub async fn remove_task_dir(&self, task_id: &TaskId) -> BlobResult<bool> {
        let dir = self.task_dir(task_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(task_id = %task_id, "Removed task directory");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(task_id = %task_id, "Task directory already absent");
                Ok(false)
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Failed to remove task directory");
                Err(BlobError::delete_failed(format!("{}: {}", dir.display(), e)))
            }
        }
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> BlobResult<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| BlobError::invalid_key(path.display().to_string()))?;
    let tmp = path.with_file_name(format!(".{}.{}.partial", file_name, uuid::Uuid::new_v4()));

    if let Err(e) = tokio::fs::write(&tmp, data).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(BlobError::write_failed(format!("{}: {}", tmp.display(), e)));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(BlobError::write_failed(format!("{}: {}", path.display(), e)));
    }
    Ok(())
}

/// Extension taken from an upload filename, lowercased; `mp4` when absent.
pub fn extension_of(filename: Option<&str>) -> String {
    filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Content type guessed from a blob path.
pub fn content_type_for(path: impl AsRef<Path>) -> &'static str {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("gif") => "image/gif",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, BlobStore) {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Some("clip.MOV")), "mov");
        assert_eq!(extension_of(Some("clip")), "mp4");
        assert_eq!(extension_of(None), "mp4");
        assert_eq!(extension_of(Some("weird.../..")), "mp4");
    }

    #[test]
    fn test_layout_is_keyed_by_task() {
        let store = BlobStore::new("/blob");
        let id = TaskId::from("T1");
        assert_eq!(store.task_dir(&id).unwrap(), PathBuf::from("/blob/T1"));
        assert_eq!(
            store.source_path(&id, "mp4").unwrap(),
            PathBuf::from("/blob/T1/T1_source.mp4")
        );
        assert_eq!(
            store.config_path(&id).unwrap(),
            PathBuf::from("/blob/T1/T1_config.json")
        );
        assert_eq!(
            store.result_path(&id, "a1", "mp4").unwrap(),
            PathBuf::from("/blob/T1/T1_result_a1.mp4")
        );
        assert!(store.task_dir(&TaskId::from("../escape")).is_err());
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let (_dir, store) = store();
        let id = TaskId::new();

        let source = store.write_source(&id, Some("in.webm"), b"frames").await.unwrap();
        assert!(source.to_string_lossy().ends_with("_source.webm"));
        assert_eq!(store.read(&source).await.unwrap(), b"frames");

        let config = serde_json::json!({"steps": 4});
        let config_path = store.write_config(&id, &config).await.unwrap();
        assert_eq!(store.read_config(&config_path).await.unwrap(), config);

        let result = store.write_result(&id, Some("out.mp4"), b"done").await.unwrap();
        assert!(store.exists(&result).await);
        assert_eq!(content_type_for(&result), "video/mp4");
    }

    #[tokio::test]
    async fn test_result_attempts_do_not_collide() {
        let (_dir, store) = store();
        let id = TaskId::new();

        let first = store.write_result(&id, None, b"first").await.unwrap();
        let second = store.write_result(&id, None, b"second").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.read(&first).await.unwrap(), b"first");
        assert_eq!(store.read(&second).await.unwrap(), b"second");

        assert!(store.remove_blob(&second).await.unwrap());
        assert!(!store.remove_blob(&second).await.unwrap());
        assert!(store.exists(&first).await);
    }

    #[tokio::test]
    async fn test_open_streams_existing_blob() {
        use tokio::io::AsyncReadExt;

        let (dir, store) = store();
        let id = TaskId::new();
        let path = store.write_result(&id, Some("out.webm"), b"frames").await.unwrap();

        let mut file = store.open(&path).await.unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"frames");

        let err = store.open(dir.path().join("gone.mp4")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_dir_is_idempotent() {
        let (_dir, store) = store();
        let id = TaskId::new();
        store.create_task_dir(&id).await.unwrap();
        store.create_task_dir(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let (dir, store) = store();
        let err = store.read(dir.path().join("nope.mp4")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_remove_task_dir() {
        let (_dir, store) = store();
        let id = TaskId::new();
        let source = store.write_source(&id, None, b"x").await.unwrap();

        assert!(store.remove_task_dir(&id).await.unwrap());
        assert!(!store.exists(&source).await);
        assert!(!store.remove_task_dir(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_partial_files_left_behind() {
        let (_dir, store) = store();
        let id = TaskId::new();
        store.write_result(&id, None, b"abc").await.unwrap();

        let mut entries = tokio::fs::read_dir(store.task_dir(&id).unwrap()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().to_string();
            assert!(!name.ends_with(".partial"), "leftover temp file {}", name);
        }
    }
}
