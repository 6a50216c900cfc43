//! Per-task blob storage.
//!
//! Every task owns one directory under the blob root holding:
//! - the uploaded source video (`{task_id}_source.{ext}`)
//! - the job configuration (`{task_id}_config.json`)
//! - the worker's result video (`{task_id}_result_{attempt}.{ext}`)

pub mod blob;
pub mod error;

pub use blob::{content_type_for, extension_of, BlobConfig, BlobStore, DEFAULT_EXTENSION};
pub use error::{BlobError, BlobResult};
