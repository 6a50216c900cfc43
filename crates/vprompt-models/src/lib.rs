//! Shared data models for the vprompt backend.
//!
//! This crate provides Serde-serializable types for:
//! - Tasks and their lifecycle states
//! - Per-object prompts and bounding boxes
//! - Owner tokens and notification registrations
//! - Payloads exchanged with workers and submitters

pub mod objects;
pub mod owner;
pub mod submission;
pub mod task;

// Re-export common types
pub use objects::{parse_objects, validate_objects, BBox, ObjectMap, ObjectPrompt, ObjectsError};
pub use owner::{is_http_target, OwnerRegistration, OwnerToken};
pub use submission::{CompletionNotice, JobSubmission, WorkerHealth, COMPLETION_MESSAGE, WORKER_READY};
pub use task::{NewTask, Task, TaskId, TaskStatus, UnknownStatus};
