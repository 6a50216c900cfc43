//! Worker registry and client.
//!
//! This crate provides:
//! - The ordered list of candidate worker endpoints
//! - The readiness probe (`GET {base}/get_worker_status`)
//! - Job submission (`POST {base}/process_video`, multipart)

pub mod client;
pub mod config;
pub mod error;
pub mod registry;

pub use client::WorkerClient;
pub use config::WorkerClientConfig;
pub use error::{WorkerClientError, WorkerResult};
pub use registry::{parse_hosts, WorkerEndpoint, WorkerRegistry};
