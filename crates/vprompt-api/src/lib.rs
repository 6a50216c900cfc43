//! Axum HTTP gateway.
//!
//! This crate provides:
//! - Task submission (video + object prompts) and owner task management
//! - Worker result intake with best-effort owner notification
//! - Owner-authenticated result retrieval
//! - Per-caller rate limiting and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{Notifier, NotifyOutcome};
pub use state::AppState;
