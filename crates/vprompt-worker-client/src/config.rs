//! Worker client configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the worker registry and client.
#[derive(Debug, Clone)]
pub struct WorkerClientConfig {
    /// Inline endpoints (`WORKER_ENDPOINTS`, comma-separated)
    pub endpoints: Vec<String>,
    /// File with one host per line, used when no inline endpoints are set
    pub workers_file: Option<PathBuf>,
    /// Port appended to bare hosts
    pub worker_port: u16,
    /// Readiness probe path
    pub status_path: String,
    /// Job submission path
    pub process_path: String,
    /// Bound on one readiness probe
    pub health_timeout: Duration,
    /// Bound on one job upload
    pub submit_timeout: Duration,
    /// Retries for submissions that never reached the worker
    pub max_retries: u32,
}

impl Default for WorkerClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            workers_file: None,
            worker_port: 5000,
            status_path: "get_worker_status".to_string(),
            process_path: "process_video".to_string(),
            health_timeout: Duration::from_millis(2000),
            submit_timeout: Duration::from_secs(120),
            max_retries: 2,
        }
    }
}

impl WorkerClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoints: std::env::var("WORKER_ENDPOINTS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            workers_file: std::env::var("WORKERS_FILE").ok().map(PathBuf::from),
            worker_port: std::env::var("WORKER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.worker_port),
            status_path: std::env::var("WORKER_STATUS_PATH").unwrap_or(defaults.status_path),
            process_path: std::env::var("WORKER_PROCESS_PATH").unwrap_or(defaults.process_path),
            health_timeout: std::env::var("WORKER_HEALTH_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.health_timeout),
            submit_timeout: std::env::var("WORKER_SUBMIT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.submit_timeout),
            max_retries: std::env::var("WORKER_SUBMIT_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = WorkerClientConfig::default();
        assert_eq!(config.worker_port, 5000);
        assert_eq!(config.status_path, "get_worker_status");
        assert_eq!(config.process_path, "process_video");
        assert!(config.endpoints.is_empty());
    }
}
