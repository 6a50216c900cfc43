//! Dispatcher configuration.

use std::time::Duration;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sleep between dispatch ticks
    pub poll_interval: Duration,
    /// URL workers post results to
    pub response_url: String,
    /// Lease length after which an IN_PROGRESS task is reclaimed (None disables)
    pub reclaim_after: Option<Duration>,
    /// How often the reclaim sweep runs
    pub reclaim_interval: Duration,
    /// Age after which DONE tasks are deleted by the retention sweep
    pub retention_days: i64,
    /// Port for the Prometheus listener (None disables)
    pub metrics_port: Option<u16>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            response_url: "http://127.0.0.1:8000/process_video_result".to_string(),
            reclaim_after: Some(Duration::from_secs(3600)),
            reclaim_interval: Duration::from_secs(60),
            retention_days: 7,
            metrics_port: None,
        }
    }
}

impl DispatcherConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: std::env::var("DISPATCH_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            response_url: std::env::var("RESULT_CALLBACK_URL").unwrap_or(defaults.response_url),
            reclaim_after: match std::env::var("RECLAIM_AFTER_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
            {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.reclaim_after,
            },
            reclaim_interval: std::env::var("RECLAIM_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.reclaim_interval),
            retention_days: std::env::var("RETENTION_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retention_days),
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.reclaim_after, Some(Duration::from_secs(3600)));
        assert_eq!(config.retention_days, 7);
        assert!(config.response_url.ends_with("/process_video_result"));
    }
}
