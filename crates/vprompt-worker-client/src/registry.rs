//! Ordered set of candidate workers.

use std::fmt;

use tracing::info;
use url::Url;

use crate::config::WorkerClientConfig;
use crate::error::{WorkerClientError, WorkerResult};

/// One worker the dispatcher may hand jobs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEndpoint {
    /// Identifier recorded as the task's assigned worker (the entry as configured)
    pub id: String,
    /// Base URL, without trailing slash
    pub base_url: String,
}

impl WorkerEndpoint {
    /// Build an endpoint from a configured entry.
    ///
    /// Entries with a scheme are used as the base URL; bare hosts become
    /// `http://{host}:{port}`.
    pub fn parse(entry: &str, default_port: u16) -> WorkerResult<Self> {
        let entry = entry.trim();
        let raw = if entry.contains("://") {
            entry.to_string()
        } else if has_port(entry) {
            format!("http://{}", entry)
        } else {
            format!("http://{}:{}", entry, default_port)
        };

        let url = Url::parse(&raw).map_err(|e| WorkerClientError::invalid_endpoint(entry, e))?;
        if url.host_str().is_none() {
            return Err(WorkerClientError::invalid_endpoint(entry, "missing host"));
        }

        Ok(Self {
            id: entry.to_string(),
            base_url: raw.trim_end_matches('/').to_string(),
        })
    }

    /// URL of a path relative to the base.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl fmt::Display for WorkerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

fn has_port(host: &str) -> bool {
    match host.rsplit_once(':') {
        Some((_, port)) => !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Parse a workers file: one host per line, blank lines and `#` comments ignored.
pub fn parse_hosts(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Static, ordered list of candidate workers.
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    endpoints: Vec<WorkerEndpoint>,
}

impl WorkerRegistry {
    pub fn new(endpoints: Vec<WorkerEndpoint>) -> Self {
        Self { endpoints }
    }

    /// Build from configured entries in order.
    pub fn from_entries<S: AsRef<str>>(entries: &[S], default_port: u16) -> WorkerResult<Self> {
        let endpoints = entries
            .iter()
            .map(|e| WorkerEndpoint::parse(e.as_ref(), default_port))
            .collect::<WorkerResult<Vec<_>>>()?;
        Ok(Self { endpoints })
    }

    /// Load from `WORKER_ENDPOINTS`, falling back to the workers file.
    pub fn from_config(config: &WorkerClientConfig) -> WorkerResult<Self> {
        let entries = if !config.endpoints.is_empty() {
            config.endpoints.clone()
        } else if let Some(path) = &config.workers_file {
            let text = std::fs::read_to_string(path).map_err(|e| {
                WorkerClientError::WorkersFile(path.display().to_string(), e.to_string())
            })?;
            parse_hosts(&text)
        } else {
            Vec::new()
        };

        if entries.is_empty() {
            return Err(WorkerClientError::NoEndpoints);
        }

        let registry = Self::from_entries(&entries, config.worker_port)?;
        info!(workers = registry.len(), "Loaded worker registry");
        Ok(registry)
    }

    /// Candidates in dispatch order.
    pub fn list_candidates(&self) -> &[WorkerEndpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_bare_host_gets_default_port() {
        let endpoint = WorkerEndpoint::parse("10.0.0.5", 5000).unwrap();
        assert_eq!(endpoint.id, "10.0.0.5");
        assert_eq!(endpoint.base_url, "http://10.0.0.5:5000");
        assert_eq!(endpoint.url("get_worker_status"), "http://10.0.0.5:5000/get_worker_status");
    }

    #[test]
    fn test_entry_with_scheme_or_port_is_kept() {
        let endpoint = WorkerEndpoint::parse("https://gpu-1.internal/", 5000).unwrap();
        assert_eq!(endpoint.base_url, "https://gpu-1.internal");

        let endpoint = WorkerEndpoint::parse("gpu-2:7001", 5000).unwrap();
        assert_eq!(endpoint.base_url, "http://gpu-2:7001");
    }

    #[test]
    fn test_parse_hosts_skips_blank_lines() {
        let hosts = parse_hosts("10.0.0.1\n\n  10.0.0.2  \n# spare\n10.0.0.3\n");
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn test_from_config_reads_file_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "worker-b\nworker-a").unwrap();

        let config = WorkerClientConfig {
            workers_file: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let registry = WorkerRegistry::from_config(&config).unwrap();
        let ids: Vec<&str> = registry.list_candidates().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["worker-b", "worker-a"]);
    }

    #[test]
    fn test_inline_endpoints_win_over_file() {
        let config = WorkerClientConfig {
            endpoints: vec!["http://a:1".into()],
            workers_file: Some("/does/not/exist".into()),
            ..Default::default()
        };
        let registry = WorkerRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_registry_is_an_error() {
        let err = WorkerRegistry::from_config(&WorkerClientConfig::default()).unwrap_err();
        assert!(matches!(err, WorkerClientError::NoEndpoints));
    }
}
