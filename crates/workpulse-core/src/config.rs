// Pipeline tunables.
//
// Values can be deserialized from config files or built from defaults; the
// worker binary only overrides a handful from the environment.

use serde::{Deserialize, Serialize};

/// Tunables shared by extractors, transformers and the worker pools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Issue search page size (provider caps apply)
    #[serde(default = "default_issue_page_size")]
    pub issue_page_size: u32,

    /// Reference-data page size (projects, statuses, fields)
    #[serde(default = "default_reference_page_size")]
    pub reference_page_size: u32,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Wall-clock budget for a full page-fetch loop
    #[serde(default = "default_fetch_loop_timeout_secs")]
    pub fetch_loop_timeout_secs: u64,

    /// Provider retry attempts on transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Message retry attempts before dead-lettering
    #[serde(default = "default_max_message_retries")]
    pub max_message_retries: u32,

    /// Bulk insert/update chunk size
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Idle poll interval for queue consumers, milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Message lease before an unacked delivery becomes visible again
    #[serde(default = "default_message_lease_secs")]
    pub message_lease_secs: u64,

    /// Grace period for workers to finish their current message on shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_issue_page_size() -> u32 {
    100
}

fn default_reference_page_size() -> u32 {
    50
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_fetch_loop_timeout_secs() -> u64 {
    30 * 60
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_message_retries() -> u32 {
    3
}

fn default_batch_size() -> usize {
    100
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_message_lease_secs() -> u64 {
    300
}

fn default_shutdown_grace_secs() -> u64 {
    3
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            issue_page_size: default_issue_page_size(),
            reference_page_size: default_reference_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
            fetch_loop_timeout_secs: default_fetch_loop_timeout_secs(),
            max_retries: default_max_retries(),
            max_message_retries: default_max_message_retries(),
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            message_lease_secs: default_message_lease_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.issue_page_size, 100);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.fetch_loop_timeout_secs, 1800);
        assert_eq!(config.max_message_retries, 3);
        assert_eq!(config.shutdown_grace_secs, 3);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: WorkerConfig = serde_json::from_str(r#"{"issue_page_size": 25}"#).unwrap();
        assert_eq!(config.issue_page_size, 25);
        assert_eq!(config.batch_size, 100);
    }
}
