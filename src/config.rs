//! Ambient runtime configuration, read from the environment.
//!
//! Mirrors the shape of `coordination::rollout::FeatureFlags`: a plain
//! struct with a conservative `Default` and an `from_env` constructor that
//! only overrides fields whose environment variable is actually set.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outbound-HTTP security policy (default deny-by-pattern allowlist).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityPolicy {
    pub allowed_schemes: Vec<String>,
    pub allowed_ports: Vec<u16>,
    pub denied_ports: Vec<u16>,
    pub allowed_hosts: Vec<String>,
    pub denied_hosts: Vec<String>,
    pub denied_networks: Vec<String>,
    pub max_request_bytes: u64,
    pub max_response_bytes: u64,
    pub max_log_entry_bytes: u64,
    pub user_agent: String,
    pub follow_redirects: bool,
    pub http_timeout: Duration,
    pub action_timeout: Duration,
    pub workflow_timeout: Duration,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            allowed_schemes: vec!["http".into(), "https".into()],
            allowed_ports: vec![80, 443, 8080, 8443],
            denied_ports: vec![22, 23, 25, 53, 135, 139, 445, 1433, 1521, 3306, 3389, 5432, 6379],
            allowed_hosts: Vec::new(),
            denied_hosts: vec![
                "localhost".into(),
                "127.0.0.1".into(),
                "0.0.0.0".into(),
                "*.internal".into(),
                "*.local".into(),
                "metadata.google.internal".into(),
                "169.254.169.254".into(),
            ],
            denied_networks: vec![
                "10.0.0.0/8".into(),
                "172.16.0.0/12".into(),
                "192.168.0.0/16".into(),
                "127.0.0.0/8".into(),
                "169.254.0.0/16".into(),
                "::1/128".into(),
                "fc00::/7".into(),
                "fe80::/10".into(),
            ],
            max_request_bytes: 10 * 1024 * 1024,
            max_response_bytes: 50 * 1024 * 1024,
            max_log_entry_bytes: 1024 * 1024,
            user_agent: "MOVA-Engine/1.0".into(),
            follow_redirects: false,
            http_timeout: Duration::from_secs(30),
            action_timeout: Duration::from_secs(5 * 60),
            workflow_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Top-level engine configuration, sourced from `MOVA_*` environment
/// variables with conservative defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub dlq_path: PathBuf,
    pub log_level: String,
    pub retry_default_max_attempts: u32,
    pub retry_default_delay: Duration,
    pub dlq_retention_days: u32,
    pub security: SecurityPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dlq_path: PathBuf::from("./state/deadletter"),
            log_level: "info".to_string(),
            retry_default_max_attempts: 3,
            retry_default_delay: Duration::from_secs(2),
            dlq_retention_days: 30,
            security: SecurityPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Build a config from defaults, overridden by any `MOVA_*` variable
    /// present in the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = env::var("MOVA_DLQ_PATH") {
            config.dlq_path = PathBuf::from(path);
        }
        if let Ok(level) = env::var("MOVA_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Ok(max) = env::var("MOVA_RETRY_DEFAULT_MAX_ATTEMPTS") {
            if let Ok(parsed) = max.parse() {
                config.retry_default_max_attempts = parsed;
            }
        }
        if let Ok(delay) = env::var("MOVA_RETRY_DEFAULT_DELAY") {
            if let Ok(secs) = delay.parse::<u64>() {
                config.retry_default_delay = Duration::from_secs(secs);
            }
        }
        if let Ok(days) = env::var("MOVA_DLQ_RETENTION_DAYS") {
            if let Ok(parsed) = days.parse() {
                config.dlq_retention_days = parsed;
            }
        }

        config
    }
}
