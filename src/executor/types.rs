//! Envelope, run, and action-result data model (§3).

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub action_type: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default = "default_mova_version")]
    pub mova_version: String,
    pub intent: Intent,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default)]
    pub secrets: HashMap<String, Value>,
}

fn default_mova_version() -> String {
    "3.1".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_name: String,
    pub status: ActionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub output: HashMap<String, Value>,
    #[serde(default)]
    pub error: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub event: String,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub run_id: String,
    pub workflow_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub variables: HashMap<String, Value>,
    pub results: Vec<ActionResult>,
    pub logs: Vec<LogRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionContext {
    pub fn new(run_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            workflow_id: workflow_id.into(),
            start_time: Utc::now(),
            end_time: None,
            status: RunStatus::Pending,
            variables: HashMap::new(),
            results: Vec::new(),
            logs: Vec::new(),
            error: None,
        }
    }

    pub fn result_for(&self, action_name: &str) -> Option<&ActionResult> {
        self.results.iter().rev().find(|r| r.action_name == action_name)
    }

    pub fn last_completed_output(&self) -> Option<&HashMap<String, Value>> {
        self.results
            .iter()
            .rev()
            .find(|r| r.status == ActionStatus::Completed)
            .map(|r| &r.output)
    }
}
