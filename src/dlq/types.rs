//! Dead-letter entry data model (§3, §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::types::{Envelope, ExecutionContext};
use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum DlqError {
    #[error("entry '{0}' not found")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed entry document: {0}")]
    Malformed(String),

    #[error("invalid status transition from {from:?} to {to:?}")]
    InvalidTransition { from: EntryStatus, to: EntryStatus },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Active,
    Retrying,
    Resolved,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    MaxRetriesExceeded,
    Fatal,
    Timeout,
    BudgetBlocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub last_error: String,
    #[serde(default)]
    pub history: Vec<String>,
    pub failure_reason: FailureReason,
    pub attempts: u32,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    pub stack_trace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqMetadata {
    pub source: String,
    pub priority: i32,
    pub workflow_type: String,
    pub retry_count: u32,
    #[serde(default)]
    pub last_retry_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub id: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub envelope: Envelope,
    pub context: ExecutionContext,
    #[serde(default)]
    pub failed_action: Option<String>,
    pub error_details: ErrorDetails,
    pub metadata: DlqMetadata,
    pub status: EntryStatus,
}

impl DlqEntry {
    /// Apply a status transition, enforcing the state machine in §3:
    /// active -> retrying -> {resolved | active}; any -> archived.
    pub fn transition(&mut self, to: EntryStatus) -> Result<(), DlqError> {
        let allowed = matches!(
            (self.status, to),
            (EntryStatus::Active, EntryStatus::Retrying)
                | (EntryStatus::Retrying, EntryStatus::Resolved)
                | (EntryStatus::Retrying, EntryStatus::Active)
                | (_, EntryStatus::Archived)
        );
        if !allowed {
            return Err(DlqError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DlqFilter {
    pub status: Option<EntryStatus>,
    pub workflow_type: Option<String>,
    pub user_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl DlqFilter {
    pub fn matches(&self, entry: &DlqEntry) -> bool {
        if let Some(status) = self.status {
            if entry.status != status {
                return false;
            }
        }
        if let Some(workflow_type) = &self.workflow_type {
            if &entry.metadata.workflow_type != workflow_type {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if entry.metadata.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.created_at > until {
                return false;
            }
        }
        true
    }
}
