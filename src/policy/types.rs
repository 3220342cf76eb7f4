//! Data model for retry-selection policies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyCondition {
    pub error_type: Option<String>,
    pub http_status: Option<u16>,
    pub error_message_regex: Option<String>,
    pub action_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetConstraints {
    pub max_retries_per_workflow: Option<u64>,
    pub max_retries_per_session: Option<u64>,
    pub max_total_retry_time: Option<std::time::Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub retry_profile: String,
    pub conditions: PolicyCondition,
    #[serde(default)]
    pub budget_constraints: BudgetConstraints,
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// The failure information a policy is scored against.
#[derive(Debug, Clone, Default)]
pub struct FailureContext {
    pub error_type: Option<String>,
    pub http_status: Option<u16>,
    pub error_message: Option<String>,
    pub action_type: Option<String>,
    pub workflow_id: Option<String>,
    pub session_id: Option<String>,
}
