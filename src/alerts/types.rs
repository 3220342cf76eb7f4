//! Alert data model.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::budget::{BudgetScope, BudgetType, Violation, ViolationSeverity};

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("channel send failed: {0}")]
    Send(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub enabled: bool,
    pub budget_type: Option<BudgetType>,
    pub scope: Option<BudgetScope>,
    pub min_severity: ViolationSeverity,
    #[serde(default = "default_cooldown")]
    pub cooldown: Duration,
}

fn default_cooldown() -> Duration {
    Duration::from_secs(5 * 60)
}

impl AlertRule {
    pub fn applies_to(&self, violation: &Violation) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(budget_type) = self.budget_type {
            if budget_type != violation.budget_type {
                return false;
            }
        }
        if let Some(scope) = self.scope {
            if scope != violation.scope {
                return false;
            }
        }
        severity_rank(violation.severity) >= severity_rank(self.min_severity)
    }
}

fn severity_rank(severity: ViolationSeverity) -> u8 {
    match severity {
        ViolationSeverity::Warning => 0,
        ViolationSeverity::Error => 1,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub rule_id: String,
    pub subject: String,
    pub body: String,
    pub violation: Violation,
    pub fired_at: DateTime<Utc>,
}
