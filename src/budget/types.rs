//! Data model for the Budget Manager.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("budget '{0}' not found")]
    NotFound(String),

    #[error("invalid budget definition: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetType {
    Retries,
    Workflows,
    Cpu,
    Memory,
    ApiRequests,
    ExecutionTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetScope {
    Global,
    Organization,
    User,
    Workflow,
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    Minute,
    Hour,
    Day,
    Month,
}

impl TimeWindow {
    /// Truncate `now` to the start of the current window.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            TimeWindow::Minute => now
                .with_second(0)
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(now),
            TimeWindow::Hour => now
                .with_minute(0)
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(now),
            TimeWindow::Day => now
                .with_hour(0)
                .and_then(|t| t.with_minute(0))
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(now),
            TimeWindow::Month => now
                .with_day(1)
                .and_then(|t| t.with_hour(0))
                .and_then(|t| t.with_minute(0))
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(now),
        }
    }

    pub fn next_window_start(&self, current_start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            TimeWindow::Minute => current_start + chrono::Duration::minutes(1),
            TimeWindow::Hour => current_start + chrono::Duration::hours(1),
            TimeWindow::Day => current_start + chrono::Duration::days(1),
            TimeWindow::Month => {
                let (year, month) = if current_start.month() == 12 {
                    (current_start.year() + 1, 1)
                } else {
                    (current_start.year(), current_start.month() + 1)
                };
                current_start
                    .with_year(year)
                    .and_then(|t| t.with_month(month))
                    .unwrap_or(current_start + chrono::Duration::days(30))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub budget_type: BudgetType,
    pub scope: BudgetScope,
    pub scope_id: Option<String>,
    pub max_count: Option<u64>,
    pub max_duration: Option<std::time::Duration>,
    pub max_memory: Option<u64>,
    pub max_cpu: Option<f64>,
    pub time_window: TimeWindow,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    pub fn validate(&self) -> Result<(), BudgetError> {
        if self.name.trim().is_empty() {
            return Err(BudgetError::Invalid("name must not be empty".to_string()));
        }
        if self.scope != BudgetScope::Global && self.scope_id.is_none() {
            return Err(BudgetError::Invalid(
                "scope_id is required for non-global scopes".to_string(),
            ));
        }
        if let Some(cpu) = self.max_cpu {
            if !(0.0..=1.0).contains(&cpu) || cpu <= 0.0 {
                return Err(BudgetError::Invalid(
                    "max_cpu must be within (0, 1]".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// The applicable maximum for this budget's `budget_type`, as a single
    /// comparable quantity (count-like metrics only; cpu/memory compared
    /// separately by the manager).
    pub fn max_count_like(&self) -> Option<u64> {
        match self.budget_type {
            BudgetType::Retries | BudgetType::Workflows | BudgetType::ApiRequests => {
                self.max_count
            }
            BudgetType::ExecutionTime => self.max_duration.map(|d| d.as_secs()),
            BudgetType::Cpu | BudgetType::Memory => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetUsage {
    pub count: u64,
    pub duration_secs: u64,
    pub peak_memory: u64,
    pub peak_cpu: f64,
    pub window_start_time: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl BudgetUsage {
    pub fn reset(&mut self, window_start: DateTime<Utc>) {
        self.count = 0;
        self.duration_secs = 0;
        self.peak_memory = 0;
        self.peak_cpu = 0.0;
        self.window_start_time = Some(window_start);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub budget_id: String,
    pub budget_name: String,
    pub budget_type: BudgetType,
    pub scope: BudgetScope,
    pub scope_id: Option<String>,
    pub severity: ViolationSeverity,
    pub percent_used: f64,
    pub observed_at: DateTime<Utc>,
}
