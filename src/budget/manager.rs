//! Budget Manager runtime: `Check`/`Record` against registered budgets,
//! with lazy window resets and violation emission.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use super::types::{Budget, BudgetError, BudgetScope, BudgetType, BudgetUsage, Violation, ViolationSeverity};

/// A proposed usage delta to check or record against applicable budgets.
#[derive(Debug, Clone, Default)]
pub struct BudgetRequest {
    pub budget_type: Option<BudgetType>,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub workflow_id: Option<String>,
    pub session_id: Option<String>,
    pub count_delta: u64,
    pub duration_delta_secs: u64,
    pub memory: u64,
    pub cpu: f64,
}

#[derive(Debug, Clone)]
pub struct BudgetResponse {
    pub allowed: bool,
    pub violations: Vec<Violation>,
    pub remaining: HashMap<String, u64>,
    pub next_reset: Option<DateTime<Utc>>,
}

/// Process-wide budget registry, protected by a reader-writer lock.
pub struct BudgetManager {
    budgets: RwLock<HashMap<String, Budget>>,
    usage: RwLock<HashMap<String, BudgetUsage>>,
    violations_tx: mpsc::Sender<Violation>,
}

impl BudgetManager {
    /// Construct a manager with a bounded violation channel; the receiver
    /// is handed to the Alert Manager by the caller.
    pub fn new(channel_capacity: usize) -> (Self, mpsc::Receiver<Violation>) {
        let (tx, rx) = mpsc::channel(channel_capacity);
        (
            Self {
                budgets: RwLock::new(HashMap::new()),
                usage: RwLock::new(HashMap::new()),
                violations_tx: tx,
            },
            rx,
        )
    }

    pub async fn register(&self, budget: Budget) -> Result<(), BudgetError> {
        budget.validate()?;
        self.budgets.write().await.insert(budget.id.clone(), budget);
        Ok(())
    }

    fn scope_id_for(request: &BudgetRequest, scope: BudgetScope) -> Option<String> {
        match scope {
            BudgetScope::Global => None,
            BudgetScope::Organization => request.organization_id.clone(),
            BudgetScope::User => request.user_id.clone(),
            BudgetScope::Workflow => request.workflow_id.clone(),
            BudgetScope::Session => request.session_id.clone(),
        }
    }

    async fn applicable_budgets(&self, request: &BudgetRequest) -> Vec<Budget> {
        let budgets = self.budgets.read().await;
        budgets
            .values()
            .filter(|b| b.enabled)
            .filter(|b| request.budget_type.map_or(true, |t| t == b.budget_type))
            .filter(|b| {
                let wanted = Self::scope_id_for(request, b.scope);
                b.scope == BudgetScope::Global || wanted.as_deref() == b.scope_id.as_deref()
            })
            .cloned()
            .collect()
    }

    async fn reset_if_expired(&self, budget: &Budget, now: DateTime<Utc>) {
        let mut usage_map = self.usage.write().await;
        let usage = usage_map.entry(budget.id.clone()).or_default();
        let window_start = budget.time_window.window_start(now);
        match usage.window_start_time {
            Some(start) if start == window_start => {}
            Some(_) | None => usage.reset(window_start),
        }
    }

    /// Check whether `request` would be permitted under every applicable
    /// budget, without recording it.
    pub async fn check(&self, request: &BudgetRequest) -> BudgetResponse {
        let now = Utc::now();
        let applicable = self.applicable_budgets(request).await;
        let mut violations = Vec::new();
        let mut allowed = true;
        let mut remaining = HashMap::new();
        let mut next_reset: Option<DateTime<Utc>> = None;

        for budget in &applicable {
            self.reset_if_expired(budget, now).await;
            let usage_map = self.usage.read().await;
            let usage = usage_map.get(&budget.id).cloned().unwrap_or_default();
            drop(usage_map);

            let window_start = usage
                .window_start_time
                .unwrap_or_else(|| budget.time_window.window_start(now));
            let reset_at = budget.time_window.next_window_start(window_start);
            next_reset = Some(match next_reset {
                Some(existing) if existing < reset_at => existing,
                _ => reset_at,
            });

            let (projected, max) = match budget.budget_type {
                BudgetType::Cpu => (usage.peak_cpu.max(request.cpu), budget.max_cpu),
                BudgetType::Memory => (
                    usage.peak_memory.max(request.memory) as f64,
                    budget.max_memory.map(|m| m as f64),
                ),
                BudgetType::ExecutionTime => (
                    (usage.duration_secs + request.duration_delta_secs) as f64,
                    budget.max_duration.map(|d| d.as_secs() as f64),
                ),
                BudgetType::Retries | BudgetType::Workflows | BudgetType::ApiRequests => (
                    (usage.count + request.count_delta) as f64,
                    budget.max_count.map(|m| m as f64),
                ),
            };

            if let Some(max) = max {
                {
                    let ratio = if max > 0.0 { projected / max } else if projected > 0.0 { f64::INFINITY } else { 0.0 };
                    remaining.insert(
                        budget.id.clone(),
                        (max - projected).max(0.0).floor() as u64,
                    );
                    if projected > max {
                        allowed = false;
                        violations.push(Violation {
                            budget_id: budget.id.clone(),
                            budget_name: budget.name.clone(),
                            budget_type: budget.budget_type,
                            scope: budget.scope,
                            scope_id: budget.scope_id.clone(),
                            severity: ViolationSeverity::Error,
                            percent_used: ratio * 100.0,
                            observed_at: now,
                        });
                    } else if ratio >= 0.8 {
                        violations.push(Violation {
                            budget_id: budget.id.clone(),
                            budget_name: budget.name.clone(),
                            budget_type: budget.budget_type,
                            scope: budget.scope,
                            scope_id: budget.scope_id.clone(),
                            severity: ViolationSeverity::Warning,
                            percent_used: ratio * 100.0,
                            observed_at: now,
                        });
                    }
                }
            }
        }

        for violation in &violations {
            if self.violations_tx.try_send(violation.clone()).is_err() {
                warn!(budget_id = %violation.budget_id, "violation channel full, dropping");
            }
        }

        BudgetResponse {
            allowed,
            violations,
            remaining,
            next_reset,
        }
    }

    /// Record actual usage against every applicable budget. Counts and
    /// durations accumulate additively; memory/cpu track the window peak.
    pub async fn record(&self, request: &BudgetRequest) {
        let now = Utc::now();
        let applicable = self.applicable_budgets(request).await;
        for budget in &applicable {
            self.reset_if_expired(budget, now).await;
            let mut usage_map = self.usage.write().await;
            let usage = usage_map.entry(budget.id.clone()).or_default();
            usage.count += request.count_delta;
            usage.duration_secs += request.duration_delta_secs;
            usage.peak_memory = usage.peak_memory.max(request.memory);
            usage.peak_cpu = usage.peak_cpu.max(request.cpu);
            usage.last_updated = Some(now);
            debug!(budget_id = %budget.id, count = usage.count, "budget usage recorded");
        }
    }
}
