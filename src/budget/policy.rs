//! Policy Enforcer sub-layer (§4.7) — a priority-sorted layer above the
//! per-budget Check/Record primitives that composes checks across several
//! budget `type`s into one `block`/`throttle`/`alert`/`log` decision.
//!
//! Grounded on the same additive, priority-ordered decision style as
//! `coordination::escalation::engine` (also the basis for the Rule Engine
//! and Policy Matcher), applied here to budgets instead of retries.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::manager::{BudgetManager, BudgetRequest};
use super::types::{BudgetType, Violation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementAction {
    Block,
    Throttle,
    Alert,
    Log,
}

/// A higher-level policy composing budget checks across one or more
/// `BudgetType`s. The highest-priority enabled policy whose composed check
/// trips (a denial or any violation) decides the outcome; lower-priority
/// policies are not consulted once one has matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetPolicyRule {
    pub id: String,
    pub priority: i64,
    pub budget_types: Vec<BudgetType>,
    pub action: EnforcementAction,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct EnforcementDecision {
    pub allowed: bool,
    pub throttled: bool,
    pub action: Option<EnforcementAction>,
    pub policy_id: Option<String>,
    pub violations: Vec<Violation>,
}

impl EnforcementDecision {
    fn passthrough() -> Self {
        Self {
            allowed: true,
            throttled: false,
            action: None,
            policy_id: None,
            violations: Vec::new(),
        }
    }
}

/// Composes `BudgetManager::check` across a policy's declared types and
/// resolves which policy's action applies when more than one would trigger.
pub struct BudgetPolicyEnforcer {
    manager: Arc<BudgetManager>,
    policies: RwLock<Vec<BudgetPolicyRule>>,
}

impl BudgetPolicyEnforcer {
    pub fn new(manager: Arc<BudgetManager>) -> Self {
        Self {
            manager,
            policies: RwLock::new(Vec::new()),
        }
    }

    pub async fn register(&self, rule: BudgetPolicyRule) {
        self.policies.write().await.push(rule);
    }

    /// Evaluate `request` against every enabled policy in priority order
    /// (descending; ties keep registration order). The first policy whose
    /// composed type checks deny or produce a violation wins.
    pub async fn evaluate(&self, request: &BudgetRequest) -> EnforcementDecision {
        let policies = self.policies.read().await;
        let mut ordered: Vec<&BudgetPolicyRule> = policies.iter().filter(|p| p.enabled).collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        for policy in ordered {
            let mut denied = false;
            let mut violations = Vec::new();

            for budget_type in &policy.budget_types {
                let mut typed_request = request.clone();
                typed_request.budget_type = Some(*budget_type);
                let response = self.manager.check(&typed_request).await;
                if !response.allowed {
                    denied = true;
                }
                violations.extend(response.violations);
            }

            if denied || !violations.is_empty() {
                let (allowed, throttled) = match policy.action {
                    EnforcementAction::Block => (false, false),
                    EnforcementAction::Throttle => (true, true),
                    EnforcementAction::Alert | EnforcementAction::Log => (true, false),
                };
                return EnforcementDecision {
                    allowed,
                    throttled,
                    action: Some(policy.action),
                    policy_id: Some(policy.id.clone()),
                    violations,
                };
            }
        }

        EnforcementDecision::passthrough()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::types::{Budget, BudgetScope, TimeWindow};
    use chrono::Utc;

    fn budget(id: &str, budget_type: BudgetType, max: u64) -> Budget {
        Budget {
            id: id.to_string(),
            name: id.to_string(),
            budget_type,
            scope: BudgetScope::Global,
            scope_id: None,
            max_count: Some(max),
            max_duration: None,
            max_memory: None,
            max_cpu: None,
            time_window: TimeWindow::Hour,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn block_policy_denies_when_composed_budget_exceeded() {
        let (manager, _rx) = BudgetManager::new(8);
        manager.register(budget("retries", BudgetType::Retries, 0)).await.unwrap();
        let manager = Arc::new(manager);
        let enforcer = BudgetPolicyEnforcer::new(manager.clone());
        enforcer
            .register(BudgetPolicyRule {
                id: "block-retries".to_string(),
                priority: 10,
                budget_types: vec![BudgetType::Retries],
                action: EnforcementAction::Block,
                enabled: true,
            })
            .await;

        let decision = enforcer.evaluate(&BudgetRequest { count_delta: 1, ..Default::default() }).await;
        assert!(!decision.allowed);
        assert_eq!(decision.policy_id.as_deref(), Some("block-retries"));
    }

    #[tokio::test]
    async fn throttle_policy_allows_but_marks_throttled() {
        let (manager, _rx) = BudgetManager::new(8);
        manager.register(budget("api", BudgetType::ApiRequests, 0)).await.unwrap();
        let manager = Arc::new(manager);
        let enforcer = BudgetPolicyEnforcer::new(manager);
        enforcer
            .register(BudgetPolicyRule {
                id: "throttle-api".to_string(),
                priority: 5,
                budget_types: vec![BudgetType::ApiRequests],
                action: EnforcementAction::Throttle,
                enabled: true,
            })
            .await;

        let decision = enforcer
            .evaluate(&BudgetRequest { budget_type: Some(BudgetType::ApiRequests), count_delta: 1, ..Default::default() })
            .await;
        assert!(decision.allowed);
        assert!(decision.throttled);
    }

    #[tokio::test]
    async fn higher_priority_policy_wins_when_both_trigger() {
        let (manager, _rx) = BudgetManager::new(8);
        manager.register(budget("retries", BudgetType::Retries, 0)).await.unwrap();
        let manager = Arc::new(manager);
        let enforcer = BudgetPolicyEnforcer::new(manager);
        enforcer
            .register(BudgetPolicyRule {
                id: "low-priority-log".to_string(),
                priority: 1,
                budget_types: vec![BudgetType::Retries],
                action: EnforcementAction::Log,
                enabled: true,
            })
            .await;
        enforcer
            .register(BudgetPolicyRule {
                id: "high-priority-block".to_string(),
                priority: 100,
                budget_types: vec![BudgetType::Retries],
                action: EnforcementAction::Block,
                enabled: true,
            })
            .await;

        let decision = enforcer.evaluate(&BudgetRequest { count_delta: 1, ..Default::default() }).await;
        assert!(!decision.allowed);
        assert_eq!(decision.policy_id.as_deref(), Some("high-priority-block"));
    }

    #[tokio::test]
    async fn disabled_policy_is_skipped() {
        let (manager, _rx) = BudgetManager::new(8);
        manager.register(budget("retries", BudgetType::Retries, 0)).await.unwrap();
        let manager = Arc::new(manager);
        let enforcer = BudgetPolicyEnforcer::new(manager);
        enforcer
            .register(BudgetPolicyRule {
                id: "block-retries".to_string(),
                priority: 10,
                budget_types: vec![BudgetType::Retries],
                action: EnforcementAction::Block,
                enabled: false,
            })
            .await;

        let decision = enforcer.evaluate(&BudgetRequest { count_delta: 1, ..Default::default() }).await;
        assert!(decision.allowed);
        assert!(decision.policy_id.is_none());
    }
}
