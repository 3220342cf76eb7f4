//! Retry decision loop: computes the next delay or a stop reason, honoring
//! max attempts and (if supplied) Budget Manager permission.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::budget::{BudgetManager, BudgetRequest, BudgetType};

use super::backoff::{BackoffKind, BackoffStrategy};

/// Inline retry policy attached to an action or workflow; takes precedence
/// over any policy-matched profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    pub delay: Duration,
    pub max_delay: Option<Duration>,
    pub jitter: bool,
    /// Exponential backoff multiplier. Not part of an envelope-authored
    /// inline policy's field set (§3); defaults to 2.0 for those. A
    /// matcher-selected `RetryProfile` carries its own `backoff_multiplier`
    /// through here via `to_policy`.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Exact jitter fraction from a `RetryProfile`, when one governs this
    /// retry. `None` falls back to the fixed 0.2 fraction used for an
    /// inline policy's boolean `jitter` flag.
    #[serde(default)]
    pub jitter_fraction: Option<f64>,
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffKind::Exponential,
            delay: Duration::from_secs(2),
            max_delay: Some(Duration::from_secs(60)),
            jitter: true,
            multiplier: default_multiplier(),
            jitter_fraction: None,
        }
    }
}

impl RetryPolicy {
    fn strategy(&self) -> BackoffStrategy {
        let max_delay = self.max_delay.unwrap_or(self.delay);
        let strategy = BackoffStrategy {
            kind: self.backoff,
            initial_delay: self.delay,
            max_delay,
            multiplier: self.multiplier,
            jitter: 0.0,
        };
        if self.jitter {
            strategy.with_jitter(self.jitter_fraction.unwrap_or(0.2))
        } else {
            strategy
        }
    }
}

/// Named retry profile, selected indirectly via a Policy's
/// `retry_profile` field rather than attached directly to an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryProfile {
    pub name: String,
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: f64,
    pub timeout: Duration,
}

impl RetryProfile {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            backoff: BackoffKind::Exponential,
            delay: self.initial_delay,
            max_delay: Some(self.max_delay),
            jitter: self.jitter > 0.0,
            multiplier: self.backoff_multiplier,
            jitter_fraction: Some(self.jitter),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    MaxAttemptsReached,
    BudgetBlocked,
    Cancelled,
}

#[derive(Debug, Clone)]
pub enum RetryDecision {
    Retry(Duration),
    Stop(StopReason),
}

/// Stateless scheduler: all per-run state (attempt count) lives with the
/// caller (the Workflow Executor's action loop).
pub struct RetryScheduler;

impl RetryScheduler {
    /// Decide whether attempt `attempt + 1` should proceed, consulting the
    /// Budget Manager (if supplied) for a `retries` budget before
    /// committing to another attempt.
    pub async fn next(
        attempt: u32,
        policy: &RetryPolicy,
        budget: Option<(&BudgetManager, BudgetRequest)>,
    ) -> RetryDecision {
        if attempt >= policy.max_attempts {
            return RetryDecision::Stop(StopReason::MaxAttemptsReached);
        }

        if let Some((manager, mut request)) = budget {
            request.budget_type = Some(BudgetType::Retries);
            request.count_delta = request.count_delta.max(1);
            let response = manager.check(&request).await;
            if !response.allowed {
                return RetryDecision::Stop(StopReason::BudgetBlocked);
            }
            manager.record(&request).await;
        }

        RetryDecision::Retry(policy.strategy().delay_for(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stops_at_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 2,
            ..Default::default()
        };
        let decision = RetryScheduler::next(2, &policy, None).await;
        assert!(matches!(decision, RetryDecision::Stop(StopReason::MaxAttemptsReached)));
    }

    #[tokio::test]
    async fn retries_when_under_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            jitter: false,
            ..Default::default()
        };
        let decision = RetryScheduler::next(0, &policy, None).await;
        assert!(matches!(decision, RetryDecision::Retry(_)));
    }

    #[test]
    fn profile_multiplier_and_jitter_fraction_survive_conversion() {
        let profile = RetryProfile {
            name: "aggressive".to_string(),
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 3.0,
            jitter: 0.1,
            timeout: Duration::from_secs(120),
        };
        let policy = profile.to_policy();
        assert_eq!(policy.multiplier, 3.0);
        assert_eq!(policy.jitter_fraction, Some(0.1));
        assert_eq!(policy.strategy().base_delay(3), Duration::from_secs(9));
    }

    #[tokio::test]
    async fn budget_denial_stops_retry() {
        let (manager, _rx) = BudgetManager::new(4);
        let budget = crate::budget::Budget {
            id: "r1".into(),
            name: "retries".into(),
            budget_type: BudgetType::Retries,
            scope: crate::budget::BudgetScope::Global,
            scope_id: None,
            max_count: Some(0),
            max_duration: None,
            max_memory: None,
            max_cpu: None,
            time_window: crate::budget::TimeWindow::Hour,
            enabled: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        manager.register(budget).await.unwrap();

        let policy = RetryPolicy::default();
        let decision = RetryScheduler::next(0, &policy, Some((&manager, BudgetRequest::default()))).await;
        assert!(matches!(decision, RetryDecision::Stop(StopReason::BudgetBlocked)));
    }
}
