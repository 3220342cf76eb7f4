//! Alert dispatch: dedup/cooldown against fired alert history, fan out to
//! pluggable channels.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::{error, warn};

use crate::budget::Violation;
use crate::secrets::redact_string;

use super::types::{Alert, AlertError, AlertRule};

#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), AlertError>;
}

/// Always-available channel that logs through `tracing`, after redacting
/// the rendered body.
pub struct LogChannel;

#[async_trait]
impl AlertChannel for LogChannel {
    async fn send(&self, alert: &Alert) -> Result<(), AlertError> {
        warn!(rule_id = %alert.rule_id, subject = %alert.subject, body = %redact_string(&alert.body), "alert fired");
        Ok(())
    }
}

type AlertKey = (String, String, Option<String>);

pub struct AlertManager {
    rules: Vec<AlertRule>,
    channels: Vec<Arc<dyn AlertChannel>>,
    last_fired: RwLock<HashMap<AlertKey, DateTime<Utc>>>,
}

impl AlertManager {
    pub fn new(rules: Vec<AlertRule>, channels: Vec<Arc<dyn AlertChannel>>) -> Self {
        Self {
            rules,
            channels,
            last_fired: RwLock::new(HashMap::new()),
        }
    }

    /// Drive the manager from a Budget Manager violation channel until the
    /// sender side is dropped.
    pub async fn run(self: Arc<Self>, mut violations: mpsc::Receiver<Violation>) {
        while let Some(violation) = violations.recv().await {
            self.process_violation(violation).await;
        }
    }

    pub async fn process_violation(&self, violation: Violation) {
        let now = Utc::now();
        for rule in &self.rules {
            if !rule.applies_to(&violation) {
                continue;
            }

            let key: AlertKey = (rule.id.clone(), violation.budget_id.clone(), violation.scope_id.clone());
            {
                let last_fired = self.last_fired.read().await;
                if let Some(last) = last_fired.get(&key) {
                    if now.signed_duration_since(*last).to_std().unwrap_or(Duration::ZERO) < rule.cooldown {
                        continue;
                    }
                }
            }

            let alert = Alert {
                rule_id: rule.id.clone(),
                subject: render_template(SUBJECT_TEMPLATE, &violation, now),
                body: render_template(BODY_TEMPLATE, &violation, now),
                violation: violation.clone(),
                fired_at: now,
            };

            self.last_fired.write().await.insert(key, now);

            for channel in &self.channels {
                if let Err(e) = channel.send(&alert).await {
                    error!(rule_id = %rule.id, error = %e, "alert channel failed, continuing fan-out");
                }
            }
        }
    }

    /// Drop alert history entries older than 24 hours.
    pub async fn sweep(&self) {
        let cutoff = Utc::now() - chrono::Duration::hours(24);
        self.last_fired.write().await.retain(|_, fired_at| *fired_at >= cutoff);
    }

    pub async fn run_sweeper(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            self.sweep().await;
        }
    }
}

const SUBJECT_TEMPLATE: &str = "[{{.Severity}}] budget {{.BudgetName}} at {{.PercentUsed}}%";
const BODY_TEMPLATE: &str =
    "Budget '{{.BudgetName}}' ({{.BudgetType}}, scope {{.Scope}}/{{.ScopeId}}) is at {{.PercentUsed}}% as of {{.Timestamp}}.";

fn render_template(template: &str, violation: &Violation, now: DateTime<Utc>) -> String {
    let mut out = template.to_string();
    let replacements: [(&str, String); 6] = [
        ("{{.BudgetName}}", violation.budget_name.clone()),
        ("{{.BudgetType}}", format!("{:?}", violation.budget_type)),
        ("{{.Scope}}", format!("{:?}", violation.scope)),
        ("{{.ScopeId}}", violation.scope_id.clone().unwrap_or_default()),
        ("{{.PercentUsed}}", format!("{:.1}", violation.percent_used)),
        ("{{.Severity}}", format!("{:?}", violation.severity)),
    ];
    for (token, value) in replacements {
        out = out.replace(token, &value);
    }
    out.replace("{{.Timestamp}}", &now.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetScope, BudgetType, ViolationSeverity};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        count: AtomicUsize,
    }

    #[async_trait]
    impl AlertChannel for CountingChannel {
        async fn send(&self, _alert: &Alert) -> Result<(), AlertError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn sample_violation() -> Violation {
        Violation {
            budget_id: "b1".to_string(),
            budget_name: "global retries".to_string(),
            budget_type: BudgetType::Retries,
            scope: BudgetScope::Global,
            scope_id: None,
            severity: ViolationSeverity::Error,
            percent_used: 125.0,
            observed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn fires_once_per_cooldown_window() {
        let channel = Arc::new(CountingChannel {
            count: AtomicUsize::new(0),
        });
        let rule = AlertRule {
            id: "r1".to_string(),
            enabled: true,
            budget_type: None,
            scope: None,
            min_severity: ViolationSeverity::Warning,
            cooldown: Duration::from_secs(300),
        };
        let manager = AlertManager::new(vec![rule], vec![channel.clone()]);

        manager.process_violation(sample_violation()).await;
        manager.process_violation(sample_violation()).await;

        assert_eq!(channel.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn template_renders_known_tokens() {
        let rendered = render_template(BODY_TEMPLATE, &sample_violation(), Utc::now());
        assert!(rendered.contains("global retries"));
        assert!(!rendered.contains("{{."));
    }
}
