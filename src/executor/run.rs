//! Workflow Executor (C8) — orchestrates one envelope's actions in order,
//! with nested timeouts, retries, and DLQ hand-off on terminal failure.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::budget::{BudgetManager, BudgetRequest, BudgetType};
use crate::config::EngineConfig;
use crate::dlq::{DlqEntry, DlqError, DlqMetadata, DlqStore, EntryStatus, ErrorDetails, FailureReason};
use crate::policy::{FailureContext, Policy, PolicyMatcher};
use crate::retry::{RetryDecision, RetryPolicy, RetryProfile, RetryScheduler, StopReason};

use super::actions::{dispatch, ActionDeps};
use super::cancellation::{CancellationScope, ScopeOutcome};
use super::types::{ActionResult, ActionStatus, Envelope, ExecutionContext, LogRecord, RunStatus};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Dlq(#[from] DlqError),
}

/// Orchestrates envelope runs. Holds the shared, process-wide registries
/// every run consults: budgets, DLQ storage, and retry-selection policies.
pub struct WorkflowExecutor {
    config: EngineConfig,
    budgets: Arc<BudgetManager>,
    dlq: DlqStore,
    policies: RwLock<Vec<Policy>>,
    retry_profiles: RwLock<HashMap<String, RetryProfile>>,
    http_client: reqwest::Client,
    runs: RwLock<HashMap<String, ExecutionContext>>,
    scopes: RwLock<HashMap<String, CancellationScope>>,
}

impl WorkflowExecutor {
    pub fn new(config: EngineConfig, budgets: Arc<BudgetManager>) -> Self {
        let dlq = DlqStore::new(config.dlq_path.clone());
        let redirect_policy = if config.security.follow_redirects {
            reqwest::redirect::Policy::default()
        } else {
            reqwest::redirect::Policy::none()
        };
        let http_client = reqwest::Client::builder()
            .redirect(redirect_policy)
            .build()
            .expect("failed to build http client");
        Self {
            http_client,
            dlq,
            budgets,
            policies: RwLock::new(Vec::new()),
            retry_profiles: RwLock::new(HashMap::new()),
            runs: RwLock::new(HashMap::new()),
            scopes: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub async fn register_policy(&self, policy: Policy) {
        self.policies.write().await.push(policy);
    }

    pub async fn register_retry_profile(&self, profile: RetryProfile) {
        self.retry_profiles.write().await.insert(profile.name.clone(), profile);
    }

    /// Resolve the retry profile a Policy-matcher selects for a failure,
    /// falling back to the engine-wide default policy when nothing matches
    /// or the matched profile name is unregistered.
    async fn resolve_policy_retry(&self, failure: &FailureContext) -> Option<RetryProfile> {
        let policies = self.policies.read().await;
        let matched = PolicyMatcher::match_policy(&policies, failure)?;
        let profiles = self.retry_profiles.read().await;
        profiles.get(&matched.retry_profile).cloned()
    }

    /// Signal cancellation for an in-flight run. Returns `false` if the
    /// run is unknown (never started, or the executor was restarted).
    pub async fn cancel(&self, run_id: &str) -> bool {
        match self.scopes.read().await.get(run_id) {
            Some(scope) => {
                scope.cancel();
                true
            }
            None => false,
        }
    }

    /// Run one envelope to completion (or terminal failure), honoring the
    /// caller-supplied cancellation scope and the workflow-level timeout
    /// from the security policy. The run is tagged with a fresh uuid.
    pub async fn execute(
        &self,
        envelope: Envelope,
        caller_scope: Option<&CancellationScope>,
    ) -> ExecutionContext {
        self.execute_tagged(Uuid::new_v4().to_string(), envelope, caller_scope).await
    }

    /// Run one envelope to completion under a caller-supplied `run_id`.
    /// Used directly by `retry_from_dlq` (§4.8a) to tag a DLQ retry's fresh
    /// run as `retry_run_<orig>_<timestamp>` instead of an untagged uuid.
    #[instrument(skip(self, envelope, caller_scope), fields(workflow = %envelope.intent.name, run_id = %run_id))]
    pub async fn execute_tagged(
        &self,
        run_id: String,
        envelope: Envelope,
        caller_scope: Option<&CancellationScope>,
    ) -> ExecutionContext {
        let workflow_timeout = envelope.intent.timeout.unwrap_or(self.config.security.workflow_timeout);
        let workflow_scope = match caller_scope {
            Some(parent) => parent.child(Some(workflow_timeout)),
            None => CancellationScope::new(Some(workflow_timeout)),
        };
        self.scopes.write().await.insert(run_id.clone(), workflow_scope.clone());

        let mut ctx = ExecutionContext::new(run_id.clone(), envelope.intent.name.clone());
        ctx.status = RunStatus::Running;
        ctx.variables.extend(envelope.variables.clone());
        ctx.variables.insert(
            "payload".to_string(),
            serde_json::Value::Object(envelope.payload.clone().into_iter().collect()),
        );

        let deps = ActionDeps {
            http_client: self.http_client.clone(),
            security: self.config.security.clone(),
        };

        let mut failed_action: Option<String> = None;
        let mut terminal_error: Option<(String, FailureReason)> = None;

        for action in &envelope.actions {
            if workflow_scope.is_expired() {
                terminal_error = Some(("workflow timeout exceeded".to_string(), FailureReason::Timeout));
                break;
            }
            if workflow_scope.is_cancelled() {
                ctx.status = RunStatus::Cancelled;
                break;
            }

            if !action.enabled {
                ctx.results.push(ActionResult {
                    action_name: action.name.clone(),
                    status: ActionStatus::Skipped,
                    start_time: Utc::now(),
                    end_time: Some(Utc::now()),
                    output: HashMap::new(),
                    error: String::new(),
                    attempts: 0,
                });
                continue;
            }

            let action_scope = workflow_scope.child(action.timeout);
            let (result, failure) = self
                .run_action_with_retries(action, &mut ctx, &deps, &action_scope)
                .await;

            self.log(&mut ctx, &result);
            ctx.results.push(result);

            if let Some((message, reason)) = failure {
                failed_action = Some(action.name.clone());
                terminal_error = Some((message, reason));
                break;
            }
        }

        ctx.end_time = Some(Utc::now());
        if let Some((message, reason)) = terminal_error {
            ctx.status = RunStatus::Failed;
            ctx.error = Some(message.clone());
            if let Err(e) = self
                .park_in_dlq(&envelope, &ctx, failed_action, message, reason)
                .await
            {
                warn!(run_id = %run_id, error = %e, "failed to write dlq entry");
            }
        } else if ctx.status != RunStatus::Cancelled {
            ctx.status = RunStatus::Completed;
        }

        self.runs.write().await.insert(run_id, ctx.clone());
        ctx
    }

    async fn run_action_with_retries(
        &self,
        action: &super::types::ActionSpec,
        ctx: &mut ExecutionContext,
        deps: &ActionDeps,
        scope: &CancellationScope,
    ) -> (ActionResult, Option<(String, FailureReason)>) {
        let default_policy = RetryPolicy {
            max_attempts: self.config.retry_default_max_attempts,
            delay: self.config.retry_default_delay,
            ..RetryPolicy::default()
        };

        let start_time = Utc::now();
        let mut attempts = 0u32;
        let mut history = Vec::new();
        let mut policy = action.retry.clone().unwrap_or_else(|| default_policy.clone());
        let mut policy_resolved_from_failure = action.retry.is_some();
        let mut effective_scope = scope.clone();

        loop {
            attempts += 1;
            let outcome = dispatch(action, ctx, deps, &effective_scope).await;

            if outcome.status == ActionStatus::Completed {
                return (
                    ActionResult {
                        action_name: action.name.clone(),
                        status: ActionStatus::Completed,
                        start_time,
                        end_time: Some(Utc::now()),
                        output: outcome.output,
                        error: String::new(),
                        attempts,
                    },
                    None,
                );
            }

            history.push(outcome.error.clone());

            if outcome.error == "action_timeout" {
                return (
                    ActionResult {
                        action_name: action.name.clone(),
                        status: ActionStatus::Failed,
                        start_time,
                        end_time: Some(Utc::now()),
                        output: HashMap::new(),
                        error: outcome.error.clone(),
                        attempts,
                    },
                    Some((outcome.error, FailureReason::Timeout)),
                );
            }

            if !policy_resolved_from_failure {
                let failure = FailureContext {
                    error_type: Some(outcome.error.clone()),
                    http_status: None,
                    error_message: Some(outcome.error.clone()),
                    action_type: Some(action.action_type.clone()),
                    workflow_id: Some(ctx.workflow_id.clone()),
                    session_id: None,
                };
                if let Some(profile) = self.resolve_policy_retry(&failure).await {
                    policy = profile.to_policy();
                    if action.timeout.is_none() {
                        effective_scope = scope.child(Some(profile.timeout));
                    }
                }
                policy_resolved_from_failure = true;
            }

            let budget_request = BudgetRequest {
                budget_type: Some(BudgetType::Retries),
                workflow_id: Some(ctx.workflow_id.clone()),
                session_id: None,
                count_delta: 1,
                ..Default::default()
            };

            let decision = RetryScheduler::next(attempts, &policy, Some((&self.budgets, budget_request))).await;

            match decision {
                RetryDecision::Retry(delay) => {
                    info!(action = %action.name, attempt = attempts, delay_ms = delay.as_millis() as u64, "retrying action");
                    match effective_scope.run(tokio::time::sleep(delay)).await {
                        Ok(()) => continue,
                        Err(ScopeOutcome::TimedOut) => {
                            return (
                                failed_result(action, start_time, attempts, "action_timeout"),
                                Some(("action_timeout".to_string(), FailureReason::Timeout)),
                            )
                        }
                        Err(ScopeOutcome::Cancelled) => {
                            return (
                                failed_result(action, start_time, attempts, "cancelled"),
                                Some(("cancelled".to_string(), FailureReason::Fatal)),
                            )
                        }
                        Err(ScopeOutcome::Completed) => unreachable!(),
                    }
                }
                RetryDecision::Stop(StopReason::MaxAttemptsReached) => {
                    return (
                        failed_result(action, start_time, attempts, &outcome.error),
                        Some((
                            format!("max retries exceeded: {}", history.last().cloned().unwrap_or_default()),
                            FailureReason::MaxRetriesExceeded,
                        )),
                    );
                }
                RetryDecision::Stop(StopReason::BudgetBlocked) => {
                    return (
                        failed_result(action, start_time, attempts, &outcome.error),
                        Some(("retry budget exhausted".to_string(), FailureReason::BudgetBlocked)),
                    );
                }
                RetryDecision::Stop(StopReason::Cancelled) => {
                    return (
                        failed_result(action, start_time, attempts, &outcome.error),
                        Some(("cancelled".to_string(), FailureReason::Fatal)),
                    );
                }
            }
        }
    }

    fn log(&self, ctx: &mut ExecutionContext, result: &ActionResult) {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), serde_json::json!(format!("{:?}", result.status)));
        fields.insert("attempts".to_string(), serde_json::json!(result.attempts));
        if !result.error.is_empty() {
            fields.insert(
                "error".to_string(),
                serde_json::Value::String(crate::secrets::redact_string(&result.error)),
            );
        }

        tracing::info!(run_id = %ctx.run_id, action = %result.action_name, status = ?result.status, "action completed");

        ctx.logs.push(LogRecord {
            timestamp: Utc::now(),
            level: "info".to_string(),
            event: "action_completed".to_string(),
            fields,
        });
    }

    async fn park_in_dlq(
        &self,
        envelope: &Envelope,
        ctx: &ExecutionContext,
        failed_action: Option<String>,
        message: String,
        reason: FailureReason,
    ) -> Result<DlqEntry, DlqError> {
        let attempts = ctx
            .results
            .last()
            .map(|r| r.attempts)
            .unwrap_or(1);

        let entry = DlqEntry {
            id: String::new(),
            run_id: ctx.run_id.clone(),
            created_at: Utc::now(),
            envelope: envelope.clone(),
            context: ctx.clone(),
            failed_action,
            error_details: ErrorDetails {
                last_error: message.clone(),
                history: vec![message],
                failure_reason: reason,
                attempts,
                retry_policy: None,
                stack_trace: None,
            },
            metadata: DlqMetadata {
                source: "workflow_executor".to_string(),
                priority: 0,
                workflow_type: envelope.intent.name.clone(),
                retry_count: 0,
                last_retry_at: None,
                tags: envelope.intent.tags.clone(),
                user_id: None,
            },
            status: EntryStatus::Active,
        };

        self.dlq.add(entry).await
    }

    pub async fn get_status(&self, run_id: &str) -> Option<RunStatus> {
        self.runs.read().await.get(run_id).map(|ctx| ctx.status)
    }

    pub async fn get_logs(&self, run_id: &str) -> Option<Vec<LogRecord>> {
        self.runs.read().await.get(run_id).map(|ctx| ctx.logs.clone())
    }

    /// Re-execute a parked DLQ entry. `sandbox` only tags the run's
    /// metadata; handlers do not themselves branch on it (§4.8).
    pub async fn retry_from_dlq(
        &self,
        dlq_id: &str,
        sandbox: bool,
        overrides: HashMap<String, serde_json::Value>,
    ) -> Result<ExecutionContext, DlqError> {
        let mut entry = self.dlq.get(dlq_id).await?;
        entry.transition(EntryStatus::Retrying)?;
        self.dlq.update_status(dlq_id, EntryStatus::Retrying).await?;

        let mut envelope = entry.envelope.clone();
        envelope.variables.extend(overrides);
        envelope.variables.insert(
            "__retry_metadata".to_string(),
            serde_json::json!({
                "original_run_id": entry.run_id,
                "dlq_id": entry.id,
                "sandbox_mode": sandbox,
                "retry_count": entry.metadata.retry_count + 1,
            }),
        );

        let tagged_run_id = format!("retry_run_{}_{}", entry.run_id, Utc::now().timestamp());
        let ctx = self.execute_tagged(tagged_run_id, envelope, None).await;

        let next_status = if ctx.status == RunStatus::Completed {
            EntryStatus::Resolved
        } else {
            EntryStatus::Active
        };

        let mut updated = self.dlq.get(dlq_id).await?;
        updated.metadata.retry_count += 1;
        updated.metadata.last_retry_at = Some(Utc::now());
        updated.status = EntryStatus::Retrying;
        self.dlq.add(updated).await?;
        self.dlq.update_status(dlq_id, next_status).await?;

        Ok(ctx)
    }
}

fn failed_result(action: &super::types::ActionSpec, start_time: chrono::DateTime<Utc>, attempts: u32, error: &str) -> ActionResult {
    ActionResult {
        action_name: action.name.clone(),
        status: ActionStatus::Failed,
        start_time,
        end_time: Some(Utc::now()),
        output: HashMap::new(),
        error: error.to_string(),
        attempts,
    }
}
