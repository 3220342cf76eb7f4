//! End-to-end seed scenarios (black-box, against the public API).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mova_engine::budget::BudgetManager;
use mova_engine::config::EngineConfig;
use mova_engine::dlq::{DlqEntry, DlqMetadata, DlqStore, EntryStatus, ErrorDetails, FailureReason};
use mova_engine::executor::{ActionSpec, Envelope, ExecutionContext, Intent, RunStatus};
use mova_engine::retry::{BackoffKind, RetryPolicy};
use mova_engine::WorkflowExecutor;

fn envelope(actions: Vec<ActionSpec>) -> Envelope {
    Envelope {
        mova_version: "3.1".to_string(),
        intent: Intent {
            name: "e2e-workflow".to_string(),
            version: "1".to_string(),
            retry: None,
            tags: vec!["e2e".to_string()],
            description: None,
            timeout: None,
        },
        payload: HashMap::new(),
        actions,
        variables: HashMap::new(),
        secrets: HashMap::new(),
    }
}

fn failing_action(retry: RetryPolicy) -> ActionSpec {
    ActionSpec {
        action_type: "parse_json".to_string(),
        name: "extract".to_string(),
        enabled: true,
        timeout: None,
        retry: Some(retry),
        config: HashMap::new(),
    }
}

/// Seed scenario 3: retry exhausted parks a DLQ entry recording every
/// attempt. Delays are scaled down from the illustrative 1s/2s/4s example so
/// the test doesn't need seconds of wall-clock time.
#[tokio::test]
async fn retry_exhausted_parks_dlq_entry() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.dlq_path = dir.path().to_path_buf();

    let (budgets, _rx) = BudgetManager::new(8);
    let executor = WorkflowExecutor::new(config, Arc::new(budgets));

    let retry = RetryPolicy {
        max_attempts: 3,
        backoff: BackoffKind::Exponential,
        delay: Duration::from_millis(10),
        max_delay: Some(Duration::from_millis(40)),
        jitter: false,
    };
    let run_envelope = envelope(vec![failing_action(retry)]);

    let ctx = executor.execute(run_envelope, None).await;

    assert_eq!(ctx.status, RunStatus::Failed);
    assert_eq!(ctx.results.len(), 1);
    assert_eq!(ctx.results[0].attempts, 3);

    let store = DlqStore::new(dir.path());
    let entries = store.list(&Default::default()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].error_details.attempts, 3);
    assert_eq!(entries[0].error_details.failure_reason, FailureReason::MaxRetriesExceeded);
}

/// Seed scenario 6: a sandboxed retry of a parked DLQ entry carries
/// `__retry_metadata` into the new run and walks the entry's status
/// machine through retrying.
#[tokio::test]
async fn sandbox_retry_of_dlq_entry_carries_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.dlq_path = dir.path().to_path_buf();

    let (budgets, _rx) = BudgetManager::new(8);
    let executor = WorkflowExecutor::new(config, Arc::new(budgets));

    let mut set_config = HashMap::new();
    set_config.insert("variable".to_string(), serde_json::Value::String("touched".to_string()));
    set_config.insert("value".to_string(), serde_json::Value::Bool(true));
    let original_envelope = envelope(vec![ActionSpec {
        action_type: "set".to_string(),
        name: "mark".to_string(),
        enabled: true,
        timeout: None,
        retry: None,
        config: set_config,
    }]);

    let store = DlqStore::new(dir.path());
    let entry = DlqEntry {
        id: String::new(),
        run_id: "original-run-1".to_string(),
        created_at: Utc::now(),
        envelope: original_envelope,
        context: ExecutionContext::new("original-run-1", "e2e-workflow"),
        failed_action: Some("mark".to_string()),
        error_details: ErrorDetails {
            last_error: "boom".to_string(),
            history: vec!["boom".to_string()],
            failure_reason: FailureReason::Fatal,
            attempts: 1,
            retry_policy: None,
            stack_trace: None,
        },
        metadata: DlqMetadata {
            source: "test".to_string(),
            priority: 0,
            workflow_type: "e2e-workflow".to_string(),
            retry_count: 0,
            last_retry_at: None,
            tags: vec![],
            user_id: None,
        },
        status: EntryStatus::Active,
    };
    let added = store.add(entry).await.unwrap();

    let mut overrides = HashMap::new();
    overrides.insert("api_url".to_string(), serde_json::Value::String("https://test/".to_string()));

    let ctx = executor.retry_from_dlq(&added.id, true, overrides).await.unwrap();

    let metadata = ctx.variables.get("__retry_metadata").expect("retry metadata present");
    assert_eq!(metadata["sandbox_mode"], serde_json::json!(true));
    assert_eq!(metadata["original_run_id"], serde_json::json!("original-run-1"));
    assert_eq!(ctx.status, RunStatus::Completed);

    let final_entry = store.get(&added.id).await.unwrap();
    assert_ne!(final_entry.status, EntryStatus::Active);
    assert_eq!(final_entry.metadata.retry_count, 1);
}
