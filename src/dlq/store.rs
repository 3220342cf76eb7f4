//! File-per-entry JSON persistence for the dead-letter queue. Each entry
//! is written as `<dlq_path>/<id>.json`, mirroring the save/load/clear
//! pattern used for session-state persistence elsewhere in this codebase.

use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use super::types::{DlqEntry, DlqError, DlqFilter, EntryStatus};

pub struct DlqStore {
    root: PathBuf,
}

impl DlqStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    async fn ensure_root(&self) -> Result<(), DlqError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Persist a new entry, generating an id if the caller has not already
    /// assigned one.
    pub async fn add(&self, mut entry: DlqEntry) -> Result<DlqEntry, DlqError> {
        self.ensure_root().await?;
        if entry.id.trim().is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        self.write(&entry).await?;
        Ok(entry)
    }

    async fn write(&self, entry: &DlqEntry) -> Result<(), DlqError> {
        let json = serde_json::to_string_pretty(entry)
            .map_err(|e| DlqError::Malformed(e.to_string()))?;
        tokio::fs::write(self.path_for(&entry.id), json).await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<DlqEntry, DlqError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(DlqError::NotFound(id.to_string()));
        }
        let json = tokio::fs::read_to_string(&path).await?;
        serde_json::from_str(&json).map_err(|e| DlqError::Malformed(e.to_string()))
    }

    /// Lazily scan the DLQ directory, skipping (and warning on) any
    /// document that fails to parse rather than failing the whole list.
    pub async fn list(&self, filter: &DlqFilter) -> Result<Vec<DlqEntry>, DlqError> {
        self.ensure_root().await?;
        let mut read_dir = tokio::fs::read_dir(&self.root).await?;
        let mut entries = Vec::new();

        while let Some(dir_entry) = read_dir.next_entry().await? {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match tokio::fs::read_to_string(&path).await {
                Ok(json) => match serde_json::from_str::<DlqEntry>(&json) {
                    Ok(entry) => {
                        if filter.matches(&entry) {
                            entries.push(entry);
                        }
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed dlq entry"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "failed to read dlq entry"),
            }
        }

        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    pub async fn update_status(&self, id: &str, status: EntryStatus) -> Result<DlqEntry, DlqError> {
        let mut entry = self.get(id).await?;
        entry.transition(status)?;
        self.write(&entry).await?;
        Ok(entry)
    }

    pub async fn archive(&self, id: &str) -> Result<DlqEntry, DlqError> {
        self.update_status(id, EntryStatus::Archived).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), DlqError> {
        let path = self.path_for(id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlq::types::{DlqMetadata, ErrorDetails, FailureReason};
    use crate::executor::types::{Envelope, ExecutionContext, Intent};
    use chrono::Utc;
    use std::collections::HashMap;

    fn sample_entry() -> DlqEntry {
        DlqEntry {
            id: String::new(),
            run_id: "run-1".to_string(),
            created_at: Utc::now(),
            envelope: Envelope {
                mova_version: "3.1".to_string(),
                intent: Intent {
                    name: "test".to_string(),
                    version: "1".to_string(),
                    retry: None,
                    tags: vec![],
                    description: None,
                    timeout: None,
                },
                payload: HashMap::new(),
                actions: vec![],
                variables: HashMap::new(),
                secrets: HashMap::new(),
            },
            context: ExecutionContext::new("run-1", "test"),
            failed_action: Some("fetch".to_string()),
            error_details: ErrorDetails {
                last_error: "boom".to_string(),
                history: vec!["boom".to_string()],
                failure_reason: FailureReason::MaxRetriesExceeded,
                attempts: 3,
                retry_policy: None,
                stack_trace: None,
            },
            metadata: DlqMetadata {
                source: "executor".to_string(),
                priority: 0,
                workflow_type: "test".to_string(),
                retry_count: 0,
                last_retry_at: None,
                tags: vec![],
                user_id: None,
            },
            status: EntryStatus::Active,
        }
    }

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = DlqStore::new(dir.path());
        let added = store.add(sample_entry()).await.unwrap();
        let fetched = store.get(&added.id).await.unwrap();
        assert_eq!(fetched.run_id, added.run_id);
    }

    #[tokio::test]
    async fn list_skips_malformed_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = DlqStore::new(dir.path());
        store.add(sample_entry()).await.unwrap();

        tokio::fs::write(dir.path().join("garbage.json"), "{not valid json")
            .await
            .unwrap();

        let entries = store.list(&DlqFilter::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn status_transitions_enforce_state_machine() {
        let dir = tempfile::tempdir().unwrap();
        let store = DlqStore::new(dir.path());
        let added = store.add(sample_entry()).await.unwrap();

        let retrying = store.update_status(&added.id, EntryStatus::Retrying).await.unwrap();
        assert_eq!(retrying.status, EntryStatus::Retrying);

        let resolved = store.update_status(&added.id, EntryStatus::Resolved).await.unwrap();
        assert_eq!(resolved.status, EntryStatus::Resolved);

        let err = store.update_status(&added.id, EntryStatus::Retrying).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DlqStore::new(dir.path());
        let added = store.add(sample_entry()).await.unwrap();
        store.delete(&added.id).await.unwrap();
        assert!(store.get(&added.id).await.is_err());
    }
}
