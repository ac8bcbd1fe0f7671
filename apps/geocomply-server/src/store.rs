//! Analysis status store
//!
//! Handlers receive the store through `AppState`, so tests can swap in
//! their own implementation.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_types::{AnalysisResponse, ComplianceRecord};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// One submitted analysis and its outcome
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisEntry {
    pub id: Uuid,
    pub status: AnalysisStatus,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub response: Option<AnalysisResponse>,
}

impl AnalysisEntry {
    /// The record of a completed analysis
    pub fn record(&self) -> Option<&ComplianceRecord> {
        match self.status {
            AnalysisStatus::Completed => self.response.as_ref().and_then(AnalysisResponse::record),
            _ => None,
        }
    }
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Register a new analysis in the `queued` state
    async fn create(&self, question: &str, jurisdiction: Option<&str>) -> AnalysisEntry;

    async fn mark_running(&self, id: Uuid) -> Option<AnalysisEntry>;

    /// Store the outcome; `completed` on success, `failed` on an error envelope
    async fn finish(&self, id: Uuid, response: AnalysisResponse) -> Option<AnalysisEntry>;

    async fn get(&self, id: Uuid) -> Option<AnalysisEntry>;

    /// All entries, oldest first
    async fn list(&self) -> Vec<AnalysisEntry>;
}

/// Entries kept by [`InMemoryAnalysisStore::new`]
pub const DEFAULT_CAPACITY: usize = 1000;

/// Process-local store; contents are lost on restart.
///
/// Holds at most `capacity` entries. Creating one more evicts the oldest.
#[derive(Debug)]
pub struct InMemoryAnalysisStore {
    inner: RwLock<Entries>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct Entries {
    by_id: HashMap<Uuid, AnalysisEntry>,
    /// Ids in creation order
    order: VecDeque<Uuid>,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Entries::default()),
            capacity: capacity.max(1),
        }
    }

    async fn update(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut AnalysisEntry) + Send,
    ) -> Option<AnalysisEntry> {
        let mut inner = self.inner.write().await;
        let entry = inner.by_id.get_mut(&id)?;
        apply(entry);
        Some(entry.clone())
    }
}

impl Default for InMemoryAnalysisStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisStore for InMemoryAnalysisStore {
    async fn create(&self, question: &str, jurisdiction: Option<&str>) -> AnalysisEntry {
        let entry = AnalysisEntry {
            id: Uuid::new_v4(),
            status: AnalysisStatus::Queued,
            question: question.to_string(),
            jurisdiction: jurisdiction.map(str::to_string),
            started_at: Utc::now(),
            finished_at: None,
            response: None,
        };

        let mut inner = self.inner.write().await;
        while inner.order.len() >= self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.by_id.remove(&oldest);
            debug!("Evicted analysis {}", oldest);
        }
        inner.order.push_back(entry.id);
        inner.by_id.insert(entry.id, entry.clone());
        entry
    }

    async fn mark_running(&self, id: Uuid) -> Option<AnalysisEntry> {
        self.update(id, |entry| entry.status = AnalysisStatus::Running)
            .await
    }

    async fn finish(&self, id: Uuid, response: AnalysisResponse) -> Option<AnalysisEntry> {
        self.update(id, |entry| {
            entry.status = if response.is_success() {
                AnalysisStatus::Completed
            } else {
                AnalysisStatus::Failed
            };
            entry.finished_at = Some(Utc::now());
            entry.response = Some(response);
        })
        .await
    }

    async fn get(&self, id: Uuid) -> Option<AnalysisEntry> {
        self.inner.read().await.by_id.get(&id).cloned()
    }

    async fn list(&self) -> Vec<AnalysisEntry> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.by_id.get(id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::ErrorEnvelope;

    #[tokio::test]
    async fn test_lifecycle_to_failed() {
        let store = InMemoryAnalysisStore::new();
        let entry = store.create("Geo ads", Some("US")).await;
        assert_eq!(entry.status, AnalysisStatus::Queued);

        let running = store.mark_running(entry.id).await.unwrap();
        assert_eq!(running.status, AnalysisStatus::Running);

        let done = store
            .finish(
                entry.id,
                AnalysisResponse::Error(ErrorEnvelope::new("assessment call failed")),
            )
            .await
            .unwrap();
        assert_eq!(done.status, AnalysisStatus::Failed);
        assert!(done.finished_at.is_some());
        assert!(done.record().is_none());
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let store = InMemoryAnalysisStore::new();
        assert!(store.get(Uuid::new_v4()).await.is_none());
        assert!(store.mark_running(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_list_is_oldest_first() {
        let store = InMemoryAnalysisStore::new();
        let first = store.create("one", None).await;
        let second = store.create("two", None).await;
        let ids: Vec<Uuid> = store.list().await.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let store = InMemoryAnalysisStore::with_capacity(2);
        let first = store.create("one", None).await;
        let second = store.create("two", None).await;
        let third = store.create("three", None).await;

        assert!(store.get(first.id).await.is_none());
        let late = AnalysisResponse::Error(ErrorEnvelope::new("late"));
        assert!(store.finish(first.id, late).await.is_none());
        let ids: Vec<Uuid> = store.list().await.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![second.id, third.id]);
    }

    #[tokio::test]
    async fn test_zero_capacity_keeps_latest() {
        let store = InMemoryAnalysisStore::with_capacity(0);
        store.create("one", None).await;
        let latest = store.create("two", None).await;
        let list = store.list().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, latest.id);
    }
}
