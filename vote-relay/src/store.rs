//! Store Client boundary.
//!
//! The relay never owns vote data: it appends records with
//! [`VoteStore::insert_one`] and reads them back with [`VoteStore::find`].
//! [`proxy::ProxyStore`](crate::proxy::ProxyStore) talks to the remote
//! resource proxy, [`MemoryStore`] keeps records in-process, and
//! [`BoundedStore`] puts a deadline on whichever one is in use.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    pub poll_id: String,
    pub option_id: String,
    pub timestamp: DateTime<Utc>,
}

impl VoteRecord {
    pub fn now(poll_id: impl Into<String>, option_id: impl Into<String>) -> Self {
        Self {
            poll_id: poll_id.into(),
            option_id: option_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A vote as read back for tallying.
///
/// Only the option id is interpreted. Stored documents may have been
/// written by other clients with other timestamp encodings, so everything
/// else in them is ignored. `option_id` is `None` when the document has no
/// string or numeric `optionId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVote {
    pub option_id: Option<String>,
}

impl StoredVote {
    pub fn from_document(document: &Value) -> Self {
        let option_id = match document.get("optionId") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        Self { option_id }
    }
}

impl From<&VoteRecord> for StoredVote {
    fn from(record: &VoteRecord) -> Self {
        Self {
            option_id: Some(record.option_id.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoteFilter {
    pub poll_id: String,
}

impl VoteFilter {
    pub fn poll(poll_id: impl Into<String>) -> Self {
        Self {
            poll_id: poll_id.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed store response: {0}")]
    Malformed(String),

    #[error("store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Appends one record. Not idempotent: calling twice stores two votes.
    async fn insert_one(&self, record: &VoteRecord) -> Result<(), StoreError>;

    /// Returns at most `limit` records matching `filter`.
    async fn find(&self, filter: &VoteFilter, limit: usize) -> Result<Vec<StoredVote>, StoreError>;
}

/// Applies a fixed deadline to every call on the wrapped store.
///
/// A stuck store call fails with [`StoreError::Timeout`] instead of holding
/// a poll's vote queue forever.
pub struct BoundedStore {
    inner: Arc<dyn VoteStore>,
    timeout: Duration,
}

impl BoundedStore {
    pub fn new(inner: Arc<dyn VoteStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl VoteStore for BoundedStore {
    async fn insert_one(&self, record: &VoteRecord) -> Result<(), StoreError> {
        match tokio::time::timeout(self.timeout, self.inner.insert_one(record)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    async fn find(&self, filter: &VoteFilter, limit: usize) -> Result<Vec<StoredVote>, StoreError> {
        match tokio::time::timeout(self.timeout, self.inner.find(filter, limit)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

/// In-process append-only vote collection, used when no remote store is
/// configured and by tests.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<VoteRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<VoteRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl VoteStore for MemoryStore {
    async fn insert_one(&self, record: &VoteRecord) -> Result<(), StoreError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn find(&self, filter: &VoteFilter, limit: usize) -> Result<Vec<StoredVote>, StoreError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|record| record.poll_id == filter.poll_id)
            .take(limit)
            .map(StoredVote::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct StalledStore;

    #[async_trait]
    impl VoteStore for StalledStore {
        async fn insert_one(&self, _record: &VoteRecord) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn find(
            &self,
            _filter: &VoteFilter,
            _limit: usize,
        ) -> Result<Vec<StoredVote>, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn memory_store_filters_and_limits() {
        let store = MemoryStore::new();
        for option in ["a", "b", "c"] {
            store
                .insert_one(&VoteRecord::now("p1", option))
                .await
                .expect("insert");
        }
        store
            .insert_one(&VoteRecord::now("p2", "a"))
            .await
            .expect("insert");

        let found = store.find(&VoteFilter::poll("p1"), 2).await.expect("find");
        let options: Vec<&str> = found
            .iter()
            .filter_map(|vote| vote.option_id.as_deref())
            .collect();
        assert_eq!(options, vec!["a", "b"]);

        let other = store.find(&VoteFilter::poll("p2"), 10).await.expect("find");
        assert_eq!(other.len(), 1);
    }

    #[tokio::test]
    async fn bounded_store_times_out_stalled_calls() {
        let store = BoundedStore::new(Arc::new(StalledStore), Duration::from_millis(20));

        let insert = store.insert_one(&VoteRecord::now("p1", "a")).await;
        assert!(matches!(insert, Err(StoreError::Timeout(_))));

        let find = store.find(&VoteFilter::poll("p1"), 10).await;
        assert!(matches!(find, Err(StoreError::Timeout(_))));
    }

    #[test]
    fn record_uses_camel_case_fields() {
        let record = VoteRecord::now("p1", "b");
        let value = serde_json::to_value(&record).expect("encode");
        assert_eq!(value["pollId"], "p1");
        assert_eq!(value["optionId"], "b");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn stored_vote_reads_only_the_option_id() {
        let documents = [
            json!({ "pollId": "p1", "optionId": "b", "timestamp": 1714557600000u64 }),
            json!({ "optionId": "b", "timestamp": { "$date": "2024-05-01T10:00:00Z" } }),
            json!({ "optionId": 2 }),
            json!({ "pollId": "p1", "optionId": null }),
            json!("b"),
        ];

        let options: Vec<Option<String>> = documents
            .iter()
            .map(|document| StoredVote::from_document(document).option_id)
            .collect();
        assert_eq!(
            options,
            vec![
                Some("b".to_string()),
                Some("b".to_string()),
                Some("2".to_string()),
                None,
                None
            ]
        );
    }
}
