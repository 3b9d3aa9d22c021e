//! Store interfaces for everything the service persists off-chain, passed
//! as dependencies so tests substitute in-memory implementations and
//! production runs Redis-backed ones.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{CoreError, CoreResult};
use crate::types::{Checkpoint, CommitRecord, PendingAuthorization, StoredResponse};

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get(&self, key: &str) -> CoreResult<Option<StoredResponse>>;
    async fn put(&self, key: &str, response: &StoredResponse, ttl: Duration) -> CoreResult<()>;
}

#[async_trait]
pub trait ReplayStore: Send + Sync {
    /// Insert the (timestamp, signature) pair; false when already present.
    async fn insert(&self, timestamp: i64, signature: &str, ttl: Duration) -> CoreResult<bool>;
}

#[async_trait]
pub trait PendingAuthStore: Send + Sync {
    async fn get(&self, auth_id: &str) -> CoreResult<Option<PendingAuthorization>>;
    async fn put(&self, auth: &PendingAuthorization, ttl: Duration) -> CoreResult<()>;
    async fn mark_committed(&self, auth_id: &str, at: i64) -> CoreResult<()>;
}

/// Flat key-value surface under the position cache. `set_many` must apply
/// all entries atomically with respect to readers.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CoreResult<Option<String>>;
    async fn set_many(&self, entries: &[(String, String)], ttl: Option<Duration>) -> CoreResult<()>;
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self) -> CoreResult<Option<Checkpoint>>;
    async fn save(&self, checkpoint: &Checkpoint) -> CoreResult<()>;
}

#[async_trait]
pub trait CommitLog: Send + Sync {
    async fn append(&self, record: &CommitRecord) -> CoreResult<()>;
    async fn contains(&self, idempotency_key: &str) -> CoreResult<bool>;
    async fn range(&self, from_unix: i64, to_unix: i64) -> CoreResult<Vec<CommitRecord>>;
}

// ---------------------------------------------------------------------------
// In-memory implementations (tests, single-node runs)
// ---------------------------------------------------------------------------

fn expired(deadline: Instant) -> bool {
    Instant::now() >= deadline
}

#[derive(Default)]
pub struct MemoryIdempotencyStore {
    entries: DashMap<String, (StoredResponse, Instant)>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn get(&self, key: &str) -> CoreResult<Option<StoredResponse>> {
        if let Some(entry) = self.entries.get(key) {
            let (response, deadline) = entry.value();
            if !expired(*deadline) {
                return Ok(Some(response.clone()));
            }
        }
        self.entries.remove_if(key, |_, (_, deadline)| expired(*deadline));
        Ok(None)
    }

    async fn put(&self, key: &str, response: &StoredResponse, ttl: Duration) -> CoreResult<()> {
        self.entries
            .insert(key.to_string(), (response.clone(), Instant::now() + ttl));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryReplayStore {
    seen: DashMap<String, Instant>,
}

impl MemoryReplayStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReplayStore for MemoryReplayStore {
    async fn insert(&self, timestamp: i64, signature: &str, ttl: Duration) -> CoreResult<bool> {
        let key = format!("{timestamp}:{signature}");
        let deadline = Instant::now() + ttl;
        let mut fresh = false;
        let mut entry = self.seen.entry(key).or_insert_with(|| {
            fresh = true;
            deadline
        });
        if !fresh && expired(*entry.value()) {
            *entry.value_mut() = deadline;
            fresh = true;
        }
        Ok(fresh)
    }
}

#[derive(Default)]
pub struct MemoryPendingAuthStore {
    entries: DashMap<String, (PendingAuthorization, Instant)>,
}

impl MemoryPendingAuthStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingAuthStore for MemoryPendingAuthStore {
    async fn get(&self, auth_id: &str) -> CoreResult<Option<PendingAuthorization>> {
        Ok(self
            .entries
            .get(auth_id)
            .filter(|e| !expired(e.value().1))
            .map(|e| e.value().0.clone()))
    }

    async fn put(&self, auth: &PendingAuthorization, ttl: Duration) -> CoreResult<()> {
        self.entries
            .insert(auth.auth_id.clone(), (auth.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn mark_committed(&self, auth_id: &str, at: i64) -> CoreResult<()> {
        if let Some(mut entry) = self.entries.get_mut(auth_id) {
            entry.value_mut().0.committed_at = Some(at);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, (String, Option<Instant>)>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self
            .entries
            .get(key)
            .filter(|e| e.value().1.map_or(true, |d| !expired(d)))
            .map(|e| e.value().0.clone()))
    }

    async fn set_many(&self, entries: &[(String, String)], ttl: Option<Duration>) -> CoreResult<()> {
        let deadline = ttl.map(|t| Instant::now() + t);
        for (key, value) in entries {
            self.entries.insert(key.clone(), (value.clone(), deadline));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCheckpointStore {
    checkpoint: RwLock<Option<Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> CoreResult<Option<Checkpoint>> {
        Ok(self
            .checkpoint
            .read()
            .map_err(|e| CoreError::Store(e.to_string()))?
            .clone())
    }

    async fn save(&self, checkpoint: &Checkpoint) -> CoreResult<()> {
        *self
            .checkpoint
            .write()
            .map_err(|e| CoreError::Store(e.to_string()))? = Some(checkpoint.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCommitLog {
    records: RwLock<Vec<CommitRecord>>,
}

impl MemoryCommitLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommitLog for MemoryCommitLog {
    async fn append(&self, record: &CommitRecord) -> CoreResult<()> {
        self.records
            .write()
            .map_err(|e| CoreError::Store(e.to_string()))?
            .push(record.clone());
        Ok(())
    }

    async fn contains(&self, idempotency_key: &str) -> CoreResult<bool> {
        Ok(self
            .records
            .read()
            .map_err(|e| CoreError::Store(e.to_string()))?
            .iter()
            .any(|r| r.idempotency_key == idempotency_key))
    }

    async fn range(&self, from_unix: i64, to_unix: i64) -> CoreResult<Vec<CommitRecord>> {
        Ok(self
            .records
            .read()
            .map_err(|e| CoreError::Store(e.to_string()))?
            .iter()
            .filter(|r| r.committed_at >= from_unix && r.committed_at < to_unix)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replay_store_detects_duplicates() {
        let store = MemoryReplayStore::new();
        let ttl = Duration::from_secs(60);
        assert!(store.insert(1_700_000_000, "sig_a", ttl).await.unwrap());
        assert!(!store.insert(1_700_000_000, "sig_a", ttl).await.unwrap());
        // a different signature at the same timestamp is fine
        assert!(store.insert(1_700_000_000, "sig_b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_idempotency_ttl_expires() {
        let store = MemoryIdempotencyStore::new();
        let response = StoredResponse {
            status: 200,
            body: serde_json::json!({"approved": true}),
        };
        store
            .put("k", &response, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(store.get("k").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_log_window() {
        let log = MemoryCommitLog::new();
        for (i, at) in [100i64, 200, 300].iter().enumerate() {
            log.append(&CommitRecord {
                idempotency_key: format!("k{i}"),
                auth_id: format!("auth_{i}"),
                owner: "owner".into(),
                kind: crate::types::CommitKind::RecordDebt,
                amount_usd_micro: 1,
                signature: "sig".into(),
                slot: i as u64,
                committed_at: *at,
            })
            .await
            .unwrap();
        }
        assert_eq!(log.range(100, 300).await.unwrap().len(), 2);
        assert!(log.contains("k1").await.unwrap());
        assert!(!log.contains("missing").await.unwrap());
    }
}
