//! Redis-backed implementations of the store interfaces. Multi-key cache
//! writes go through an atomic pipeline so readers observe either the old or
//! the new snapshot, never a mix.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::{CoreError, CoreResult};
use crate::store::{
    CacheStore, CheckpointStore, CommitLog, IdempotencyStore, PendingAuthStore, ReplayStore,
};
use crate::types::{Checkpoint, CommitRecord, PendingAuthorization, StoredResponse};

const CHECKPOINT_KEY: &str = "karta:indexer:checkpoint";
const COMMIT_LOG_KEY: &str = "karta:commits";

fn store_err(e: redis::RedisError) -> CoreError {
    CoreError::Store(e.to_string())
}

fn json_err(e: serde_json::Error) -> CoreError {
    CoreError::Store(e.to_string())
}

#[derive(Clone)]
pub struct RedisStores {
    conn: ConnectionManager,
}

impl RedisStores {
    pub async fn connect(url: &str) -> CoreResult<Self> {
        let client = redis::Client::open(url).map_err(store_err)?;
        let conn = ConnectionManager::new(client).await.map_err(store_err)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl IdempotencyStore for RedisStores {
    async fn get(&self, key: &str) -> CoreResult<Option<StoredResponse>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(format!("karta:idem:{key}"))
            .await
            .map_err(store_err)?;
        raw.map(|s| serde_json::from_str(&s).map_err(json_err))
            .transpose()
    }

    async fn put(&self, key: &str, response: &StoredResponse, ttl: Duration) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(response).map_err(json_err)?;
        redis::cmd("SET")
            .arg(format!("karta:idem:{key}"))
            .arg(raw)
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(store_err)
    }
}

#[async_trait]
impl ReplayStore for RedisStores {
    async fn insert(&self, timestamp: i64, signature: &str, ttl: Duration) -> CoreResult<bool> {
        let mut conn = self.conn.clone();
        // SET NX EX: true only for the first writer of this pair
        let set: Option<String> = redis::cmd("SET")
            .arg(format!("karta:replay:{timestamp}:{signature}"))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(set.is_some())
    }
}

#[async_trait]
impl PendingAuthStore for RedisStores {
    async fn get(&self, auth_id: &str) -> CoreResult<Option<PendingAuthorization>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(format!("karta:pending:{auth_id}"))
            .await
            .map_err(store_err)?;
        raw.map(|s| serde_json::from_str(&s).map_err(json_err))
            .transpose()
    }

    async fn put(&self, auth: &PendingAuthorization, ttl: Duration) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(auth).map_err(json_err)?;
        redis::cmd("SET")
            .arg(format!("karta:pending:{}", auth.auth_id))
            .arg(raw)
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn mark_committed(&self, auth_id: &str, at: i64) -> CoreResult<()> {
        let mut auth = match PendingAuthStore::get(self, auth_id).await? {
            Some(auth) => auth,
            None => return Ok(()),
        };
        auth.committed_at = Some(at);
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(&auth).map_err(json_err)?;
        // KEEPTTL so the capture deadline keeps governing expiry
        redis::cmd("SET")
            .arg(format!("karta:pending:{auth_id}"))
            .arg(raw)
            .arg("KEEPTTL")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(store_err)
    }
}

#[async_trait]
impl CacheStore for RedisStores {
    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(format!("karta:cache:{key}")).await.map_err(store_err)
    }

    async fn set_many(&self, entries: &[(String, String)], ttl: Option<Duration>) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            match ttl {
                Some(ttl) => {
                    pipe.cmd("SET")
                        .arg(format!("karta:cache:{key}"))
                        .arg(value)
                        .arg("EX")
                        .arg(ttl.as_secs())
                        .ignore();
                }
                None => {
                    pipe.set(format!("karta:cache:{key}"), value).ignore();
                }
            }
        }
        pipe.query_async::<_, ()>(&mut conn).await.map_err(store_err)
    }
}

#[async_trait]
impl CheckpointStore for RedisStores {
    async fn load(&self) -> CoreResult<Option<Checkpoint>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(CHECKPOINT_KEY).await.map_err(store_err)?;
        raw.map(|s| serde_json::from_str(&s).map_err(json_err))
            .transpose()
    }

    async fn save(&self, checkpoint: &Checkpoint) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(checkpoint).map_err(json_err)?;
        conn.set(CHECKPOINT_KEY, raw).await.map_err(store_err)
    }
}

#[async_trait]
impl CommitLog for RedisStores {
    async fn append(&self, record: &CommitRecord) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(record).map_err(json_err)?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.zadd(COMMIT_LOG_KEY, raw, record.committed_at);
        pipe.sadd(format!("{COMMIT_LOG_KEY}:keys"), &record.idempotency_key);
        pipe.query_async::<_, ()>(&mut conn).await.map_err(store_err)
    }

    async fn contains(&self, idempotency_key: &str) -> CoreResult<bool> {
        let mut conn = self.conn.clone();
        conn.sismember(format!("{COMMIT_LOG_KEY}:keys"), idempotency_key)
            .await
            .map_err(store_err)
    }

    async fn range(&self, from_unix: i64, to_unix: i64) -> CoreResult<Vec<CommitRecord>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .zrangebyscore(COMMIT_LOG_KEY, from_unix, to_unix - 1)
            .await
            .map_err(store_err)?;
        raw.iter()
            .map(|s| serde_json::from_str(s).map_err(json_err))
            .collect()
    }
}
