//! Position cache: the only state the decision core reads. One writer per
//! key (the indexer); the decision core never writes position entries.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};
use crate::store::CacheStore;
use crate::types::CachedPosition;

pub fn position_key(owner: &str) -> String {
    format!("position:{owner}")
}

pub fn wallet_key(wallet: &str) -> String {
    format!("wallet_to_owner:{wallet}")
}

pub fn card_token_key(card_token: &str) -> String {
    format!("card_token_to_owner:{card_token}")
}

pub struct PositionCache {
    store: Arc<dyn CacheStore>,
    staleness_horizon: Duration,
}

impl PositionCache {
    pub fn new(store: Arc<dyn CacheStore>, staleness_horizon: Duration) -> Self {
        Self {
            store,
            staleness_horizon,
        }
    }

    pub fn staleness_horizon_secs(&self) -> i64 {
        self.staleness_horizon.as_secs() as i64
    }

    pub async fn get_position(&self, owner: &str) -> CoreResult<Option<CachedPosition>> {
        let raw = self.store.get(&position_key(owner)).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(|e| CoreError::Store(e.to_string())))
            .transpose()
    }

    /// Write the position entry and its wallet mapping in one pipeline.
    /// Writes are skipped when the stored version is newer, so a slow
    /// full-scan never clobbers a fresher subscription write.
    pub async fn put_position(&self, position: &CachedPosition) -> CoreResult<()> {
        if let Some(existing) = self.get_position(&position.owner).await? {
            if existing.version > position.version {
                return Ok(());
            }
        }
        let raw = serde_json::to_string(position).map_err(|e| CoreError::Store(e.to_string()))?;
        self.store
            .set_many(
                &[
                    (position_key(&position.owner), raw),
                    (wallet_key(&position.owner), position.owner.clone()),
                ],
                None,
            )
            .await
    }

    pub async fn owner_for_card(&self, card_token: &str) -> CoreResult<Option<String>> {
        self.store.get(&card_token_key(card_token)).await
    }

    /// Registered by the external enrollment service through the gateway.
    pub async fn link_card(&self, card_token: &str, owner: &str) -> CoreResult<()> {
        self.store
            .set_many(&[(card_token_key(card_token), owner.to_string())], None)
            .await
    }
}
