//! Position indexer: scans program accounts, recomputes derived quantities
//! at the current oracle snapshot, and writes them to the position cache.
//! Cold start is a full scan; subsequent ticks rescan and advance the slot
//! checkpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

use karta_core::store::CheckpointStore;
use karta_core::types::{CachedPosition, Checkpoint};
use karta_core::{CoreError, CoreResult, OracleAdapter, OracleError, PositionCache, PositionRefresher};
use karta_credit::constants::BPS_DENOMINATOR;
use karta_credit::math;
use karta_credit::state::{CollateralAsset, Config, Position};

use crate::client::ChainClient;
use crate::error::ChainError;

pub struct Indexer {
    client: Arc<ChainClient>,
    oracle: Arc<dyn OracleAdapter>,
    cache: Arc<PositionCache>,
    checkpoints: Arc<dyn CheckpointStore>,
    interval: Duration,
}

impl Indexer {
    pub fn new(
        client: Arc<ChainClient>,
        oracle: Arc<dyn OracleAdapter>,
        cache: Arc<PositionCache>,
        checkpoints: Arc<dyn CheckpointStore>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            oracle,
            cache,
            checkpoints,
            interval,
        })
    }

    pub async fn run(self: Arc<Self>) {
        info!(program = %self.client.program_id(), "indexer starting with a full scan");
        loop {
            if let Err(err) = self.scan().await {
                warn!(%err, "indexer scan failed; retrying next tick");
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    pub async fn scan(&self) -> Result<(), ChainError> {
        let slot = self.client.get_slot().await?;
        let config = self.client.fetch_config().await?;
        let positions = self.client.fetch_all_positions().await?;
        let now = chrono::Utc::now().timestamp();

        let mut whitelists: HashMap<Pubkey, CollateralAsset> = HashMap::new();
        for (address, position) in &positions {
            let entry = self
                .compute_entry(position, &config, now, &mut whitelists)
                .await?;
            if let Err(err) = self.cache.put_position(&entry).await {
                warn!(position = %address, %err, "cache write failed");
            }
        }
        self.checkpoints
            .save(&Checkpoint {
                program_id: self.client.program_id().to_string(),
                last_processed_slot: slot,
            })
            .await
            .map_err(ChainError::Core)?;
        debug!(slot, count = positions.len(), "scan complete");
        Ok(())
    }

    /// Synchronous single-owner refresh for decision-path cache misses.
    pub async fn refresh_owner(&self, owner: &Pubkey) -> Result<Option<CachedPosition>, ChainError> {
        let position = match self.client.fetch_position(owner).await? {
            Some(position) => position,
            None => return Ok(None),
        };
        let config = self.client.fetch_config().await?;
        let now = chrono::Utc::now().timestamp();
        let mut whitelists = HashMap::new();
        let entry = self
            .compute_entry(&position, &config, now, &mut whitelists)
            .await?;
        self.cache.put_position(&entry).await.map_err(ChainError::Core)?;
        Ok(Some(entry))
    }

    async fn compute_entry(
        &self,
        position: &Position,
        config: &Config,
        now: i64,
        whitelists: &mut HashMap<Pubkey, CollateralAsset>,
    ) -> Result<CachedPosition, ChainError> {
        let index = math::compound_index(
            config.global_borrow_index,
            config.interest_rate_bps,
            now.saturating_sub(config.last_update_timestamp),
        )
        .map_err(|e| ChainError::Decode(e.to_string()))?;
        let debt = position
            .current_debt_usd_micro(index)
            .map_err(|e| ChainError::Decode(e.to_string()))?;

        let mut collateral_value: u64 = 0;
        let mut borrow_limit: u64 = 0;
        let mut liquidation_value: u64 = 0;
        let mut oracle_stale = false;

        for entry in &position.collateral {
            let whitelist = match whitelists.get(&entry.mint) {
                Some(whitelist) => whitelist.clone(),
                None => {
                    let fetched = self.client.fetch_whitelist(&entry.mint).await?;
                    whitelists.insert(entry.mint, fetched.clone());
                    fetched
                }
            };
            let price = match self.oracle.get_price(&entry.mint.to_string()).await {
                Ok(price) => price,
                Err(OracleError::Stale { .. }) | Err(OracleError::LowConfidence { .. }) => {
                    oracle_stale = true;
                    continue;
                }
                Err(OracleError::Unavailable(reason)) => {
                    warn!(mint = %entry.mint, %reason, "oracle unavailable; marking entry stale");
                    oracle_stale = true;
                    continue;
                }
            };
            let value = math::asset_to_usd_micro(entry.amount, price.price_ray, whitelist.decimals)
                .map_err(|e| ChainError::Decode(e.to_string()))?;
            collateral_value = collateral_value.saturating_add(value);
            borrow_limit = borrow_limit.saturating_add(
                math::apply_bps(value, whitelist.effective_ltv_bps() as u64)
                    .map_err(|e| ChainError::Decode(e.to_string()))?,
            );
            liquidation_value = liquidation_value.saturating_add(
                math::apply_bps(value, whitelist.effective_liquidation_threshold_bps() as u64)
                    .map_err(|e| ChainError::Decode(e.to_string()))?,
            );
        }

        let health_factor_bps = if debt == 0 {
            u64::MAX
        } else {
            ((liquidation_value as u128) * BPS_DENOMINATOR as u128 / debt as u128)
                .min(u64::MAX as u128) as u64
        };

        Ok(CachedPosition {
            owner: position.owner.to_string(),
            collateral_value_usd_micro: collateral_value,
            debt_usd_micro: debt,
            available_credit_usd_micro: borrow_limit.saturating_sub(debt),
            health_factor_bps,
            index_snapshot: index,
            version: position.last_update_timestamp,
            as_of_unix: now,
            oracle_stale,
        })
    }
}

/// Decision-core hook: refresh a missed or stale cache entry synchronously,
/// inside the request deadline.
pub struct IndexerRefresher(pub Arc<Indexer>);

#[async_trait]
impl PositionRefresher for IndexerRefresher {
    async fn refresh(&self, owner: &str) -> CoreResult<Option<CachedPosition>> {
        let owner: Pubkey = owner
            .parse()
            .map_err(|_| CoreError::Internal(format!("invalid owner pubkey {owner}")))?;
        self.0
            .refresh_owner(&owner)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }
}
