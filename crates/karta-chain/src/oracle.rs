//! RPC-backed oracle adapter reading Pyth price accounts; the on-chain
//! parser is the single source of layout truth.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;

use karta_core::{OracleAdapter, OracleError, PriceData};
use karta_credit::oracle::parse_price_account;

pub struct PythRpcOracle {
    rpc: Arc<RpcClient>,
    /// asset id (mint base58) -> price account
    feeds: HashMap<String, Pubkey>,
}

impl PythRpcOracle {
    pub fn new(rpc: Arc<RpcClient>, feeds: HashMap<String, Pubkey>) -> Self {
        Self { rpc, feeds }
    }
}

#[async_trait]
impl OracleAdapter for PythRpcOracle {
    async fn get_price(&self, asset: &str) -> Result<PriceData, OracleError> {
        let feed = self
            .feeds
            .get(asset)
            .ok_or_else(|| OracleError::Unavailable(format!("no feed configured for {asset}")))?;
        let data = self
            .rpc
            .get_account_data(feed)
            .await
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;
        let raw = parse_price_account(&data)
            .ok_or_else(|| OracleError::Unavailable(format!("unparseable feed {feed}")))?;
        let price_ray = raw
            .to_price_ray()
            .ok_or_else(|| OracleError::Unavailable(format!("non-positive price on {feed}")))?;
        Ok(PriceData {
            price_ray,
            publish_ts: raw.publish_time,
            confidence_bps: raw.confidence_bps(),
        })
    }

    async fn list_assets(&self) -> Vec<String> {
        self.feeds.keys().cloned().collect()
    }
}
