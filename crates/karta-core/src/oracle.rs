use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy)]
pub struct PriceData {
    /// USD per whole token at ray (1e27) precision
    pub price_ray: u128,
    pub publish_ts: i64,
    pub confidence_bps: u16,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    #[error("price is {age_secs}s old, max {max_secs}s")]
    Stale { age_secs: i64, max_secs: i64 },

    #[error("confidence {confidence_bps}bps above the {max_bps}bps limit")]
    LowConfidence { confidence_bps: u16, max_bps: u16 },
}

#[async_trait]
pub trait OracleAdapter: Send + Sync {
    async fn get_price(&self, asset: &str) -> Result<PriceData, OracleError>;
    async fn list_assets(&self) -> Vec<String>;
}

/// Staleness and confidence gating over any inner adapter. The engine never
/// proceeds with a borrow-increasing decision past either failure.
pub struct GatedOracle<O> {
    inner: O,
    max_staleness_secs: i64,
    max_confidence_bps: u16,
}

impl<O> GatedOracle<O> {
    pub fn new(inner: O, max_staleness_secs: i64, max_confidence_bps: u16) -> Self {
        Self {
            inner,
            max_staleness_secs,
            max_confidence_bps,
        }
    }
}

#[async_trait]
impl<O: OracleAdapter> OracleAdapter for GatedOracle<O> {
    async fn get_price(&self, asset: &str) -> Result<PriceData, OracleError> {
        let price = self.inner.get_price(asset).await?;
        let age = chrono::Utc::now().timestamp().saturating_sub(price.publish_ts);
        if age > self.max_staleness_secs {
            return Err(OracleError::Stale {
                age_secs: age,
                max_secs: self.max_staleness_secs,
            });
        }
        if price.confidence_bps > self.max_confidence_bps {
            return Err(OracleError::LowConfidence {
                confidence_bps: price.confidence_bps,
                max_bps: self.max_confidence_bps,
            });
        }
        Ok(price)
    }

    async fn list_assets(&self) -> Vec<String> {
        self.inner.list_assets().await
    }
}

/// Fixed-price adapter for tests and local runs.
#[derive(Default)]
pub struct StaticOracle {
    prices: DashMap<String, PriceData>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, asset: &str, price: PriceData) {
        self.prices.insert(asset.to_string(), price);
    }

    pub fn clear(&self, asset: &str) {
        self.prices.remove(asset);
    }
}

#[async_trait]
impl OracleAdapter for StaticOracle {
    async fn get_price(&self, asset: &str) -> Result<PriceData, OracleError> {
        self.prices
            .get(asset)
            .map(|p| *p)
            .ok_or_else(|| OracleError::Unavailable(format!("no feed for {asset}")))
    }

    async fn list_assets(&self) -> Vec<String> {
        self.prices.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAY: u128 = 1_000_000_000_000_000_000_000_000_000;

    #[tokio::test]
    async fn test_gate_rejects_stale_price() {
        let inner = StaticOracle::new();
        inner.set_price(
            "SOL",
            PriceData {
                price_ray: 150 * RAY,
                publish_ts: chrono::Utc::now().timestamp() - 45,
                confidence_bps: 10,
            },
        );
        let gated = GatedOracle::new(inner, 30, 500);
        assert!(matches!(
            gated.get_price("SOL").await,
            Err(OracleError::Stale { .. })
        ));
    }

    #[tokio::test]
    async fn test_gate_rejects_wide_confidence() {
        let inner = StaticOracle::new();
        inner.set_price(
            "SOL",
            PriceData {
                price_ray: 150 * RAY,
                publish_ts: chrono::Utc::now().timestamp(),
                confidence_bps: 900,
            },
        );
        let gated = GatedOracle::new(inner, 30, 500);
        assert!(matches!(
            gated.get_price("SOL").await,
            Err(OracleError::LowConfidence { .. })
        ));
    }

    #[tokio::test]
    async fn test_gate_passes_fresh_price() {
        let inner = StaticOracle::new();
        inner.set_price(
            "SOL",
            PriceData {
                price_ray: 150 * RAY,
                publish_ts: chrono::Utc::now().timestamp(),
                confidence_bps: 10,
            },
        );
        let gated = GatedOracle::new(inner, 30, 500);
        assert_eq!(gated.get_price("SOL").await.unwrap().price_ray, 150 * RAY);
    }
}
