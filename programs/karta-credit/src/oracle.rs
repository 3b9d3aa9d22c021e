use anchor_lang::prelude::*;

use crate::errors::CreditError;

/// Pyth price account layout offsets (simplified legacy layout).
const PRICE_OFFSET: usize = 208;
const CONF_OFFSET: usize = 216;
const EXPO_OFFSET: usize = 224;
const PUBLISH_TIME_OFFSET: usize = 232;
const MIN_ACCOUNT_LEN: usize = 240;

/// Raw price as published by the oracle.
#[derive(Clone, Copy, Debug)]
pub struct RawPrice {
    pub price: i64,
    pub conf: u64,
    pub expo: i32,
    pub publish_time: i64,
}

/// Price normalized for the engine: USD per whole token at ray precision.
#[derive(Clone, Copy, Debug)]
pub struct OraclePrice {
    pub price_ray: u128,
    pub publish_ts: i64,
    pub confidence_bps: u16,
}

impl RawPrice {
    /// Normalize the published mantissa/exponent pair to ray.
    pub fn to_price_ray(&self) -> Option<u128> {
        if self.price <= 0 {
            return None;
        }
        let price = self.price as u128;
        // price * 10^expo is the USD value; scale that to 1e27.
        let shift = 27i32.checked_add(self.expo)?;
        if shift >= 0 {
            price.checked_mul(10u128.checked_pow(shift as u32)?)
        } else {
            price.checked_div(10u128.checked_pow((-shift) as u32)?)
        }
    }

    /// Confidence interval as a fraction of the price, in basis points.
    pub fn confidence_bps(&self) -> u16 {
        if self.price <= 0 {
            return u16::MAX;
        }
        let bps = (self.conf as u128)
            .saturating_mul(10_000)
            .checked_div(self.price as u128)
            .unwrap_or(u128::from(u16::MAX));
        bps.min(u128::from(u16::MAX)) as u16
    }
}

pub fn parse_price_account(data: &[u8]) -> Option<RawPrice> {
    if data.len() < MIN_ACCOUNT_LEN {
        return None;
    }
    let price = i64::from_le_bytes(data[PRICE_OFFSET..PRICE_OFFSET + 8].try_into().ok()?);
    let conf = u64::from_le_bytes(data[CONF_OFFSET..CONF_OFFSET + 8].try_into().ok()?);
    let expo = i32::from_le_bytes(data[EXPO_OFFSET..EXPO_OFFSET + 4].try_into().ok()?);
    let publish_time =
        i64::from_le_bytes(data[PUBLISH_TIME_OFFSET..PUBLISH_TIME_OFFSET + 8].try_into().ok()?);
    Some(RawPrice {
        price,
        conf,
        expo,
        publish_time,
    })
}

/// Read a gated price from an oracle account. Fails closed: a price that is
/// unparseable, non-positive, stale, or too uncertain aborts the instruction.
pub fn read_price(
    oracle: &AccountInfo,
    now: i64,
    max_staleness_secs: i64,
    max_confidence_bps: u16,
) -> Result<OraclePrice> {
    let data = oracle.try_borrow_data()?;
    let raw = parse_price_account(&data).ok_or(CreditError::InvalidOracle)?;
    let price_ray = raw.to_price_ray().ok_or(CreditError::InvalidOracle)?;
    require!(
        now.saturating_sub(raw.publish_time) <= max_staleness_secs,
        CreditError::StalePrice
    );
    let confidence_bps = raw.confidence_bps();
    require!(confidence_bps <= max_confidence_bps, CreditError::LowConfidence);
    Ok(OraclePrice {
        price_ray,
        publish_ts: raw.publish_time,
        confidence_bps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::RAY;

    #[test]
    fn test_price_to_ray() {
        // SOL at $150 with expo -8
        let raw = RawPrice {
            price: 15_000_000_000,
            conf: 50_000_000,
            expo: -8,
            publish_time: 0,
        };
        assert_eq!(raw.to_price_ray(), Some(150 * RAY));
    }

    #[test]
    fn test_negative_price_rejected() {
        let raw = RawPrice {
            price: -1,
            conf: 0,
            expo: -8,
            publish_time: 0,
        };
        assert_eq!(raw.to_price_ray(), None);
    }

    #[test]
    fn test_confidence_bps() {
        let raw = RawPrice {
            price: 100_000_000,
            conf: 1_000_000,
            expo: -8,
            publish_time: 0,
        };
        assert_eq!(raw.confidence_bps(), 100);
    }

    #[test]
    fn test_parse_round_trip() {
        let mut data = vec![0u8; 256];
        data[PRICE_OFFSET..PRICE_OFFSET + 8].copy_from_slice(&42i64.to_le_bytes());
        data[CONF_OFFSET..CONF_OFFSET + 8].copy_from_slice(&7u64.to_le_bytes());
        data[EXPO_OFFSET..EXPO_OFFSET + 4].copy_from_slice(&(-8i32).to_le_bytes());
        data[PUBLISH_TIME_OFFSET..PUBLISH_TIME_OFFSET + 8]
            .copy_from_slice(&1_700_000_000i64.to_le_bytes());
        let raw = parse_price_account(&data).unwrap();
        assert_eq!(raw.price, 42);
        assert_eq!(raw.conf, 7);
        assert_eq!(raw.expo, -8);
        assert_eq!(raw.publish_time, 1_700_000_000);
    }

    #[test]
    fn test_short_account_rejected() {
        assert!(parse_price_account(&[0u8; 100]).is_none());
    }
}
