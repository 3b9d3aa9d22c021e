//! Ray (1e27) fixed-point kernel for the borrow index and USD valuation.
//!
//! All intermediates go through 256-bit unsigned arithmetic; overflow aborts
//! the instruction rather than saturating.

use anchor_lang::prelude::*;

use crate::constants::{BPS_DENOMINATOR, RAY, SECONDS_PER_YEAR, USD_MICRO};
use crate::errors::CreditError;

mod u256_impl {
    use uint::construct_uint;

    construct_uint! {
        pub struct U256(4);
    }
}
pub use u256_impl::U256;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    HalfUp,
    Up,
}

fn to_u128(value: U256) -> Result<u128> {
    if value > U256::from(u128::MAX) {
        return err!(CreditError::MathOverflow);
    }
    Ok(value.as_u128())
}

fn to_u64(value: U256) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return err!(CreditError::MathOverflow);
    }
    Ok(value.as_u64())
}

/// a * b / denominator with explicit rounding.
pub fn mul_div(a: u128, b: u128, denominator: u128, rounding: Rounding) -> Result<u128> {
    if denominator == 0 {
        return err!(CreditError::MathOverflow);
    }
    let num = U256::from(a)
        .checked_mul(U256::from(b))
        .ok_or(CreditError::MathOverflow)?;
    let den = U256::from(denominator);
    let quotient = num / den;
    let remainder = num % den;
    let out = match rounding {
        Rounding::Down => quotient,
        Rounding::Up if remainder.is_zero() => quotient,
        Rounding::Up => quotient + U256::one(),
        Rounding::HalfUp => {
            if remainder * U256::from(2u8) >= den {
                quotient + U256::one()
            } else {
                quotient
            }
        }
    };
    to_u128(out)
}

/// a * b / RAY, round to zero.
pub fn mul_ray(a: u128, b: u128) -> Result<u128> {
    mul_div(a, b, RAY, Rounding::Down)
}

/// a * b / RAY, half-up.
pub fn mul_div_ray(a: u128, b: u128) -> Result<u128> {
    mul_div(a, b, RAY, Rounding::HalfUp)
}

/// a * RAY / b, round to zero.
pub fn div_ray(a: u128, b: u128) -> Result<u128> {
    mul_div(a, RAY, b, Rounding::Down)
}

/// Linear compounding over one accrual step:
/// `new = old + old * rate_per_second * dt / RAY`.
pub fn compound_index(index: u128, rate_bps: u16, elapsed_secs: i64) -> Result<u128> {
    if elapsed_secs <= 0 || rate_bps == 0 {
        return Ok(index);
    }
    let rate_per_second = mul_div(
        rate_bps as u128,
        RAY,
        BPS_DENOMINATOR as u128 * SECONDS_PER_YEAR as u128,
        Rounding::Down,
    )?;
    let growth = mul_div(
        rate_per_second,
        elapsed_secs as u128,
        1,
        Rounding::Down,
    )?;
    let delta = mul_ray(index, growth)?;
    index.checked_add(delta).ok_or_else(|| error!(CreditError::MathOverflow))
}

/// Current debt in micro-USD from scaled shares. Rounds up so the protocol
/// never under-accounts debt.
pub fn debt_from_shares(shares: u128, index: u128) -> Result<u64> {
    if shares == 0 {
        return Ok(0);
    }
    let micro = mul_div(shares, index, RAY, Rounding::Up)?;
    to_u64(U256::from(micro))
}

/// Scaled shares added when debt increases. Rounds up.
pub fn shares_from_debt_up(amount_usd_micro: u64, index: u128) -> Result<u128> {
    mul_div(amount_usd_micro as u128, RAY, index, Rounding::Up)
}

/// Scaled shares removed when debt decreases. Rounds down.
pub fn shares_from_debt_down(amount_usd_micro: u64, index: u128) -> Result<u128> {
    mul_div(amount_usd_micro as u128, RAY, index, Rounding::Down)
}

/// Value of `amount` base units of an asset in micro-USD.
/// `price_ray` is USD per whole token at ray precision.
pub fn asset_to_usd_micro(amount: u64, price_ray: u128, decimals: u8) -> Result<u64> {
    let num = U256::from(amount)
        .checked_mul(U256::from(price_ray))
        .ok_or(CreditError::MathOverflow)?
        .checked_mul(U256::from(USD_MICRO))
        .ok_or(CreditError::MathOverflow)?;
    let den = U256::from(RAY)
        .checked_mul(U256::from(10u128.pow(decimals as u32)))
        .ok_or(CreditError::MathOverflow)?;
    to_u64(num / den)
}

/// Base units of an asset worth `value_usd_micro`, rounded down so seizures
/// never overpay the liquidator.
pub fn usd_micro_to_asset(value_usd_micro: u64, price_ray: u128, decimals: u8) -> Result<u64> {
    if price_ray == 0 {
        return err!(CreditError::InvalidOracle);
    }
    let num = U256::from(value_usd_micro)
        .checked_mul(U256::from(RAY))
        .ok_or(CreditError::MathOverflow)?
        .checked_mul(U256::from(10u128.pow(decimals as u32)))
        .ok_or(CreditError::MathOverflow)?;
    let den = U256::from(price_ray)
        .checked_mul(U256::from(USD_MICRO))
        .ok_or(CreditError::MathOverflow)?;
    to_u64(num / den)
}

/// value * bps / 10_000, round to zero.
pub fn apply_bps(value: u64, bps: u64) -> Result<u64> {
    let out = mul_div(value as u128, bps as u128, BPS_DENOMINATOR as u128, Rounding::Down)?;
    to_u64(U256::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_starts_and_grows_linearly() {
        // 5% APR over one year doubles the bps exactly under linear accrual
        let one_year = SECONDS_PER_YEAR as i64;
        let grown = compound_index(RAY, 500, one_year).unwrap();
        // 1.05 ray, within rounding of the per-second rate
        let expected = RAY + RAY / 20;
        assert!(grown <= expected);
        assert!(expected - grown < SECONDS_PER_YEAR as u128);
    }

    #[test]
    fn test_index_zero_elapsed_is_noop() {
        let grown = compound_index(RAY + 123, 500, 0).unwrap();
        assert_eq!(grown, RAY + 123);
    }

    #[test]
    fn test_index_monotonic() {
        let mut index = RAY;
        for _ in 0..10 {
            let next = compound_index(index, 1200, 3600).unwrap();
            assert!(next >= index);
            index = next;
        }
    }

    #[test]
    fn test_debt_round_trip_within_one_micro() {
        // record A then repay A on a fresh position stays within 1 micro
        for index in [RAY, RAY + RAY / 7, 2 * RAY] {
            for amount in [1u64, 50_000_000, 123_456_789] {
                let shares = shares_from_debt_up(amount, index).unwrap();
                let debt = debt_from_shares(shares, index).unwrap();
                assert!(debt >= amount);
                assert!(debt - amount <= 1, "index={index} amount={amount}");
            }
        }
    }

    #[test]
    fn test_debit_rounds_down_credit_rounds_up() {
        let index = RAY + RAY / 3;
        let up = shares_from_debt_up(1000, index).unwrap();
        let down = shares_from_debt_down(1000, index).unwrap();
        assert!(up >= down);
        assert!(up - down <= 1);
    }

    #[test]
    fn test_asset_valuation_sol_at_150() {
        // 5 SOL at $150.00 = 750 USD = 750_000_000 micro
        let price_ray = 150 * RAY;
        let value = asset_to_usd_micro(5_000_000_000, price_ray, 9).unwrap();
        assert_eq!(value, 750_000_000);
    }

    #[test]
    fn test_usd_to_asset_inverse() {
        let price_ray = 180 * RAY;
        // $89.25 of SOL at $180 = 0.495833... SOL
        let units = usd_micro_to_asset(89_250_000, price_ray, 9).unwrap();
        assert_eq!(units, 495_833_333);
    }

    #[test]
    fn test_mul_div_rounding_modes() {
        assert_eq!(mul_div(7, 1, 2, Rounding::Down).unwrap(), 3);
        assert_eq!(mul_div(7, 1, 2, Rounding::HalfUp).unwrap(), 4);
        assert_eq!(mul_div(7, 1, 2, Rounding::Up).unwrap(), 4);
        assert_eq!(mul_div(6, 1, 2, Rounding::Up).unwrap(), 3);
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert!(mul_div(u128::MAX, u128::MAX, 1, Rounding::Down).is_err());
    }

    #[test]
    fn test_apply_bps() {
        // 60% of $750 = $450
        assert_eq!(apply_bps(750_000_000, 6000).unwrap(), 450_000_000);
    }
}
