//! Portfolio valuation over (whitelist, oracle) account pairs.
//!
//! Instructions that need a health check pass, as remaining accounts, one
//! whitelist PDA followed by its oracle for every collateral entry in the
//! position, in position order.

use anchor_lang::prelude::*;

use crate::constants::{BPS_DENOMINATOR, WHITELIST_SEED};
use crate::errors::CreditError;
use crate::math;
use crate::oracle;
use crate::state::{CollateralAsset, Position};

#[derive(Clone, Copy, Debug, Default)]
pub struct PortfolioValue {
    /// Raw collateral value
    pub collateral_value_usd_micro: u64,
    /// LTV-weighted borrow capacity
    pub borrow_limit_usd_micro: u64,
    /// Liquidation-threshold-weighted value
    pub liquidation_value_usd_micro: u64,
}

/// Health factor in bps: liquidation-adjusted collateral over debt.
/// Infinite (u64::MAX) when there is no debt.
pub fn health_factor_bps(liquidation_value_usd_micro: u64, debt_usd_micro: u64) -> u64 {
    if debt_usd_micro == 0 {
        return u64::MAX;
    }
    ((liquidation_value_usd_micro as u128)
        .saturating_mul(BPS_DENOMINATOR as u128)
        / debt_usd_micro as u128)
        .min(u64::MAX as u128) as u64
}

pub fn available_credit_usd_micro(borrow_limit_usd_micro: u64, debt_usd_micro: u64) -> u64 {
    borrow_limit_usd_micro.saturating_sub(debt_usd_micro)
}

/// Price every collateral entry of `position` through the supplied
/// (whitelist, oracle) pairs. Each whitelist account is verified against its
/// PDA derivation and its stored oracle key; oracle gating applies.
pub fn portfolio_value<'a, 'info: 'a>(
    position: &Position,
    remaining: &'a [AccountInfo<'info>],
    program_id: &Pubkey,
    now: i64,
    max_staleness_secs: i64,
    max_confidence_bps: u16,
) -> Result<PortfolioValue> {
    require!(
        remaining.len() >= position.collateral.len() * 2,
        CreditError::MissingCollateralAccounts
    );

    let mut out = PortfolioValue::default();
    for (i, entry) in position.collateral.iter().enumerate() {
        let whitelist_info = &remaining[i * 2];
        let oracle_info = &remaining[i * 2 + 1];

        let (expected, _) = Pubkey::find_program_address(
            &[WHITELIST_SEED, entry.mint.as_ref()],
            program_id,
        );
        require_keys_eq!(*whitelist_info.key, expected, CreditError::NotWhitelisted);

        let whitelist: Account<CollateralAsset> = Account::try_from(whitelist_info)?;
        require_keys_eq!(whitelist.mint, entry.mint, CreditError::WhitelistMintMismatch);
        require_keys_eq!(whitelist.oracle, *oracle_info.key, CreditError::InvalidOracle);

        let price = oracle::read_price(oracle_info, now, max_staleness_secs, max_confidence_bps)?;
        let value = math::asset_to_usd_micro(entry.amount, price.price_ray, whitelist.decimals)?;

        out.collateral_value_usd_micro = out
            .collateral_value_usd_micro
            .checked_add(value)
            .ok_or(CreditError::MathOverflow)?;
        out.borrow_limit_usd_micro = out
            .borrow_limit_usd_micro
            .checked_add(math::apply_bps(value, whitelist.effective_ltv_bps() as u64)?)
            .ok_or(CreditError::MathOverflow)?;
        out.liquidation_value_usd_micro = out
            .liquidation_value_usd_micro
            .checked_add(math::apply_bps(
                value,
                whitelist.effective_liquidation_threshold_bps() as u64,
            )?)
            .ok_or(CreditError::MathOverflow)?;
    }
    Ok(out)
}
