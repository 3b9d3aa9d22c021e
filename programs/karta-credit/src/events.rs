use anchor_lang::prelude::*;

use crate::state::AssetCategory;

#[event]
pub struct ConfigInitialized {
    pub admin: Pubkey,
    pub operator: Pubkey,
    pub debt_mint: Pubkey,
    pub ltv_max_bps: u16,
    pub liquidation_threshold_bps: u16,
    pub interest_rate_bps: u16,
}

#[event]
pub struct TokenWhitelisted {
    pub mint: Pubkey,
    pub category: AssetCategory,
    pub max_ltv_bps: u16,
    pub liquidation_threshold_bps: u16,
    pub enabled: bool,
}

#[event]
pub struct OracleRotated {
    pub mint: Pubkey,
    pub old_oracle: Pubkey,
    pub new_oracle: Pubkey,
}

#[event]
pub struct OperatorRotated {
    pub old_operator: Pubkey,
    pub new_operator: Pubkey,
}

#[event]
pub struct AdminRotated {
    pub old_admin: Pubkey,
    pub new_admin: Pubkey,
}

#[event]
pub struct PauseSet {
    pub paused: bool,
}

#[event]
pub struct PositionOpened {
    pub owner: Pubkey,
    pub position: Pubkey,
}

#[event]
pub struct CollateralAdded {
    pub owner: Pubkey,
    pub mint: Pubkey,
    pub amount: u64,
    pub total_of_mint: u64,
}

#[event]
pub struct CollateralWithdrawn {
    pub owner: Pubkey,
    pub mint: Pubkey,
    pub amount: u64,
    pub remaining_of_mint: u64,
}

#[event]
pub struct DebtRecorded {
    pub owner: Pubkey,
    pub auth_tag: [u8; 32],
    pub amount_usd_micro: u64,
    pub new_debt_usd_micro: u64,
    pub borrow_index: u128,
    pub timestamp: i64,
}

#[event]
pub struct DebtRepaid {
    pub owner: Pubkey,
    pub payer: Pubkey,
    pub amount_usd_micro: u64,
    pub remaining_debt_usd_micro: u64,
    pub timestamp: i64,
}

#[event]
pub struct InterestAccrued {
    pub global_borrow_index: u128,
    pub timestamp: i64,
}

#[event]
pub struct PositionLiquidated {
    pub owner: Pubkey,
    pub liquidator: Pubkey,
    pub repay_usd_micro: u64,
    pub seize_mint: Pubkey,
    pub collateral_seized: u64,
    pub remaining_debt_usd_micro: u64,
    pub timestamp: i64,
}

#[event]
pub struct BadDebtFlagged {
    pub owner: Pubkey,
    pub remaining_debt_usd_micro: u64,
    pub remaining_collateral_usd_micro: u64,
}
