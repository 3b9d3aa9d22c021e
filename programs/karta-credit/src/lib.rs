use anchor_lang::prelude::*;

pub mod constants;
pub mod errors;
pub mod events;
pub mod instructions;
pub mod math;
pub mod oracle;
pub mod state;
pub mod valuation;

use instructions::*;

declare_id!("Ed7pfvjR1mRWmzHP3r1NvukESGr38xZKwpoQ5jGSAVad");

#[program]
pub mod karta_credit {
    use super::*;

    /// Create the protocol config singleton and the stablecoin treasury
    pub fn init_config(ctx: Context<InitConfig>, params: InitConfigParams) -> Result<()> {
        instructions::init_config::handler(ctx, params)
    }

    /// Create or update a collateral whitelist entry and its custody vault
    pub fn whitelist_token(
        ctx: Context<WhitelistToken>,
        params: WhitelistTokenParams,
    ) -> Result<()> {
        instructions::whitelist_token::handler(ctx, params)
    }

    /// Rotate the oracle for a whitelisted mint
    pub fn set_oracle(ctx: Context<SetOracle>) -> Result<()> {
        instructions::set_oracle::handler(ctx)
    }

    /// Rotate the card-issuer operator principal
    pub fn set_operator(ctx: Context<SetOperator>, new_operator: Pubkey) -> Result<()> {
        instructions::set_operator::handler(ctx, new_operator)
    }

    /// Pause or unpause the engine
    pub fn set_pause(ctx: Context<SetPause>, paused: bool) -> Result<()> {
        instructions::set_pause::handler(ctx, paused)
    }

    /// Hand the protocol to a new admin
    pub fn rotate_admin(ctx: Context<RotateAdmin>, new_admin: Pubkey) -> Result<()> {
        instructions::rotate_admin::handler(ctx, new_admin)
    }

    /// Open a zeroed credit position for the signer
    pub fn init_position(ctx: Context<InitPosition>) -> Result<()> {
        instructions::init_position::handler(ctx)
    }

    /// Deposit collateral into the per-mint vault
    pub fn add_collateral(ctx: Context<AddCollateral>, amount: u64) -> Result<()> {
        instructions::add_collateral::handler(ctx, amount)
    }

    /// Withdraw collateral, subject to the LTV limit at oracle prices
    pub fn withdraw_collateral(ctx: Context<WithdrawCollateral>, amount: u64) -> Result<()> {
        instructions::withdraw_collateral::handler(ctx, amount)
    }

    /// Operator-only: book a card capture as debt, at most once per auth tag
    pub fn record_debt(
        ctx: Context<RecordDebt>,
        amount_usd_micro: u64,
        auth_tag: [u8; 32],
    ) -> Result<()> {
        instructions::record_debt::handler(ctx, amount_usd_micro, auth_tag)
    }

    /// Repay debt; any payer may repay on the owner's behalf
    pub fn repay_debt(ctx: Context<RepayDebt>, amount_usd_micro: u64) -> Result<()> {
        instructions::repay_debt::handler(ctx, amount_usd_micro)
    }

    /// Permissionless interest accrual crank
    pub fn accrue_interest(ctx: Context<AccrueInterest>) -> Result<()> {
        instructions::accrue_interest::handler(ctx)
    }

    /// Repay up to the close factor of an underwater position and seize
    /// collateral plus bonus
    pub fn liquidate(ctx: Context<Liquidate>, repay_usd_micro: u64) -> Result<()> {
        instructions::liquidate::handler(ctx, repay_usd_micro)
    }
}
