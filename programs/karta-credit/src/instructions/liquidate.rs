use anchor_lang::prelude::*;
use anchor_spl::token::{self, Mint, Token, TokenAccount, Transfer};

use crate::constants::{
    BPS_DENOMINATOR, CLOSE_FACTOR_BPS, CONFIG_SEED, POSITION_SEED, VAULT_AUTHORITY_SEED,
    VAULT_SEED, WHITELIST_SEED,
};
use crate::errors::CreditError;
use crate::events::{BadDebtFlagged, PositionLiquidated};
use crate::math::{self, Rounding};
use crate::oracle;
use crate::state::{CollateralAsset, Config, Position};
use crate::valuation;

/// Remaining accounts: one (whitelist, oracle) pair per collateral entry in
/// the position, in position order.
#[derive(Accounts)]
pub struct Liquidate<'info> {
    #[account(mut, seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, Config>,

    /// CHECK: owner being liquidated; the position PDA derivation binds it
    pub owner: UncheckedAccount<'info>,

    #[account(
        mut,
        seeds = [POSITION_SEED, owner.key().as_ref()],
        bump = position.bump
    )]
    pub position: Account<'info, Position>,

    pub seize_mint: Account<'info, Mint>,

    #[account(
        mut,
        seeds = [WHITELIST_SEED, seize_mint.key().as_ref()],
        bump = seize_whitelist.bump
    )]
    pub seize_whitelist: Account<'info, CollateralAsset>,

    /// CHECK: must be the oracle registered for the seized mint
    #[account(address = seize_whitelist.oracle @ CreditError::InvalidOracle)]
    pub seize_oracle: UncheckedAccount<'info>,

    /// Liquidator's stablecoin account funding the repayment
    #[account(
        mut,
        constraint = liquidator_debt_token.owner == liquidator.key() @ CreditError::InvalidTokenAccount,
        constraint = liquidator_debt_token.mint == config.debt_mint @ CreditError::InvalidTokenAccount
    )]
    pub liquidator_debt_token: Account<'info, TokenAccount>,

    /// Liquidator's account receiving the seized collateral
    #[account(
        mut,
        constraint = liquidator_seize_token.owner == liquidator.key() @ CreditError::InvalidTokenAccount,
        constraint = liquidator_seize_token.mint == seize_mint.key() @ CreditError::InvalidTokenAccount
    )]
    pub liquidator_seize_token: Account<'info, TokenAccount>,

    #[account(
        mut,
        seeds = [VAULT_SEED, config.debt_mint.as_ref()],
        bump,
        constraint = treasury.mint == config.debt_mint @ CreditError::InvalidTokenAccount
    )]
    pub treasury: Account<'info, TokenAccount>,

    #[account(
        mut,
        seeds = [VAULT_SEED, seize_mint.key().as_ref()],
        bump,
        token::mint = seize_mint,
        token::authority = vault_authority
    )]
    pub seize_vault: Account<'info, TokenAccount>,

    /// CHECK: PDA signer that owns all protocol vaults
    #[account(seeds = [VAULT_AUTHORITY_SEED], bump)]
    pub vault_authority: UncheckedAccount<'info>,

    #[account(mut)]
    pub liquidator: Signer<'info>,

    pub token_program: Program<'info, Token>,
}

pub fn handler(ctx: Context<Liquidate>, repay_usd_micro: u64) -> Result<()> {
    let config = &mut ctx.accounts.config;
    let position = &mut ctx.accounts.position;

    require!(!config.paused, CreditError::ProtocolPaused);
    require!(repay_usd_micro > 0, CreditError::InvalidAmount);

    let now = Clock::get()?.unix_timestamp;
    config.accrue(now)?;

    let debt = position.current_debt_usd_micro(config.global_borrow_index)?;
    require!(debt > 0, CreditError::NotLiquidatable);

    let portfolio = valuation::portfolio_value(
        position,
        ctx.remaining_accounts,
        ctx.program_id,
        now,
        config.max_staleness_secs,
        config.max_confidence_bps,
    )?;
    let health = valuation::health_factor_bps(portfolio.liquidation_value_usd_micro, debt);
    require!(health < BPS_DENOMINATOR, CreditError::NotLiquidatable);

    let max_repay = math::apply_bps(debt, CLOSE_FACTOR_BPS)?;
    require!(repay_usd_micro <= max_repay, CreditError::CloseFactorExceeded);

    let seize_mint = ctx.accounts.seize_mint.key();
    let held = position.collateral_of(&seize_mint);
    require!(held > 0, CreditError::InsufficientCollateralOfMint);

    let bonus_bps = ctx.accounts.seize_whitelist.liquidation_bonus_bps as u128;
    let seize_value_usd_micro = math::mul_div(
        repay_usd_micro as u128,
        BPS_DENOMINATOR as u128 + bonus_bps,
        BPS_DENOMINATOR as u128,
        Rounding::Down,
    )? as u64;

    let price = oracle::read_price(
        &ctx.accounts.seize_oracle.to_account_info(),
        now,
        config.max_staleness_secs,
        config.max_confidence_bps,
    )?;
    let seize_units = math::usd_micro_to_asset(
        seize_value_usd_micro,
        price.price_ray,
        ctx.accounts.seize_whitelist.decimals,
    )?;
    let seized = seize_units.min(held);

    token::transfer(
        CpiContext::new(
            ctx.accounts.token_program.to_account_info(),
            Transfer {
                from: ctx.accounts.liquidator_debt_token.to_account_info(),
                to: ctx.accounts.treasury.to_account_info(),
                authority: ctx.accounts.liquidator.to_account_info(),
            },
        ),
        repay_usd_micro,
    )?;

    let authority_seeds: &[&[u8]] = &[VAULT_AUTHORITY_SEED, &[ctx.bumps.vault_authority]];
    token::transfer(
        CpiContext::new_with_signer(
            ctx.accounts.token_program.to_account_info(),
            Transfer {
                from: ctx.accounts.seize_vault.to_account_info(),
                to: ctx.accounts.liquidator_seize_token.to_account_info(),
                authority: ctx.accounts.vault_authority.to_account_info(),
            },
            &[authority_seeds],
        ),
        seized,
    )?;

    let removed_shares = math::shares_from_debt_down(repay_usd_micro, config.global_borrow_index)?
        .min(position.debt_shares);
    position.debt_shares = position
        .debt_shares
        .checked_sub(removed_shares)
        .ok_or(CreditError::MathOverflow)?;
    config.total_debt_shares = config.total_debt_shares.saturating_sub(removed_shares);
    position.debit_collateral(&seize_mint, seized)?;
    position.borrow_index_snapshot = config.global_borrow_index;
    position.last_update_timestamp = now;

    let seize_whitelist = &mut ctx.accounts.seize_whitelist;
    seize_whitelist.total_deposited = seize_whitelist.total_deposited.saturating_sub(seized);

    let remaining_debt = position.current_debt_usd_micro(config.global_borrow_index)?;
    let seized_value =
        math::asset_to_usd_micro(seized, price.price_ray, seize_whitelist.decimals)?;
    let remaining_collateral_value = portfolio
        .collateral_value_usd_micro
        .saturating_sub(seized_value);

    // Seizure cap hit with debt left over: surface the loss, do not resolve it
    if remaining_collateral_value < remaining_debt {
        config.bad_debt_flagged = true;
        emit!(BadDebtFlagged {
            owner: position.owner,
            remaining_debt_usd_micro: remaining_debt,
            remaining_collateral_usd_micro: remaining_collateral_value,
        });
    }

    emit!(PositionLiquidated {
        owner: position.owner,
        liquidator: ctx.accounts.liquidator.key(),
        repay_usd_micro,
        seize_mint,
        collateral_seized: seized,
        remaining_debt_usd_micro: remaining_debt,
        timestamp: now,
    });
    msg!(
        "Liquidated {}: repaid {} micro-USD, seized {} of {}",
        position.owner,
        repay_usd_micro,
        seized,
        seize_mint
    );
    Ok(())
}
