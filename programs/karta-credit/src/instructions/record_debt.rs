use anchor_lang::prelude::*;

use crate::constants::{CONFIG_SEED, POSITION_SEED};
use crate::errors::CreditError;
use crate::events::DebtRecorded;
use crate::math;
use crate::state::{Config, Position};
use crate::valuation;

/// Remaining accounts: one (whitelist, oracle) pair per collateral entry in
/// the position, in position order.
#[derive(Accounts)]
pub struct RecordDebt<'info> {
    #[account(
        mut,
        seeds = [CONFIG_SEED],
        bump = config.bump,
        constraint = config.operator == operator.key() @ CreditError::Unauthorized
    )]
    pub config: Account<'info, Config>,

    /// CHECK: position owner; the position PDA derivation binds it
    pub owner: UncheckedAccount<'info>,

    #[account(
        mut,
        seeds = [POSITION_SEED, owner.key().as_ref()],
        bump = position.bump
    )]
    pub position: Account<'info, Position>,

    pub operator: Signer<'info>,
}

pub fn handler(ctx: Context<RecordDebt>, amount_usd_micro: u64, auth_tag: [u8; 32]) -> Result<()> {
    let config = &mut ctx.accounts.config;
    let position = &mut ctx.accounts.position;

    require!(!config.paused, CreditError::ProtocolPaused);
    require!(amount_usd_micro > 0, CreditError::InvalidAmount);
    require!(
        !position.has_auth_tag(&auth_tag),
        CreditError::DuplicateAuthorization
    );

    let now = Clock::get()?.unix_timestamp;
    config.accrue(now)?;

    let debt = position.current_debt_usd_micro(config.global_borrow_index)?;
    let new_debt = debt
        .checked_add(amount_usd_micro)
        .ok_or(CreditError::MathOverflow)?;

    let portfolio = valuation::portfolio_value(
        position,
        ctx.remaining_accounts,
        ctx.program_id,
        now,
        config.max_staleness_secs,
        config.max_confidence_bps,
    )?;
    require!(
        new_debt <= portfolio.borrow_limit_usd_micro,
        CreditError::HealthViolation
    );

    let delta_shares = math::shares_from_debt_up(amount_usd_micro, config.global_borrow_index)?;
    position.debt_shares = position
        .debt_shares
        .checked_add(delta_shares)
        .ok_or(CreditError::MathOverflow)?;
    config.total_debt_shares = config
        .total_debt_shares
        .checked_add(delta_shares)
        .ok_or(CreditError::MathOverflow)?;
    position.borrow_index_snapshot = config.global_borrow_index;
    position.last_update_timestamp = now;
    position.push_auth_tag(auth_tag);

    emit!(DebtRecorded {
        owner: position.owner,
        auth_tag,
        amount_usd_micro,
        new_debt_usd_micro: position.current_debt_usd_micro(config.global_borrow_index)?,
        borrow_index: config.global_borrow_index,
        timestamp: now,
    });
    msg!("Recorded {} micro-USD debt for {}", amount_usd_micro, position.owner);
    Ok(())
}
