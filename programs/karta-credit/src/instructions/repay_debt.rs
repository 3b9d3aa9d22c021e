use anchor_lang::prelude::*;
use anchor_spl::token::{self, Token, TokenAccount, Transfer};

use crate::constants::{CONFIG_SEED, POSITION_SEED, VAULT_SEED};
use crate::errors::CreditError;
use crate::events::DebtRepaid;
use crate::math;
use crate::state::{Config, Position};

/// Anyone may repay on an owner's behalf; the payer signs, the owner does not.
#[derive(Accounts)]
pub struct RepayDebt<'info> {
    #[account(mut, seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, Config>,

    /// CHECK: position owner; the position PDA derivation binds it
    pub owner: UncheckedAccount<'info>,

    #[account(
        mut,
        seeds = [POSITION_SEED, owner.key().as_ref()],
        bump = position.bump
    )]
    pub position: Account<'info, Position>,

    #[account(
        mut,
        constraint = payer_token.owner == payer.key() @ CreditError::InvalidTokenAccount,
        constraint = payer_token.mint == config.debt_mint @ CreditError::InvalidTokenAccount
    )]
    pub payer_token: Account<'info, TokenAccount>,

    #[account(
        mut,
        seeds = [VAULT_SEED, config.debt_mint.as_ref()],
        bump,
        constraint = treasury.mint == config.debt_mint @ CreditError::InvalidTokenAccount
    )]
    pub treasury: Account<'info, TokenAccount>,

    #[account(mut)]
    pub payer: Signer<'info>,

    pub token_program: Program<'info, Token>,
}

pub fn handler(ctx: Context<RepayDebt>, amount_usd_micro: u64) -> Result<()> {
    let config = &mut ctx.accounts.config;
    let position = &mut ctx.accounts.position;

    require!(!config.paused, CreditError::ProtocolPaused);
    require!(amount_usd_micro > 0, CreditError::InvalidAmount);

    let now = Clock::get()?.unix_timestamp;
    config.accrue(now)?;

    let debt = position.current_debt_usd_micro(config.global_borrow_index)?;
    require!(debt > 0, CreditError::NothingToRepay);

    let pay = amount_usd_micro.min(debt);
    token::transfer(
        CpiContext::new(
            ctx.accounts.token_program.to_account_info(),
            Transfer {
                from: ctx.accounts.payer_token.to_account_info(),
                to: ctx.accounts.treasury.to_account_info(),
                authority: ctx.accounts.payer.to_account_info(),
            },
        ),
        pay,
    )?;

    // Full repayment zeroes the shares outright so no dust survives
    let removed_shares = if pay == debt {
        position.debt_shares
    } else {
        math::shares_from_debt_down(pay, config.global_borrow_index)?
    };
    position.debt_shares = position
        .debt_shares
        .checked_sub(removed_shares)
        .ok_or(CreditError::MathOverflow)?;
    config.total_debt_shares = config.total_debt_shares.saturating_sub(removed_shares);
    position.borrow_index_snapshot = config.global_borrow_index;
    position.last_update_timestamp = now;

    let remaining = position.current_debt_usd_micro(config.global_borrow_index)?;
    emit!(DebtRepaid {
        owner: position.owner,
        payer: ctx.accounts.payer.key(),
        amount_usd_micro: pay,
        remaining_debt_usd_micro: remaining,
        timestamp: now,
    });
    msg!("Repaid {} micro-USD for {}", pay, position.owner);
    Ok(())
}
