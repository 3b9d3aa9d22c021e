use anchor_lang::prelude::*;

use crate::constants::{CONFIG_SEED, POSITION_SEED, RECENT_AUTH_RING};
use crate::errors::CreditError;
use crate::events::PositionOpened;
use crate::state::{Config, Position};

#[derive(Accounts)]
pub struct InitPosition<'info> {
    #[account(seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, Config>,

    #[account(
        init,
        payer = owner,
        space = 8 + Position::INIT_SPACE,
        seeds = [POSITION_SEED, owner.key().as_ref()],
        bump
    )]
    pub position: Account<'info, Position>,

    #[account(mut)]
    pub owner: Signer<'info>,

    pub system_program: Program<'info, System>,
}

pub fn handler(ctx: Context<InitPosition>) -> Result<()> {
    require!(!ctx.accounts.config.paused, CreditError::ProtocolPaused);

    let position = &mut ctx.accounts.position;
    position.owner = ctx.accounts.owner.key();
    position.collateral = Vec::new();
    position.debt_shares = 0;
    position.borrow_index_snapshot = ctx.accounts.config.global_borrow_index;
    position.last_update_timestamp = Clock::get()?.unix_timestamp;
    position.recent_auth_tags = [[0u8; 32]; RECENT_AUTH_RING];
    position.recent_auth_head = 0;
    position.bump = ctx.bumps.position;

    emit!(PositionOpened {
        owner: position.owner,
        position: position.key(),
    });
    msg!("Position opened for {}", position.owner);
    Ok(())
}
