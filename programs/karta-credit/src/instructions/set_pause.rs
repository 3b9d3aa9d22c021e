use anchor_lang::prelude::*;

use crate::constants::CONFIG_SEED;
use crate::errors::CreditError;
use crate::events::PauseSet;
use crate::state::Config;

#[derive(Accounts)]
pub struct SetPause<'info> {
    #[account(
        mut,
        seeds = [CONFIG_SEED],
        bump = config.bump,
        has_one = admin @ CreditError::Unauthorized
    )]
    pub config: Account<'info, Config>,

    pub admin: Signer<'info>,
}

pub fn handler(ctx: Context<SetPause>, paused: bool) -> Result<()> {
    ctx.accounts.config.paused = paused;
    emit!(PauseSet { paused });
    msg!("Protocol paused = {}", paused);
    Ok(())
}
