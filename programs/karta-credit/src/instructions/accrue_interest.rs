use anchor_lang::prelude::*;

use crate::constants::CONFIG_SEED;
use crate::events::InterestAccrued;
use crate::state::Config;

/// Permissionless crank. Idempotent within one second-step.
#[derive(Accounts)]
pub struct AccrueInterest<'info> {
    #[account(mut, seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, Config>,
}

pub fn handler(ctx: Context<AccrueInterest>) -> Result<()> {
    let config = &mut ctx.accounts.config;
    let now = Clock::get()?.unix_timestamp;
    config.accrue(now)?;

    emit!(InterestAccrued {
        global_borrow_index: config.global_borrow_index,
        timestamp: config.last_update_timestamp,
    });
    Ok(())
}
