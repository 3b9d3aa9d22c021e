//! Karta protocol admin CLI: bootstrap the config, manage the whitelist,
//! rotate principals, and inspect positions.
//!
//! Exit codes: 0 success, 2 validation error, 3 chain error, 4 auth error.

use std::process::ExitCode;
use std::sync::Arc;

use anchor_lang::{InstructionData, ToAccountMetas};
use clap::{Parser, Subcommand, ValueEnum};
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::read_keypair_file;
use tracing_subscriber::EnvFilter;

use karta_chain::{ChainClient, ChainError};
use karta_credit::errors::CreditError;
use karta_credit::instructions::{InitConfigParams, WhitelistTokenParams};
use karta_credit::math;
use karta_credit::state::AssetCategory;

#[derive(Parser)]
#[command(name = "karta", about = "Karta credit protocol administration")]
struct Cli {
    #[arg(long, env = "KARTA_RPC_URL", default_value = "http://127.0.0.1:8899")]
    rpc_url: String,

    #[arg(long, env = "KARTA_KEYPAIR")]
    keypair: String,

    #[arg(long, env = "KARTA_PROGRAM_ID")]
    program_id: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Category {
    Native,
    LiquidStaking,
    Stable,
    BlueChip,
    Memecoin,
    LpStable,
    LpVolatile,
    Other,
}

impl From<Category> for AssetCategory {
    fn from(value: Category) -> Self {
        match value {
            Category::Native => AssetCategory::Native,
            Category::LiquidStaking => AssetCategory::LiquidStaking,
            Category::Stable => AssetCategory::Stable,
            Category::BlueChip => AssetCategory::BlueChip,
            Category::Memecoin => AssetCategory::Memecoin,
            Category::LpStable => AssetCategory::LpStable,
            Category::LpVolatile => AssetCategory::LpVolatile,
            Category::Other => AssetCategory::Other,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the protocol config and stablecoin treasury
    InitConfig {
        #[arg(long)]
        debt_mint: String,
        #[arg(long)]
        operator: String,
        #[arg(long, default_value_t = 6_000)]
        ltv_bps: u16,
        #[arg(long, default_value_t = 7_500)]
        liq_threshold_bps: u16,
        #[arg(long, default_value_t = 500)]
        liq_bonus_bps: u16,
        #[arg(long, default_value_t = 500)]
        rate_bps: u16,
        #[arg(long, default_value_t = 30)]
        max_staleness_secs: i64,
        #[arg(long, default_value_t = 500)]
        max_confidence_bps: u16,
    },
    /// Create or update a collateral whitelist entry
    WhitelistToken {
        mint: String,
        #[arg(value_enum)]
        category: Category,
        #[arg(long)]
        oracle: String,
        #[arg(long, default_value_t = 6_000)]
        ltv_bps: u16,
        #[arg(long, default_value_t = 7_500)]
        liq_threshold_bps: u16,
        #[arg(long, default_value_t = 500)]
        liq_bonus_bps: u16,
        #[arg(long, default_value_t = 0)]
        max_deposit: u64,
        #[arg(long, default_value_t = 0)]
        min_deposit_usd_micro: u64,
        #[arg(long)]
        disabled: bool,
        #[arg(long)]
        lp_pool: Option<String>,
        #[arg(long)]
        lp_token_a: Option<String>,
        #[arg(long)]
        lp_token_b: Option<String>,
    },
    /// Rotate the oracle for a whitelisted mint
    SetOracle { mint: String, oracle: String },
    /// Rotate the card-issuer operator principal
    SetOperator { operator: String },
    /// Pause the engine
    Pause,
    /// Unpause the engine
    Unpause,
    /// Hand the protocol to a new admin
    RotateAdmin { new_admin: String },
    /// Print a position with its current debt
    InspectPosition { owner: String },
}

enum CliError {
    Validation(String),
    Chain(ChainError),
    Auth(String),
}

impl From<ChainError> for CliError {
    fn from(error: ChainError) -> Self {
        let unauthorized = karta_chain::client::credit_error_code(CreditError::Unauthorized);
        match &error {
            ChainError::Program { code, .. } if *code == unauthorized => {
                CliError::Auth("program rejected the signer".into())
            }
            _ => CliError::Chain(error),
        }
    }
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Validation(_) => 2,
            CliError::Chain(_) => 3,
            CliError::Auth(_) => 4,
        }
    }

    fn message(&self) -> String {
        match self {
            CliError::Validation(msg) => format!("validation error: {msg}"),
            CliError::Chain(err) => format!("chain error: {err}"),
            CliError::Auth(msg) => format!("auth error: {msg}"),
        }
    }
}

fn parse_pubkey(label: &str, value: &str) -> Result<Pubkey, CliError> {
    value
        .parse()
        .map_err(|_| CliError::Validation(format!("{label} is not a valid pubkey: {value}")))
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let program_id = parse_pubkey("program id", &cli.program_id)?;
    let payer = read_keypair_file(&cli.keypair)
        .map_err(|e| CliError::Validation(format!("keypair {}: {e}", cli.keypair)))?;
    let client = Arc::new(ChainClient::new(&cli.rpc_url, payer, program_id));
    let admin = client.payer_pubkey();

    match cli.command {
        Command::InitConfig {
            debt_mint,
            operator,
            ltv_bps,
            liq_threshold_bps,
            liq_bonus_bps,
            rate_bps,
            max_staleness_secs,
            max_confidence_bps,
        } => {
            if ltv_bps > liq_threshold_bps || liq_threshold_bps > 10_000 {
                return Err(CliError::Validation(
                    "require ltv_bps <= liq_threshold_bps <= 10000".into(),
                ));
            }
            let debt_mint = parse_pubkey("debt mint", &debt_mint)?;
            let accounts = karta_credit::accounts::InitConfig {
                config: client.config_address(),
                debt_mint,
                vault_authority: client.vault_authority_address(),
                treasury: client.vault_address(&debt_mint),
                admin,
                token_program: anchor_spl::token::ID,
                system_program: anchor_lang::system_program::ID,
            }
            .to_account_metas(None);
            let receipt = client
                .send_instruction(Instruction {
                    program_id,
                    accounts,
                    data: karta_credit::instruction::InitConfig {
                        params: InitConfigParams {
                            operator: parse_pubkey("operator", &operator)?,
                            ltv_max_bps: ltv_bps,
                            liquidation_threshold_bps: liq_threshold_bps,
                            liquidation_bonus_bps: liq_bonus_bps,
                            interest_rate_bps: rate_bps,
                            max_staleness_secs,
                            max_confidence_bps,
                        },
                    }
                    .data(),
                })
                .await?;
            println!("config initialized: {}", receipt.signature);
        }
        Command::WhitelistToken {
            mint,
            category,
            oracle,
            ltv_bps,
            liq_threshold_bps,
            liq_bonus_bps,
            max_deposit,
            min_deposit_usd_micro,
            disabled,
            lp_pool,
            lp_token_a,
            lp_token_b,
        } => {
            if ltv_bps > liq_threshold_bps || liq_threshold_bps > 10_000 {
                return Err(CliError::Validation(
                    "require ltv_bps <= liq_threshold_bps <= 10000".into(),
                ));
            }
            let mint = parse_pubkey("mint", &mint)?;
            let lp_pool = lp_pool.map(|v| parse_pubkey("lp pool", &v)).transpose()?;
            let lp_token_a = lp_token_a.map(|v| parse_pubkey("lp token a", &v)).transpose()?;
            let lp_token_b = lp_token_b.map(|v| parse_pubkey("lp token b", &v)).transpose()?;
            let accounts = karta_credit::accounts::WhitelistToken {
                config: client.config_address(),
                whitelist: client.whitelist_address(&mint),
                mint,
                oracle: parse_pubkey("oracle", &oracle)?,
                vault_authority: client.vault_authority_address(),
                vault: client.vault_address(&mint),
                admin,
                token_program: anchor_spl::token::ID,
                system_program: anchor_lang::system_program::ID,
            }
            .to_account_metas(None);
            let receipt = client
                .send_instruction(Instruction {
                    program_id,
                    accounts,
                    data: karta_credit::instruction::WhitelistToken {
                        params: WhitelistTokenParams {
                            category: category.into(),
                            max_ltv_bps: ltv_bps,
                            liquidation_threshold_bps: liq_threshold_bps,
                            liquidation_bonus_bps: liq_bonus_bps,
                            enabled: !disabled,
                            max_deposit,
                            min_deposit_usd_micro,
                            lp_pool,
                            lp_token_a,
                            lp_token_b,
                        },
                    }
                    .data(),
                })
                .await?;
            println!("whitelisted {mint}: {}", receipt.signature);
        }
        Command::SetOracle { mint, oracle } => {
            let mint = parse_pubkey("mint", &mint)?;
            let accounts = karta_credit::accounts::SetOracle {
                config: client.config_address(),
                whitelist: client.whitelist_address(&mint),
                new_oracle: parse_pubkey("oracle", &oracle)?,
                admin,
            }
            .to_account_metas(None);
            let receipt = client
                .send_instruction(Instruction {
                    program_id,
                    accounts,
                    data: karta_credit::instruction::SetOracle {}.data(),
                })
                .await?;
            println!("oracle rotated for {mint}: {}", receipt.signature);
        }
        Command::SetOperator { operator } => {
            let accounts = karta_credit::accounts::SetOperator {
                config: client.config_address(),
                admin,
            }
            .to_account_metas(None);
            let receipt = client
                .send_instruction(Instruction {
                    program_id,
                    accounts,
                    data: karta_credit::instruction::SetOperator {
                        new_operator: parse_pubkey("operator", &operator)?,
                    }
                    .data(),
                })
                .await?;
            println!("operator rotated: {}", receipt.signature);
        }
        command @ (Command::Pause | Command::Unpause) => {
            let paused = matches!(command, Command::Pause);
            let accounts = karta_credit::accounts::SetPause {
                config: client.config_address(),
                admin,
            }
            .to_account_metas(None);
            let receipt = client
                .send_instruction(Instruction {
                    program_id,
                    accounts,
                    data: karta_credit::instruction::SetPause { paused }.data(),
                })
                .await?;
            println!("paused={paused}: {}", receipt.signature);
        }
        Command::RotateAdmin { new_admin } => {
            let accounts = karta_credit::accounts::RotateAdmin {
                config: client.config_address(),
                admin,
            }
            .to_account_metas(None);
            let receipt = client
                .send_instruction(Instruction {
                    program_id,
                    accounts,
                    data: karta_credit::instruction::RotateAdmin {
                        new_admin: parse_pubkey("new admin", &new_admin)?,
                    }
                    .data(),
                })
                .await?;
            println!("admin rotated: {}", receipt.signature);
        }
        Command::InspectPosition { owner } => {
            let owner = parse_pubkey("owner", &owner)?;
            let config = client.fetch_config().await?;
            let position = client
                .fetch_position(&owner)
                .await?
                .ok_or_else(|| CliError::Validation(format!("no position for {owner}")))?;

            let now = chrono::Utc::now().timestamp();
            let index = math::compound_index(
                config.global_borrow_index,
                config.interest_rate_bps,
                now.saturating_sub(config.last_update_timestamp),
            )
            .map_err(|e| CliError::Validation(e.to_string()))?;
            let debt = position
                .current_debt_usd_micro(index)
                .map_err(|e| CliError::Validation(e.to_string()))?;

            let collateral: Vec<serde_json::Value> = position
                .collateral
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "mint": c.mint.to_string(),
                        "amount": c.amount,
                    })
                })
                .collect();
            let report = serde_json::json!({
                "owner": position.owner.to_string(),
                "address": client.position_address(&owner).to_string(),
                "collateral": collateral,
                "debt_shares": position.debt_shares.to_string(),
                "borrow_index_snapshot": position.borrow_index_snapshot.to_string(),
                "current_debt_usd_micro": debt,
                "global_borrow_index": index.to_string(),
                "last_update_timestamp": position.last_update_timestamp,
            });
            println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err.message());
            ExitCode::from(err.exit_code())
        }
    }
}
