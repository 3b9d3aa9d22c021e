//! One chain client owned by the service for its whole lifetime; every
//! submitter worker and indexer scan goes through it.

use std::sync::Arc;

use anchor_lang::{AccountDeserialize, Discriminator, InstructionData, ToAccountMetas};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::{AccountMeta, Instruction, InstructionError};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::{Transaction, TransactionError};

use karta_credit::constants::{
    CONFIG_SEED, POSITION_SEED, VAULT_AUTHORITY_SEED, VAULT_SEED, WHITELIST_SEED,
};
use karta_credit::state::{CollateralAsset, Config, Position};

use crate::error::ChainError;
use crate::submitter::JobKind;

#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub signature: String,
    pub slot: u64,
}

/// Seam between the submitter and the chain so tests run against a mock.
#[async_trait]
pub trait TxSender: Send + Sync {
    async fn submit(&self, job: &JobKind) -> Result<TxReceipt, ChainError>;
}

pub struct ChainClient {
    rpc: Arc<RpcClient>,
    payer: Keypair,
    program_id: Pubkey,
}

impl ChainClient {
    pub fn new(rpc_url: &str, payer: Keypair, program_id: Pubkey) -> Self {
        let rpc = Arc::new(RpcClient::new_with_commitment(
            rpc_url.to_string(),
            CommitmentConfig::confirmed(),
        ));
        Self {
            rpc,
            payer,
            program_id,
        }
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    pub fn payer_pubkey(&self) -> Pubkey {
        self.payer.pubkey()
    }

    pub fn rpc(&self) -> Arc<RpcClient> {
        self.rpc.clone()
    }

    // -- address derivation ------------------------------------------------

    pub fn config_address(&self) -> Pubkey {
        Pubkey::find_program_address(&[CONFIG_SEED], &self.program_id).0
    }

    pub fn position_address(&self, owner: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[POSITION_SEED, owner.as_ref()], &self.program_id).0
    }

    pub fn whitelist_address(&self, mint: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[WHITELIST_SEED, mint.as_ref()], &self.program_id).0
    }

    pub fn vault_address(&self, mint: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[VAULT_SEED, mint.as_ref()], &self.program_id).0
    }

    pub fn vault_authority_address(&self) -> Pubkey {
        Pubkey::find_program_address(&[VAULT_AUTHORITY_SEED], &self.program_id).0
    }

    // -- account reads -----------------------------------------------------

    fn decode<T: AccountDeserialize>(address: &Pubkey, data: &[u8]) -> Result<T, ChainError> {
        T::try_deserialize(&mut &data[..])
            .map_err(|e| ChainError::Decode(format!("{address}: {e}")))
    }

    pub async fn fetch_config(&self) -> Result<Config, ChainError> {
        let address = self.config_address();
        let account = self
            .rpc
            .get_account(&address)
            .await
            .map_err(|_| ChainError::AccountNotFound(address.to_string()))?;
        Self::decode(&address, &account.data)
    }

    pub async fn fetch_position(&self, owner: &Pubkey) -> Result<Option<Position>, ChainError> {
        let address = self.position_address(owner);
        match self.rpc.get_account(&address).await {
            Ok(account) => Ok(Some(Self::decode(&address, &account.data)?)),
            Err(_) => Ok(None),
        }
    }

    pub async fn fetch_whitelist(&self, mint: &Pubkey) -> Result<CollateralAsset, ChainError> {
        let address = self.whitelist_address(mint);
        let account = self
            .rpc
            .get_account(&address)
            .await
            .map_err(|_| ChainError::AccountNotFound(address.to_string()))?;
        Self::decode(&address, &account.data)
    }

    /// Full scan of every position account, used by the indexer cold start
    /// and its periodic rescans.
    pub async fn fetch_all_positions(&self) -> Result<Vec<(Pubkey, Position)>, ChainError> {
        let filters = vec![RpcFilterType::Memcmp(Memcmp::new_raw_bytes(
            0,
            Position::DISCRIMINATOR.to_vec(),
        ))];
        let config = RpcProgramAccountsConfig {
            filters: Some(filters),
            account_config: RpcAccountInfoConfig {
                encoding: Some(solana_account_decoder::UiAccountEncoding::Base64),
                ..Default::default()
            },
            ..Default::default()
        };
        let accounts = self
            .rpc
            .get_program_accounts_with_config(&self.program_id, config)
            .await?;
        accounts
            .into_iter()
            .map(|(address, account)| {
                Self::decode::<Position>(&address, &account.data).map(|p| (address, p))
            })
            .collect()
    }

    pub async fn get_slot(&self) -> Result<u64, ChainError> {
        Ok(self.rpc.get_slot().await?)
    }

    /// Valuation accounts for a position: one (whitelist, oracle) pair per
    /// collateral entry, in position order.
    pub async fn collateral_metas(
        &self,
        position: &Position,
    ) -> Result<Vec<AccountMeta>, ChainError> {
        let mut metas = Vec::with_capacity(position.collateral.len() * 2);
        for entry in &position.collateral {
            let whitelist_address = self.whitelist_address(&entry.mint);
            let whitelist = self.fetch_whitelist(&entry.mint).await?;
            metas.push(AccountMeta::new_readonly(whitelist_address, false));
            metas.push(AccountMeta::new_readonly(whitelist.oracle, false));
        }
        Ok(metas)
    }

    // -- instruction submission --------------------------------------------

    fn map_send_error(error: solana_client::client_error::ClientError) -> ChainError {
        if let Some(TransactionError::InstructionError(_, InstructionError::Custom(code))) =
            error.get_transaction_error()
        {
            return ChainError::Program {
                code,
                name: credit_error_name(code),
            };
        }
        ChainError::Rpc(error)
    }

    pub async fn send_instruction(&self, instruction: Instruction) -> Result<TxReceipt, ChainError> {
        let blockhash = self.rpc.get_latest_blockhash().await?;
        let tx = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&self.payer.pubkey()),
            &[&self.payer],
            blockhash,
        );
        let signature = self
            .rpc
            .send_and_confirm_transaction(&tx)
            .await
            .map_err(Self::map_send_error)?;
        let slot = self.rpc.get_slot().await.unwrap_or_default();
        Ok(TxReceipt {
            signature: signature.to_string(),
            slot,
        })
    }

    pub async fn record_debt(
        &self,
        owner: &Pubkey,
        amount_usd_micro: u64,
        auth_tag: [u8; 32],
    ) -> Result<TxReceipt, ChainError> {
        let position = self
            .fetch_position(owner)
            .await?
            .ok_or_else(|| ChainError::AccountNotFound(format!("position for {owner}")))?;
        let mut accounts = karta_credit::accounts::RecordDebt {
            config: self.config_address(),
            owner: *owner,
            position: self.position_address(owner),
            operator: self.payer.pubkey(),
        }
        .to_account_metas(None);
        accounts.extend(self.collateral_metas(&position).await?);

        self.send_instruction(Instruction {
            program_id: self.program_id,
            accounts,
            data: karta_credit::instruction::RecordDebt {
                amount_usd_micro,
                auth_tag,
            }
            .data(),
        })
        .await
    }

    /// Protocol-funded repay: the service keypair pays from its own
    /// stablecoin ATA on the owner's behalf.
    pub async fn repay_debt(
        &self,
        owner: &Pubkey,
        amount_usd_micro: u64,
    ) -> Result<TxReceipt, ChainError> {
        let config = self.fetch_config().await?;
        let payer_token = anchor_spl::associated_token::get_associated_token_address(
            &self.payer.pubkey(),
            &config.debt_mint,
        );
        let accounts = karta_credit::accounts::RepayDebt {
            config: self.config_address(),
            owner: *owner,
            position: self.position_address(owner),
            payer_token,
            treasury: self.vault_address(&config.debt_mint),
            payer: self.payer.pubkey(),
            token_program: anchor_spl::token::ID,
        }
        .to_account_metas(None);

        self.send_instruction(Instruction {
            program_id: self.program_id,
            accounts,
            data: karta_credit::instruction::RepayDebt { amount_usd_micro }.data(),
        })
        .await
    }

    pub async fn liquidate(
        &self,
        owner: &Pubkey,
        repay_usd_micro: u64,
        seize_mint: &Pubkey,
    ) -> Result<TxReceipt, ChainError> {
        let config = self.fetch_config().await?;
        let position = self
            .fetch_position(owner)
            .await?
            .ok_or_else(|| ChainError::AccountNotFound(format!("position for {owner}")))?;
        let seize_whitelist = self.fetch_whitelist(seize_mint).await?;
        let mut accounts = karta_credit::accounts::Liquidate {
            config: self.config_address(),
            owner: *owner,
            position: self.position_address(owner),
            seize_mint: *seize_mint,
            seize_whitelist: self.whitelist_address(seize_mint),
            seize_oracle: seize_whitelist.oracle,
            liquidator_debt_token: anchor_spl::associated_token::get_associated_token_address(
                &self.payer.pubkey(),
                &config.debt_mint,
            ),
            liquidator_seize_token: anchor_spl::associated_token::get_associated_token_address(
                &self.payer.pubkey(),
                seize_mint,
            ),
            treasury: self.vault_address(&config.debt_mint),
            seize_vault: self.vault_address(seize_mint),
            vault_authority: self.vault_authority_address(),
            liquidator: self.payer.pubkey(),
            token_program: anchor_spl::token::ID,
        }
        .to_account_metas(None);
        accounts.extend(self.collateral_metas(&position).await?);

        self.send_instruction(Instruction {
            program_id: self.program_id,
            accounts,
            data: karta_credit::instruction::Liquidate { repay_usd_micro }.data(),
        })
        .await
    }
}

/// Anchor custom error codes start at 6000 in declaration order.
pub fn credit_error_code(error: karta_credit::errors::CreditError) -> u32 {
    error as u32 + 6000
}

/// Names in declaration order of `CreditError`; codes start at 6000.
const CREDIT_ERROR_NAMES: &[&str] = &[
    "InvalidAmount",
    "InvalidParameters",
    "MathOverflow",
    "Unauthorized",
    "ProtocolPaused",
    "NotWhitelisted",
    "AssetDisabled",
    "DepositCapExceeded",
    "BelowMinimumDeposit",
    "MaxCollateralTypesReached",
    "InsufficientCollateral",
    "InsufficientCollateralOfMint",
    "HealthViolation",
    "NothingToRepay",
    "NotLiquidatable",
    "CloseFactorExceeded",
    "StalePrice",
    "LowConfidence",
    "InvalidOracle",
    "DuplicateAuthorization",
    "WhitelistMintMismatch",
    "InvalidTokenAccount",
    "MissingCollateralAccounts",
];

fn credit_error_name(code: u32) -> String {
    code.checked_sub(6000)
        .and_then(|index| CREDIT_ERROR_NAMES.get(index as usize))
        .map(|name| name.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[async_trait]
impl TxSender for ChainClient {
    async fn submit(&self, job: &JobKind) -> Result<TxReceipt, ChainError> {
        match job {
            JobKind::RecordDebt {
                owner,
                amount_usd_micro,
                auth_tag,
                ..
            } => self.record_debt(owner, *amount_usd_micro, *auth_tag).await,
            JobKind::RepayDebt {
                owner,
                amount_usd_micro,
            } => self.repay_debt(owner, *amount_usd_micro).await,
            JobKind::Liquidate {
                owner,
                repay_usd_micro,
                seize_mint,
            } => self.liquidate(owner, *repay_usd_micro, seize_mint).await,
        }
    }
}
