// 10.0 collateral/: who holds what. accounts, ledger moves, loss/win collection.
//   account.rs: Account, AccountType, deterministic account ids
//   engine.rs: CollateralEngine (transfer, margin_update, market lifecycle)

pub mod account;
pub mod engine;

pub use account::{account_id, Account, AccountType};
pub use engine::CollateralEngine;

use crate::transfer::TransferType;
use crate::types::{AccountId, Asset, MarketId, PartyId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollateralError {
    #[error("market {market} has no insurance/settlement accounts for {asset}")]
    SystemAccountsMissing { market: MarketId, asset: Asset },
    #[error("party {party} has no accounts for {asset} in market {market}")]
    TraderAccountsMissing {
        market: MarketId,
        party: PartyId,
        asset: Asset,
    },
    #[error("account {0} does not exist")]
    AccountDoNotExists(AccountId),
    #[error("account {0} already exists")]
    AccountAlreadyExists(AccountId),
    #[error("account {account} holds {balance}, cannot apply {delta}")]
    InsufficientBalance {
        account: AccountId,
        balance: u64,
        delta: i64,
    },
    #[error("{0} is not valid here")]
    InvalidTransferType(TransferType),
    #[error("transfer amount overflows")]
    AmountOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralConfig {
    /// Paid out of thin air into a new market's insurance account.
    pub insurance_seed: u64,
    /// Create a party's general account on first deposit.
    pub auto_create_accounts: bool,
    /// Ledger entries kept in memory. The oldest drop off past this.
    pub max_journal_entries: usize,
}

impl Default for CollateralConfig {
    fn default() -> Self {
        Self {
            insurance_seed: 0,
            auto_create_accounts: true,
            max_journal_entries: 100_000,
        }
    }
}
