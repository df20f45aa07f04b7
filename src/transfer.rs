// 5.0 transfer.rs: money movement requests and their ledger facts.
// settlement and risk produce Transfers, collateral turns them into LedgerEntries.

use crate::types::{AccountId, Asset, PartyId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferType {
    Loss,
    Win,
    MtmLoss,
    MtmWin,
    MarginLow,
    MarginHigh,
}

impl TransferType {
    pub fn is_loss(&self) -> bool {
        matches!(self, TransferType::Loss | TransferType::MtmLoss)
    }

    pub fn is_win(&self) -> bool {
        matches!(self, TransferType::Win | TransferType::MtmWin)
    }

    /// Produced by settlement, collected through the loss/win protocol.
    pub fn is_settlement(&self) -> bool {
        self.is_loss() || self.is_win()
    }

    pub fn is_margin(&self) -> bool {
        matches!(self, TransferType::MarginLow | TransferType::MarginHigh)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferType::Loss => "LOSS",
            TransferType::Win => "WIN",
            TransferType::MtmLoss => "MTM_LOSS",
            TransferType::MtmWin => "MTM_WIN",
            TransferType::MarginLow => "MARGIN_LOW",
            TransferType::MarginHigh => "MARGIN_HIGH",
        }
    }
}

impl std::fmt::Display for TransferType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed amount of one asset. Negative for losses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialAmount {
    pub asset: Asset,
    pub amount: i64,
}

impl FinancialAmount {
    pub fn new(asset: Asset, amount: i64) -> Self {
        Self { asset, amount }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub owner: PartyId,
    pub transfer_type: TransferType,
    pub amount: FinancialAmount,
    /// Multiplier on `amount`. Settlement always emits 1.
    pub size: u64,
    /// Smallest acceptable top-up for MARGIN_LOW. Zero elsewhere.
    pub min_amount: u64,
}

impl Transfer {
    pub fn new(owner: PartyId, transfer_type: TransferType, amount: FinancialAmount) -> Self {
        Self {
            owner,
            transfer_type,
            amount,
            size: 1,
            min_amount: 0,
        }
    }

    /// |amount| * size, None on overflow.
    pub fn total(&self) -> Option<u64> {
        self.amount.amount.unsigned_abs().checked_mul(self.size)
    }
}

/// Ordered sources and destinations for one movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub from: Vec<AccountId>,
    pub to: Vec<AccountId>,
    pub amount: u64,
    pub min_amount: u64,
    pub asset: Asset,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: u64,
    pub reference: String,
    pub timestamp: Timestamp,
}

/// Amount actually credited to one destination account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferBalance {
    pub account: AccountId,
    pub balance: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResponse {
    pub owner: PartyId,
    pub transfer_type: TransferType,
    pub requested: u64,
    pub entries: Vec<LedgerEntry>,
    pub balances: Vec<TransferBalance>,
}

impl TransferResponse {
    /// Total moved by all entries of this response.
    pub fn moved(&self) -> u64 {
        self.entries.iter().map(|e| e.amount).sum()
    }

    pub fn shortfall(&self) -> u64 {
        self.requested.saturating_sub(self.moved())
    }
}
