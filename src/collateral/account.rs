//! Collateral accounts and their deterministic ids.
//!
//! Every party has one general account per asset and one margin account per
//! (market, asset) it trades. Every market has one insurance and one
//! settlement account per asset, owned by the system.

use crate::types::{AccountId, Asset, MarketId, PartyId};
use serde::{Deserialize, Serialize};

pub const NO_MARKET: &str = "no-market";
pub const SYSTEM_OWNER: &str = "*system*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Insurance,
    Settlement,
    Margin,
    General,
}

impl AccountType {
    /// Last byte of the account id: ASCII digit of the type code.
    pub fn byte(&self) -> u8 {
        let code = match self {
            AccountType::Insurance => 1,
            AccountType::Settlement => 2,
            AccountType::Margin => 3,
            AccountType::General => 4,
        };
        b'0' + code
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub market_id: Option<MarketId>,
    /// None for system accounts.
    pub owner: Option<PartyId>,
    pub asset: Asset,
    pub account_type: AccountType,
    pub balance: u64,
}

impl Account {
    pub fn new(
        market_id: Option<MarketId>,
        owner: Option<PartyId>,
        asset: Asset,
        account_type: AccountType,
    ) -> Self {
        let id = account_id(market_id.as_ref(), owner.as_ref(), &asset, account_type);
        Self {
            id,
            market_id,
            owner,
            asset,
            account_type,
            balance: 0,
        }
    }

    pub fn is_system(&self) -> bool {
        self.owner.is_none()
    }
}

/// `market | "no-market"` + `owner | "*system*"` + asset + type byte.
pub fn account_id(
    market: Option<&MarketId>,
    owner: Option<&PartyId>,
    asset: &Asset,
    account_type: AccountType,
) -> AccountId {
    let market = market.map(MarketId::as_str).filter(|m| !m.is_empty()).unwrap_or(NO_MARKET);
    let owner = owner.map(PartyId::as_str).filter(|o| !o.is_empty()).unwrap_or(SYSTEM_OWNER);

    let mut id = String::with_capacity(market.len() + owner.len() + asset.as_str().len() + 1);
    id.push_str(market);
    id.push_str(owner);
    id.push_str(asset.as_str());
    id.push(char::from(account_type.byte()));
    AccountId(id)
}

pub fn general_id(party: &PartyId, asset: &Asset) -> AccountId {
    account_id(None, Some(party), asset, AccountType::General)
}

pub fn margin_id(market: &MarketId, party: &PartyId, asset: &Asset) -> AccountId {
    account_id(Some(market), Some(party), asset, AccountType::Margin)
}

pub fn insurance_id(market: &MarketId, asset: &Asset) -> AccountId {
    account_id(Some(market), None, asset, AccountType::Insurance)
}

pub fn settlement_id(market: &MarketId, asset: &Asset) -> AccountId {
    account_id(Some(market), None, asset, AccountType::Settlement)
}
