//! Collateral engine: balances and the ledger.
//!
//! Every movement is described as a [`TransferRequest`] (ordered sources,
//! destinations, amount) and resolved into [`LedgerEntry`]s. Account checks
//! run before any balance changes, so a structural error leaves the engine
//! untouched. A batch that fails part way is rolled back before the error
//! is returned, and only completed batches reach the journal.

use super::account::{general_id, insurance_id, margin_id, settlement_id, Account, AccountType};
use super::{CollateralConfig, CollateralError};
use crate::risk::MarginChange;
use crate::transfer::{
    LedgerEntry, Transfer, TransferBalance, TransferRequest, TransferResponse, TransferType,
};
use crate::types::{AccountId, Asset, MarketId, PartyId, Timestamp};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Settlement batches are collected in two passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollectStep {
    /// margin, insurance -> settlement
    Loss,
    /// settlement, insurance -> general
    Win,
}

#[derive(Debug, Default)]
pub struct CollateralEngine {
    config: CollateralConfig,
    accounts: HashMap<AccountId, Account>,
    journal: Vec<LedgerEntry>,
    now: Timestamp,
}

impl CollateralEngine {
    pub fn new(config: CollateralConfig) -> Self {
        Self {
            config,
            accounts: HashMap::new(),
            journal: Vec::new(),
            now: Timestamp::default(),
        }
    }

    pub fn config(&self) -> &CollateralConfig {
        &self.config
    }

    pub fn reconfigure(&mut self, config: CollateralConfig) -> CollateralConfig {
        let old = std::mem::replace(&mut self.config, config);
        self.record(Vec::new());
        old
    }

    /// Time stamped on every ledger entry from here on.
    pub fn set_time(&mut self, now: Timestamp) {
        self.now = now;
    }

    /// Most recent ledger entries, oldest first. Bounded by `max_journal_entries`.
    pub fn journal(&self) -> &[LedgerEntry] {
        &self.journal
    }

    /// Hand the journal to the caller and start a fresh one.
    pub fn drain_journal(&mut self) -> Vec<LedgerEntry> {
        std::mem::take(&mut self.journal)
    }

    pub fn get_account(&self, id: &AccountId) -> Result<&Account, CollateralError> {
        self.accounts
            .get(id)
            .ok_or_else(|| CollateralError::AccountDoNotExists(id.clone()))
    }

    pub fn balance_of(&self, id: &AccountId) -> Result<u64, CollateralError> {
        self.get_account(id).map(|a| a.balance)
    }

    pub fn general_balance(&self, party: &PartyId, asset: &Asset) -> u64 {
        self.balance_of(&general_id(party, asset)).unwrap_or(0)
    }

    pub fn margin_balance(&self, market: &MarketId, party: &PartyId, asset: &Asset) -> u64 {
        self.balance_of(&margin_id(market, party, asset)).unwrap_or(0)
    }

    /// Sum over every account holding `asset`.
    pub fn total_balance(&self, asset: &Asset) -> u128 {
        self.accounts
            .values()
            .filter(|a| &a.asset == asset)
            .map(|a| a.balance as u128)
            .sum()
    }

    /// Insurance and settlement accounts for a new market. Returns (insurance, settlement).
    pub fn create_market_accounts(
        &mut self,
        market: &MarketId,
        asset: &Asset,
        insurance: u64,
    ) -> Result<(AccountId, AccountId), CollateralError> {
        let ins = insurance_id(market, asset);
        let settle = settlement_id(market, asset);
        for id in [&ins, &settle] {
            if self.accounts.contains_key(id) {
                return Err(CollateralError::AccountAlreadyExists(id.clone()));
            }
        }

        let mut ins_acc = Account::new(Some(market.clone()), None, asset.clone(), AccountType::Insurance);
        ins_acc.balance = insurance;
        let settle_acc = Account::new(Some(market.clone()), None, asset.clone(), AccountType::Settlement);
        self.accounts.insert(ins.clone(), ins_acc);
        self.accounts.insert(settle.clone(), settle_acc);

        info!(market = %market, asset = %asset, insurance, "market accounts created");
        Ok((ins, settle))
    }

    /// General account for `party`. Does nothing if it already exists.
    pub fn create_trader_accounts(&mut self, party: &PartyId, asset: &Asset) -> AccountId {
        let id = general_id(party, asset);
        self.accounts.entry(id.clone()).or_insert_with(|| {
            debug!(party = %party, asset = %asset, "general account created");
            Account::new(None, Some(party.clone()), asset.clone(), AccountType::General)
        });
        id
    }

    /// Margin account for `party` in `market`. Needs the general account and the market.
    pub fn add_trader_to_market(
        &mut self,
        market: &MarketId,
        party: &PartyId,
        asset: &Asset,
    ) -> Result<AccountId, CollateralError> {
        self.require_system(market, asset)?;
        if !self.accounts.contains_key(&general_id(party, asset)) {
            return Err(CollateralError::TraderAccountsMissing {
                market: market.clone(),
                party: party.clone(),
                asset: asset.clone(),
            });
        }
        let id = margin_id(market, party, asset);
        self.accounts.entry(id.clone()).or_insert_with(|| {
            Account::new(Some(market.clone()), Some(party.clone()), asset.clone(), AccountType::Margin)
        });
        Ok(id)
    }

    pub fn update_balance(&mut self, id: &AccountId, balance: u64) -> Result<(), CollateralError> {
        let account = self
            .accounts
            .get_mut(id)
            .ok_or_else(|| CollateralError::AccountDoNotExists(id.clone()))?;
        account.balance = balance;
        Ok(())
    }

    pub fn increment_balance(&mut self, id: &AccountId, delta: i64) -> Result<u64, CollateralError> {
        let account = self
            .accounts
            .get_mut(id)
            .ok_or_else(|| CollateralError::AccountDoNotExists(id.clone()))?;
        let next = if delta >= 0 {
            account.balance.checked_add(delta.unsigned_abs())
        } else {
            account.balance.checked_sub(delta.unsigned_abs())
        };
        let next = next.ok_or_else(|| CollateralError::InsufficientBalance {
            account: id.clone(),
            balance: account.balance,
            delta,
        })?;
        account.balance = next;
        Ok(next)
    }

    /// Funds arriving from outside. Creates the general account unless configured not to.
    pub fn deposit(&mut self, party: &PartyId, asset: &Asset, amount: u64) -> Result<u64, CollateralError> {
        let id = if self.config.auto_create_accounts {
            self.create_trader_accounts(party, asset)
        } else {
            general_id(party, asset)
        };
        let delta = i64::try_from(amount).map_err(|_| CollateralError::AmountOverflow)?;
        self.increment_balance(&id, delta)
    }

    /// Collect a settlement batch. Losses are collected first; wins are paid out
    /// of what was collected, scaled down when losses fell short.
    pub fn transfer(
        &mut self,
        market: &MarketId,
        transfers: &[Transfer],
    ) -> Result<Vec<TransferResponse>, CollateralError> {
        for t in transfers {
            if !t.transfer_type.is_settlement() {
                return Err(CollateralError::InvalidTransferType(t.transfer_type));
            }
            t.total().ok_or(CollateralError::AmountOverflow)?;
            self.require_system(market, &t.amount.asset)?;
            self.require_trader(market, &t.owner, &t.amount.asset)?;
        }

        let mut responses = Vec::with_capacity(transfers.len());
        let outcome = self.collect_batch(market, transfers, &mut responses);
        self.finish(responses, outcome)
    }

    fn collect_batch(
        &mut self,
        market: &MarketId,
        transfers: &[Transfer],
        responses: &mut Vec<TransferResponse>,
    ) -> Result<(), CollateralError> {
        let (losses, wins): (Vec<&Transfer>, Vec<&Transfer>) =
            transfers.iter().partition(|t| t.transfer_type.is_loss());

        let mut expected: u128 = 0;
        let mut collected: u128 = 0;
        for t in losses {
            let resp = self.collect(CollectStep::Loss, market, t, None)?;
            expected += resp.requested as u128;
            collected += resp.moved() as u128;
            responses.push(resp);
        }

        let haircut = if collected < expected {
            warn!(
                market = %market,
                expected = expected as u64,
                collected = collected as u64,
                "loss collection short, scaling wins"
            );
            Some((collected, expected))
        } else {
            None
        };

        for t in wins {
            responses.push(self.collect(CollectStep::Win, market, t, haircut)?);
        }
        Ok(())
    }

    fn collect(
        &mut self,
        step: CollectStep,
        market: &MarketId,
        transfer: &Transfer,
        haircut: Option<(u128, u128)>,
    ) -> Result<TransferResponse, CollateralError> {
        let asset = &transfer.amount.asset;
        let total = transfer.total().ok_or(CollateralError::AmountOverflow)?;
        let amount = match haircut {
            Some((collected, expected)) if expected > 0 => {
                // collected < expected, so the quotient fits back into u64
                (total as u128 * collected / expected) as u64
            }
            _ => total,
        };

        let (from, to) = match step {
            CollectStep::Loss => (
                vec![margin_id(market, &transfer.owner, asset), insurance_id(market, asset)],
                vec![settlement_id(market, asset)],
            ),
            CollectStep::Win => (
                vec![settlement_id(market, asset), insurance_id(market, asset)],
                vec![general_id(&transfer.owner, asset)],
            ),
        };
        let request = TransferRequest {
            from,
            to,
            amount,
            min_amount: 0,
            asset: asset.clone(),
            reference: format!("{}:{}", transfer.transfer_type, market),
        };
        let resp = self.execute(&transfer.owner, transfer.transfer_type, &request)?;
        if step == CollectStep::Loss && resp.shortfall() > 0 {
            warn!(market = %market, party = %transfer.owner, owed = amount, short = resp.shortfall(), "loss not fully covered");
        }
        Ok(resp)
    }

    /// Apply risk margin changes. Returns the responses and the parties that
    /// could not meet their minimum top-up.
    pub fn margin_update(
        &mut self,
        market: &MarketId,
        changes: &[MarginChange],
    ) -> Result<(Vec<TransferResponse>, Vec<MarginChange>), CollateralError> {
        for change in changes {
            let t = &change.transfer;
            if !t.transfer_type.is_margin() {
                return Err(CollateralError::InvalidTransferType(t.transfer_type));
            }
            t.total().ok_or(CollateralError::AmountOverflow)?;
            self.require_trader(market, &t.owner, &t.amount.asset)?;
        }

        let mut responses = Vec::new();
        let mut distressed = Vec::new();
        let outcome = self.apply_margins(market, changes, &mut responses, &mut distressed);
        Ok((self.finish(responses, outcome)?, distressed))
    }

    fn apply_margins(
        &mut self,
        market: &MarketId,
        changes: &[MarginChange],
        responses: &mut Vec<TransferResponse>,
        distressed: &mut Vec<MarginChange>,
    ) -> Result<(), CollateralError> {
        for change in changes {
            let t = &change.transfer;
            let asset = &t.amount.asset;
            let general = general_id(&t.owner, asset);
            let margin = margin_id(market, &t.owner, asset);
            let amount = t.total().ok_or(CollateralError::AmountOverflow)?;

            let (from, to) = match t.transfer_type {
                TransferType::MarginLow => {
                    let available = self.balance_of(&general)?;
                    if available < t.min_amount {
                        debug!(market = %market, party = %t.owner, available, min = t.min_amount, "party distressed");
                        distressed.push(change.clone());
                        continue;
                    }
                    (general, margin)
                }
                _ => (margin, general),
            };
            let request = TransferRequest {
                from: vec![from],
                to: vec![to],
                amount,
                min_amount: t.min_amount,
                asset: asset.clone(),
                reference: format!("{}:{}", t.transfer_type, market),
            };
            responses.push(self.execute(&t.owner, t.transfer_type, &request)?);
        }
        Ok(())
    }

    /// Sweep every margin account of a closed market back to general, and
    /// whatever is left in settlement into insurance.
    pub fn clear_market(
        &mut self,
        market: &MarketId,
        asset: &Asset,
    ) -> Result<Vec<TransferResponse>, CollateralError> {
        self.require_system(market, asset)?;

        let mut owners: Vec<PartyId> = self
            .accounts
            .values()
            .filter(|a| {
                a.account_type == AccountType::Margin
                    && a.market_id.as_ref() == Some(market)
                    && &a.asset == asset
                    && a.balance > 0
            })
            .filter_map(|a| a.owner.clone())
            .collect();
        owners.sort();

        let mut responses = Vec::with_capacity(owners.len());
        let outcome = self.sweep_market(market, asset, owners, &mut responses);
        let responses = self.finish(responses, outcome)?;
        info!(market = %market, asset = %asset, accounts = responses.len(), "market cleared");
        Ok(responses)
    }

    fn sweep_market(
        &mut self,
        market: &MarketId,
        asset: &Asset,
        owners: Vec<PartyId>,
        responses: &mut Vec<TransferResponse>,
    ) -> Result<(), CollateralError> {
        for party in owners {
            let margin = margin_id(market, &party, asset);
            let general = self.create_trader_accounts(&party, asset);
            let balance = self.balance_of(&margin)?;
            responses.push(self.sweep(&party, TransferType::MarginHigh, margin, general, balance, market)?);
        }

        let settle = settlement_id(market, asset);
        let residue = self.balance_of(&settle)?;
        if residue > 0 {
            let ins = insurance_id(market, asset);
            let system = PartyId::from(super::account::SYSTEM_OWNER);
            responses.push(self.sweep(&system, TransferType::MarginHigh, settle, ins, residue, market)?);
        }
        Ok(())
    }

    /// Move distressed parties' margin into insurance. Accounts are kept.
    pub fn remove_distressed(
        &mut self,
        market: &MarketId,
        parties: &[PartyId],
        asset: &Asset,
    ) -> Result<Vec<TransferResponse>, CollateralError> {
        self.require_system(market, asset)?;
        for party in parties {
            self.require_trader(market, party, asset)?;
        }

        let mut responses = Vec::new();
        let outcome = self.sweep_distressed(market, parties, asset, &mut responses);
        self.finish(responses, outcome)
    }

    fn sweep_distressed(
        &mut self,
        market: &MarketId,
        parties: &[PartyId],
        asset: &Asset,
        responses: &mut Vec<TransferResponse>,
    ) -> Result<(), CollateralError> {
        for party in parties {
            let margin = margin_id(market, party, asset);
            let balance = self.balance_of(&margin)?;
            if balance == 0 {
                continue;
            }
            let ins = insurance_id(market, asset);
            responses.push(self.sweep(party, TransferType::Loss, margin, ins, balance, market)?);
        }
        Ok(())
    }

    /// Put back a batch that was already applied, e.g. when the step after it
    /// failed. The reversing entries are journaled like any other movement.
    pub fn revert(&mut self, responses: &[TransferResponse]) -> Result<Vec<LedgerEntry>, CollateralError> {
        let mut reversed: Vec<LedgerEntry> = Vec::new();
        for entry in responses.iter().rev().flat_map(|r| r.entries.iter().rev()) {
            if let Err(err) = self.move_funds(&entry.to, &entry.from, entry.amount) {
                self.undo(&reversed);
                return Err(err);
            }
            reversed.push(LedgerEntry {
                from: entry.to.clone(),
                to: entry.from.clone(),
                amount: entry.amount,
                reference: format!("revert:{}", entry.reference),
                timestamp: self.now,
            });
        }
        warn!(entries = reversed.len(), "transfers reverted");
        self.record(reversed.clone());
        Ok(reversed)
    }

    // journal a completed batch, or unwind every balance it touched
    fn finish(
        &mut self,
        responses: Vec<TransferResponse>,
        outcome: Result<(), CollateralError>,
    ) -> Result<Vec<TransferResponse>, CollateralError> {
        if let Err(err) = outcome {
            for response in responses.iter().rev() {
                self.undo(&response.entries);
            }
            warn!(applied = responses.len(), error = %err, "batch rolled back");
            return Err(err);
        }
        self.record(responses.iter().flat_map(|r| r.entries.iter().cloned()).collect());
        Ok(responses)
    }

    fn record(&mut self, entries: Vec<LedgerEntry>) {
        self.journal.extend(entries);
        let max = self.config.max_journal_entries;
        if self.journal.len() > max {
            let drain_count = self.journal.len() - max;
            self.journal.drain(0..drain_count);
        }
    }

    // the entries were applied just now, so reversing them cannot run short
    fn undo(&mut self, entries: &[LedgerEntry]) {
        for entry in entries.iter().rev() {
            if let Some(to) = self.accounts.get_mut(&entry.to) {
                to.balance = to.balance.saturating_sub(entry.amount);
            }
            if let Some(from) = self.accounts.get_mut(&entry.from) {
                from.balance = from.balance.saturating_add(entry.amount);
            }
        }
    }

    fn sweep(
        &mut self,
        owner: &PartyId,
        transfer_type: TransferType,
        from: AccountId,
        to: AccountId,
        amount: u64,
        market: &MarketId,
    ) -> Result<TransferResponse, CollateralError> {
        let asset = self.get_account(&from)?.asset.clone();
        let request = TransferRequest {
            from: vec![from],
            to: vec![to],
            amount,
            min_amount: 0,
            asset,
            reference: format!("{}:{}", transfer_type, market),
        };
        self.execute(owner, transfer_type, &request)
    }

    // walks `from` in order. each account gives min(balance, remaining), split
    // evenly over `to` with the remainder on the last destination.
    fn execute(
        &mut self,
        owner: &PartyId,
        transfer_type: TransferType,
        request: &TransferRequest,
    ) -> Result<TransferResponse, CollateralError> {
        let mut credited = vec![0u64; request.to.len()];
        let mut entries = Vec::new();
        let mut remaining = request.amount;

        for from in &request.from {
            if remaining == 0 || request.to.is_empty() {
                break;
            }
            let available = self.balance_of(from)?;
            let take = available.min(remaining);
            if take == 0 {
                continue;
            }

            let n = request.to.len() as u64;
            let part = take / n;
            let remainder = take % n;
            let last = request.to.len() - 1;
            for ((i, to), slot) in request.to.iter().enumerate().zip(credited.iter_mut()) {
                let amount = if i == last { part + remainder } else { part };
                if amount == 0 {
                    continue;
                }
                if let Err(err) = self.move_funds(from, to, amount) {
                    self.undo(&entries);
                    return Err(err);
                }
                *slot += amount;
                entries.push(LedgerEntry {
                    from: from.clone(),
                    to: to.clone(),
                    amount,
                    reference: request.reference.clone(),
                    timestamp: self.now,
                });
            }
            remaining -= take;
        }

        Ok(TransferResponse {
            owner: owner.clone(),
            transfer_type,
            requested: request.amount,
            entries,
            balances: request
                .to
                .iter()
                .cloned()
                .zip(credited)
                .map(|(account, balance)| TransferBalance { account, balance })
                .collect(),
        })
    }

    fn move_funds(&mut self, from: &AccountId, to: &AccountId, amount: u64) -> Result<(), CollateralError> {
        let to_balance = self.balance_of(to)?;
        // credit first so a missing or full destination leaves the source untouched
        let credited = to_balance.checked_add(amount).ok_or(CollateralError::AmountOverflow)?;
        let source = self
            .accounts
            .get_mut(from)
            .ok_or_else(|| CollateralError::AccountDoNotExists(from.clone()))?;
        let balance = source.balance;
        source.balance = balance
            .checked_sub(amount)
            .ok_or_else(|| CollateralError::InsufficientBalance {
                account: from.clone(),
                balance,
                delta: -(amount.min(i64::MAX as u64) as i64),
            })?;
        if let Some(dest) = self.accounts.get_mut(to) {
            dest.balance = credited;
        }
        Ok(())
    }

    fn require_system(&self, market: &MarketId, asset: &Asset) -> Result<(), CollateralError> {
        let present = self.accounts.contains_key(&insurance_id(market, asset))
            && self.accounts.contains_key(&settlement_id(market, asset));
        if present {
            Ok(())
        } else {
            Err(CollateralError::SystemAccountsMissing {
                market: market.clone(),
                asset: asset.clone(),
            })
        }
    }

    fn require_trader(&self, market: &MarketId, party: &PartyId, asset: &Asset) -> Result<(), CollateralError> {
        let present = self.accounts.contains_key(&margin_id(market, party, asset))
            && self.accounts.contains_key(&general_id(party, asset));
        if present {
            Ok(())
        } else {
            Err(CollateralError::TraderAccountsMissing {
                market: market.clone(),
                party: party.clone(),
                asset: asset.clone(),
            })
        }
    }
}
