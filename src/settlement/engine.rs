//! Settlement engine for one market.
//!
//! Each party carries the size and price it was last marked at, plus the lots
//! it traded since that mark. A mark pays `(mark - price) * size` on the
//! settled part and `(mark - lot_price) * lot_size` on every new lot, so
//! volume opened and closed between two marks only pays for the move it
//! actually held. The sum of all shares in one pass is zero.
//!
//! Marking is split in two: `prepare_*` computes the transfers and the state
//! the engine moves to, `commit` applies it. The caller commits only once
//! collateral accepted the transfers, so a failed collection can be retried
//! against the same positions.

use super::product::Product;
use super::SettlementError;
use crate::order::Trade;
use crate::position::MarketPosition;
use crate::transfer::{FinancialAmount, Transfer, TransferType};
use crate::types::{MarketId, PartyId, Price, Timestamp};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Size held since the last mark and the price of that mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettledPosition {
    pub size: i64,
    pub price: Price,
}

/// Signed volume traded at one price since the last mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lot {
    pub size: i64,
    pub price: Price,
}

/// Transfers for one mark or close-out, plus the state to adopt once they are collected.
#[derive(Debug, Clone)]
#[must_use]
pub struct PendingSettlement {
    transfers: Vec<Transfer>,
    positions: HashMap<PartyId, SettledPosition>,
    // None for the final close-out
    mark: Option<Price>,
}

impl PendingSettlement {
    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }
}

#[derive(Debug)]
pub struct SettlementEngine {
    market_id: MarketId,
    product: Box<dyn Product>,
    positions: HashMap<PartyId, SettledPosition>,
    unsettled: HashMap<PartyId, Vec<Lot>>,
    last_mark: Option<Price>,
}

impl SettlementEngine {
    pub fn new(market_id: MarketId, product: Box<dyn Product>) -> Self {
        Self {
            market_id,
            product,
            positions: HashMap::new(),
            unsettled: HashMap::new(),
            last_mark: None,
        }
    }

    pub fn product(&self) -> &dyn Product {
        self.product.as_ref()
    }

    pub fn product_mut(&mut self) -> &mut dyn Product {
        self.product.as_mut()
    }

    pub fn last_mark(&self) -> Option<Price> {
        self.last_mark
    }

    pub fn position(&self, party: &PartyId) -> Option<SettledPosition> {
        self.positions.get(party).copied()
    }

    pub fn has_unsettled_trades(&self) -> bool {
        self.unsettled.values().any(|lots| !lots.is_empty())
    }

    pub fn add_trade(&mut self, trade: &Trade) -> Result<(), SettlementError> {
        let size = i64::try_from(trade.size).map_err(|_| SettlementError::AmountOverflow)?;
        self.unsettled
            .entry(trade.buyer.clone())
            .or_default()
            .push(Lot { size, price: trade.price });
        self.unsettled
            .entry(trade.seller.clone())
            .or_default()
            .push(Lot { size: -size, price: trade.price });
        Ok(())
    }

    // parties in a stable order so every replica emits transfers identically
    fn parties(&self, extra: &[MarketPosition]) -> BTreeSet<PartyId> {
        self.positions
            .keys()
            .chain(self.unsettled.keys())
            .chain(extra.iter().map(|p| &p.party_id))
            .cloned()
            .collect()
    }

    /// Mark every position to `mark` and apply the result straight away.
    pub fn settle_order(
        &mut self,
        mark: Price,
        positions: &[MarketPosition],
    ) -> Result<Vec<Transfer>, SettlementError> {
        let pending = self.prepare_mark(mark, positions)?;
        Ok(self.commit(pending))
    }

    /// Close out against the product's final price and apply the result straight away.
    pub fn settle(&mut self, time: Timestamp) -> Result<Vec<Transfer>, SettlementError> {
        let pending = self.prepare_close_out(time)?;
        Ok(self.commit(pending))
    }

    /// Transfers marking every position to `mark`. Losses come first. Nothing
    /// changes until the result is committed.
    pub fn prepare_mark(
        &self,
        mark: Price,
        positions: &[MarketPosition],
    ) -> Result<PendingSettlement, SettlementError> {
        let reported: HashMap<&PartyId, i64> =
            positions.iter().map(|p| (&p.party_id, p.size)).collect();

        let mut shares: Vec<(PartyId, i64)> = Vec::new();
        let mut next_positions = HashMap::new();
        for party in self.parties(positions) {
            let held = self.positions.get(&party).copied();
            let lots = self.unsettled.get(&party).map(Vec::as_slice).unwrap_or(&[]);

            let mut share: i128 = 0;
            let mut size = 0i64;
            if let Some(held) = held {
                share += mtm(mark, held.price, held.size);
                size = held.size;
            }
            for lot in lots {
                share += mtm(mark, lot.price, lot.size);
                size = add(size, lot.size)?;
            }

            if let Some(&tracked) = reported.get(&party) {
                if tracked != size {
                    warn!(market = %self.market_id, party = %party, tracked, settled = size, "position size mismatch");
                }
            }
            if size != 0 {
                next_positions.insert(party.clone(), SettledPosition { size, price: mark });
            }
            let share = i64::try_from(share).map_err(|_| SettlementError::AmountOverflow)?;
            if share != 0 {
                shares.push((party, share));
            }
        }

        let net: i128 = shares.iter().map(|(_, s)| *s as i128).sum();
        if net != 0 {
            warn!(market = %self.market_id, mark = %mark, net, "mark to market does not net to zero");
        }

        Ok(PendingSettlement {
            transfers: self.into_transfers(shares, TransferType::MtmLoss, TransferType::MtmWin),
            positions: next_positions,
            mark: Some(mark),
        })
    }

    /// Transfers closing out everything against the product's final price.
    /// Committing the result empties the engine.
    pub fn prepare_close_out(&self, time: Timestamp) -> Result<PendingSettlement, SettlementError> {
        let mut shares: Vec<(PartyId, i64)> = Vec::new();
        for party in self.parties(&[]) {
            let mut amount: i64 = 0;
            if let Some(held) = self.positions.get(&party) {
                amount = add(amount, self.product.settle(held.price, held.size)?.amount)?;
            }
            for lot in self.unsettled.get(&party).map(Vec::as_slice).unwrap_or(&[]) {
                amount = add(amount, self.product.settle(lot.price, lot.size)?.amount)?;
            }
            if amount != 0 {
                shares.push((party, amount));
            }
        }

        debug!(market = %self.market_id, time = %time, parties = shares.len(), "close-out prepared");
        Ok(PendingSettlement {
            transfers: self.into_transfers(shares, TransferType::Loss, TransferType::Win),
            positions: HashMap::new(),
            mark: None,
        })
    }

    /// Adopt a prepared result. Every lot traded so far is folded in.
    pub fn commit(&mut self, pending: PendingSettlement) -> Vec<Transfer> {
        self.positions = pending.positions;
        self.unsettled.clear();
        match pending.mark {
            Some(mark) => {
                self.last_mark = Some(mark);
                debug!(market = %self.market_id, mark = %mark, transfers = pending.transfers.len(), "mark to market");
            }
            None => info!(market = %self.market_id, transfers = pending.transfers.len(), "market settled"),
        }
        pending.transfers
    }

    fn into_transfers(
        &self,
        shares: Vec<(PartyId, i64)>,
        loss: TransferType,
        win: TransferType,
    ) -> Vec<Transfer> {
        let asset = self.product.asset();
        let (losses, wins): (Vec<_>, Vec<_>) = shares.into_iter().partition(|(_, s)| *s < 0);
        losses
            .into_iter()
            .map(|(party, s)| Transfer::new(party, loss, FinancialAmount::new(asset.clone(), s)))
            .chain(
                wins.into_iter()
                    .map(|(party, s)| Transfer::new(party, win, FinancialAmount::new(asset.clone(), s))),
            )
            .collect()
    }
}

fn mtm(mark: Price, from: Price, size: i64) -> i128 {
    (mark.value() as i128 - from.value() as i128) * size as i128
}

fn add(a: i64, b: i64) -> Result<i64, SettlementError> {
    a.checked_add(b).ok_or(SettlementError::AmountOverflow)
}
