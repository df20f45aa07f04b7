// 4.0 position.rs: net size per party for one market. + long, - short.
// 4.1 the reference price is the last trade price. settlement keeps its own price bookkeeping.

use crate::order::Trade;
use crate::types::{MarketId, PartyId, Price};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketPosition {
    pub party_id: PartyId,
    pub size: i64,
    pub price: Price,
}

impl MarketPosition {
    pub fn is_flat(&self) -> bool {
        self.size == 0
    }
}

#[derive(Debug, Clone)]
pub struct PositionTracker {
    market_id: MarketId,
    positions: HashMap<PartyId, MarketPosition>,
}

impl PositionTracker {
    pub fn new(market_id: MarketId) -> Self {
        Self {
            market_id,
            positions: HashMap::new(),
        }
    }

    pub fn market_id(&self) -> &MarketId {
        &self.market_id
    }

    /// Apply one trade. Returns the buyer's then the seller's position after the trade.
    pub fn update(&mut self, trade: &Trade) -> [MarketPosition; 2] {
        let buyer = self.apply(&trade.buyer, trade.price, |size| {
            size.saturating_add_unsigned(trade.size)
        });
        let seller = self.apply(&trade.seller, trade.price, |size| {
            size.saturating_sub_unsigned(trade.size)
        });
        if trade.buyer == trade.seller {
            return [seller.clone(), seller];
        }
        [buyer, seller]
    }

    fn apply<F>(&mut self, party: &PartyId, price: Price, change: F) -> MarketPosition
    where
        F: FnOnce(i64) -> i64,
    {
        let position = self
            .positions
            .entry(party.clone())
            .or_insert_with(|| MarketPosition {
                party_id: party.clone(),
                size: 0,
                price,
            });
        position.size = change(position.size);
        position.price = price;
        position.clone()
    }

    pub fn get(&self, party: &PartyId) -> Option<&MarketPosition> {
        self.positions.get(party)
    }

    /// Every known position, flat ones included, sorted by party id.
    pub fn positions(&self) -> Vec<MarketPosition> {
        let mut all: Vec<MarketPosition> = self.positions.values().cloned().collect();
        all.sort_by(|a, b| a.party_id.cmp(&b.party_id));
        all
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Sum of all net sizes. Zero whenever every trade went through `update`.
    pub fn net_open_interest(&self) -> i64 {
        self.positions.values().map(|p| p.size).sum()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }
}
