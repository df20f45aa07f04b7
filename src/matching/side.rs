// 3.2 matching/side.rs: all price levels of one side. bids best = highest, asks best = lowest.
// a level exists only while it holds at least one order.

use super::level::{LevelFill, PriceLevel};
use super::{LevelSummary, MatchingAlgorithm};
use crate::order::{Order, OrderError};
use crate::types::{OrderId, PartyId, Price, Side};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct OrderBookSide {
    side: Side,
    levels: BTreeMap<Price, PriceLevel>,
}

impl OrderBookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn best_price(&self) -> Option<Price> {
        match self.side {
            Side::Buy => self.levels.keys().next_back().copied(),
            Side::Sell => self.levels.keys().next().copied(),
        }
    }

    pub fn levels_best_first(&self) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match self.side {
            Side::Buy => Box::new(self.levels.values().rev()),
            Side::Sell => Box::new(self.levels.values()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn order_count(&self) -> usize {
        self.levels.values().map(PriceLevel::len).sum()
    }

    pub fn volume(&self) -> u64 {
        self.levels.values().map(PriceLevel::volume).sum()
    }

    pub fn get(&self, price: Price, id: &OrderId) -> Option<&Order> {
        self.levels.get(&price).and_then(|l| l.get(id))
    }

    /// Rest a priced order at the back of its level. Unpriced orders never rest.
    pub fn add_order(&mut self, order: Order) {
        let Some(price) = order.price else {
            return;
        };
        self.levels
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price))
            .add_order(order);
    }

    pub fn remove_order(&mut self, price: Price, id: &OrderId) -> Result<Order, OrderError> {
        let level = self
            .levels
            .get_mut(&price)
            .ok_or(OrderError::OrderRemovalFailure)?;
        let order = level
            .remove_order(id)
            .ok_or(OrderError::OrderRemovalFailure)?;
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Ok(order)
    }

    pub fn amend_in_place<F>(&mut self, price: Price, id: &OrderId, update: F) -> Result<Order, OrderError>
    where
        F: FnOnce(&mut Order),
    {
        self.levels
            .get_mut(&price)
            .and_then(|l| l.amend_in_place(id, update))
            .ok_or(OrderError::OrderAmendFailure)
    }

    /// Volume the aggressor could take right now, stopping once it has enough.
    pub fn fillable_volume(&self, aggressor: &Order) -> u64 {
        let mut available = 0u64;
        for level in self.levels_best_first() {
            if !aggressor.crosses(level.price()) || available >= aggressor.remaining {
                break;
            }
            available = available.saturating_add(level.volume());
        }
        available
    }

    /// Walk the levels best price first filling the aggressor until it is done or stops crossing.
    pub fn uncross(&mut self, aggressor: &mut Order, algorithm: MatchingAlgorithm) -> Vec<LevelFill> {
        let mut fills = Vec::new();
        while aggressor.remaining > 0 {
            let Some(best) = self.best_price() else {
                break;
            };
            if !aggressor.crosses(best) {
                break;
            }
            let Some(level) = self.levels.get_mut(&best) else {
                break;
            };
            fills.extend(level.fill(aggressor, algorithm));
            if level.is_empty() {
                self.levels.remove(&best);
            }
        }
        fills
    }

    /// Pull every resting order owned by `party`.
    pub fn remove_party_orders(&mut self, party: &PartyId) -> Vec<Order> {
        let mut removed = Vec::new();
        for level in self.levels.values_mut() {
            let ids: Vec<OrderId> = level
                .orders()
                .filter(|o| &o.party_id == party)
                .map(|o| o.id.clone())
                .collect();
            for id in ids {
                if let Some(order) = level.remove_order(&id) {
                    removed.push(order);
                }
            }
        }
        self.levels.retain(|_, l| !l.is_empty());
        removed
    }

    /// Empty the side. Orders come back best level first.
    pub fn drain(&mut self) -> Vec<Order> {
        let orders: Vec<Order> = self
            .levels_best_first()
            .flat_map(|level| level.orders().cloned())
            .collect();
        self.levels.clear();
        orders
    }

    pub fn depth(&self, max_levels: usize) -> Vec<LevelSummary> {
        self.levels_best_first()
            .take(max_levels)
            .map(|l| LevelSummary {
                price: l.price(),
                volume: l.volume(),
                order_count: l.len(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::TimeInForce;
    use crate::types::{MarketId, Timestamp};

    fn order(id: &str, side: Side, price: u64, size: u64) -> Order {
        Order::new_limit(
            OrderId::from(id),
            MarketId::from("m"),
            PartyId::from(id),
            side,
            Price::new_unchecked(price),
            size,
            TimeInForce::GTC,
            Timestamp::from_nanos(1),
        )
    }

    #[test]
    fn bids_best_is_highest_asks_best_is_lowest() {
        let mut bids = OrderBookSide::new(Side::Buy);
        bids.add_order(order("a", Side::Buy, 99, 1));
        bids.add_order(order("b", Side::Buy, 101, 1));
        bids.add_order(order("c", Side::Buy, 100, 1));
        let prices: Vec<u64> = bids.levels_best_first().map(|l| l.price().value()).collect();
        assert_eq!(prices, vec![101, 100, 99]);

        let mut asks = OrderBookSide::new(Side::Sell);
        asks.add_order(order("d", Side::Sell, 105, 1));
        asks.add_order(order("e", Side::Sell, 103, 1));
        assert_eq!(asks.best_price().map(|p| p.value()), Some(103));
    }

    #[test]
    fn same_price_shares_one_level() {
        let mut asks = OrderBookSide::new(Side::Sell);
        asks.add_order(order("a", Side::Sell, 100, 2));
        asks.add_order(order("b", Side::Sell, 100, 3));
        assert_eq!(asks.level_count(), 1);
        assert_eq!(asks.volume(), 5);
    }

    #[test]
    fn empty_level_removed_on_cancel() {
        let mut asks = OrderBookSide::new(Side::Sell);
        asks.add_order(order("a", Side::Sell, 100, 2));
        asks.remove_order(Price::new_unchecked(100), &OrderId::from("a"))
            .unwrap();
        assert!(asks.is_empty());
        assert_eq!(
            asks.remove_order(Price::new_unchecked(100), &OrderId::from("a")),
            Err(OrderError::OrderRemovalFailure)
        );
    }

    #[test]
    fn uncross_stops_at_limit() {
        let mut asks = OrderBookSide::new(Side::Sell);
        asks.add_order(order("a", Side::Sell, 100, 2));
        asks.add_order(order("b", Side::Sell, 101, 2));
        asks.add_order(order("c", Side::Sell, 102, 2));

        let mut buy = order("x", Side::Buy, 101, 10);
        assert_eq!(asks.fillable_volume(&buy), 4);

        let fills = asks.uncross(&mut buy, MatchingAlgorithm::Fifo);
        assert_eq!(fills.len(), 2);
        assert_eq!(buy.remaining, 6);
        assert_eq!(asks.best_price().map(|p| p.value()), Some(102));
    }

    #[test]
    fn remove_party_orders_drops_empty_levels() {
        let mut bids = OrderBookSide::new(Side::Buy);
        bids.add_order(order("a", Side::Buy, 100, 2));
        let mut other = order("b", Side::Buy, 99, 2);
        other.party_id = PartyId::from("a");
        bids.add_order(other);
        bids.add_order(order("c", Side::Buy, 99, 2));

        let removed = bids.remove_party_orders(&PartyId::from("a"));
        assert_eq!(removed.len(), 2);
        assert_eq!(bids.level_count(), 1);
        assert_eq!(bids.order_count(), 1);
    }
}
