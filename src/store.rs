//! Order and trade storage seams.
//!
//! The engine writes every order state change and every trade through these
//! traits. Persistence is someone else's job; [`MemoryStore`] keeps it all in
//! maps for tests and the simulator.

use crate::order::{Order, Trade};
use crate::types::{MarketId, OrderId, PartyId};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait OrderStore: Send {
    fn put_order(&mut self, order: &Order) -> StoreResult<()>;
    fn get_order(&self, id: &OrderId) -> StoreResult<Option<Order>>;
    fn orders_by_party(&self, market: &MarketId, party: &PartyId) -> StoreResult<Vec<Order>>;
}

pub trait TradeStore: Send {
    fn put_trade(&mut self, trade: &Trade) -> StoreResult<()>;
    fn trades_by_market(&self, market: &MarketId) -> StoreResult<Vec<Trade>>;
}

pub trait Store: OrderStore + TradeStore + std::fmt::Debug {}

impl<T: OrderStore + TradeStore + std::fmt::Debug> Store for T {}

#[derive(Debug, Default)]
pub struct MemoryStore {
    orders: HashMap<OrderId, Order>,
    trades: Vec<Trade>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }
}

impl OrderStore for MemoryStore {
    fn put_order(&mut self, order: &Order) -> StoreResult<()> {
        self.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    fn get_order(&self, id: &OrderId) -> StoreResult<Option<Order>> {
        Ok(self.orders.get(id).cloned())
    }

    fn orders_by_party(&self, market: &MarketId, party: &PartyId) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .values()
            .filter(|o| &o.market_id == market && &o.party_id == party)
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(orders)
    }
}

impl TradeStore for MemoryStore {
    fn put_trade(&mut self, trade: &Trade) -> StoreResult<()> {
        self.trades.push(trade.clone());
        Ok(())
    }

    fn trades_by_market(&self, market: &MarketId) -> StoreResult<Vec<Trade>> {
        Ok(self
            .trades
            .iter()
            .filter(|t| &t.market_id == market)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::TimeInForce;
    use crate::types::{Price, Side, Timestamp};

    #[test]
    fn latest_order_state_wins() {
        let mut store = MemoryStore::new();
        let mut order = Order::new_limit(
            OrderId::from("V0000000001-0000000001"),
            MarketId::from("m"),
            PartyId::from("p"),
            Side::Buy,
            Price::new_unchecked(100),
            5,
            TimeInForce::GTC,
            Timestamp::from_secs(1),
        );
        store.put_order(&order).unwrap();
        order.fill(2);
        store.put_order(&order).unwrap();

        let stored = store.get_order(&order.id).unwrap().unwrap();
        assert_eq!(stored.remaining, 3);
        assert_eq!(
            store
                .orders_by_party(&MarketId::from("m"), &PartyId::from("p"))
                .unwrap()
                .len(),
            1
        );
        assert!(store
            .orders_by_party(&MarketId::from("other"), &PartyId::from("p"))
            .unwrap()
            .is_empty());
    }
}
