//! Order book for a single market.
//!
//! Validates incoming orders, uncrosses them against the opposite side and
//! rests persistent leftovers. Every trade prints at the resting order's
//! price. GTT orders are tracked in an unordered expiry list that is scanned
//! linearly on every time update.

use super::level::LevelFill;
use super::side::OrderBookSide;
use super::{
    AmendOutcome, CloseoutEstimate, LevelSummary, MatchingConfig, MatchingEngine,
};
use crate::order::{
    CancellationConfirmation, Order, OrderAmendment, OrderConfirmation, OrderError, OrderStatus,
    OrderType, TimeInForce, Trade,
};
use crate::types::{MarketId, OrderId, PartyId, Price, Side, Timestamp};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct ExpiringOrder {
    id: OrderId,
    side: Side,
    price: Price,
    expires_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct OrderBook {
    market_id: MarketId,
    config: MatchingConfig,
    bids: OrderBookSide,
    asks: OrderBookSide,
    /// Resting orders only.
    index: HashMap<OrderId, (Side, Price)>,
    expiring: Vec<ExpiringOrder>,
    latest_timestamp: Timestamp,
    last_traded_price: Option<Price>,
    trade_seq: u64,
}

impl OrderBook {
    pub fn new(market_id: MarketId, config: MatchingConfig) -> Self {
        Self {
            market_id,
            config,
            bids: OrderBookSide::new(Side::Buy),
            asks: OrderBookSide::new(Side::Sell),
            index: HashMap::new(),
            expiring: Vec::new(),
            latest_timestamp: Timestamp::default(),
            last_traded_price: None,
            trade_seq: 0,
        }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn bids(&self) -> &OrderBookSide {
        &self.bids
    }

    pub fn asks(&self) -> &OrderBookSide {
        &self.asks
    }

    pub fn mid_price(&self) -> Option<Price> {
        match (self.bids.best_price(), self.asks.best_price()) {
            (Some(bid), Some(ask)) => Price::new((bid.value() + ask.value()) / 2),
            _ => None,
        }
    }

    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn latest_timestamp(&self) -> Timestamp {
        self.latest_timestamp
    }

    fn side(&self, side: Side) -> &OrderBookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut OrderBookSide {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    // first failure wins, order matters
    fn validate(&self, order: &Order) -> Result<(), OrderError> {
        if order.market_id != self.market_id {
            return Err(OrderError::InvalidMarketId);
        }
        if !order.created_at.is_zero() && order.created_at < self.latest_timestamp {
            return Err(OrderError::OrderOutOfSequence);
        }
        // sizes become signed position deltas downstream
        if order.size == 0 || order.size > i64::MAX as u64 || order.remaining != order.size {
            return Err(OrderError::InvalidRemainingSize);
        }
        if order.time_in_force == TimeInForce::GTT
            && (order.expires_at.is_zero() || order.expires_at <= order.created_at)
        {
            return Err(OrderError::InvalidExpiration);
        }
        Ok(())
    }

    fn place(&mut self, mut order: Order) -> OrderConfirmation {
        if order.created_at > self.latest_timestamp {
            self.latest_timestamp = order.created_at;
        }

        let opposite = order.side.opposite();
        if order.time_in_force == TimeInForce::FOK
            && self.side(opposite).fillable_volume(&order) < order.remaining
        {
            debug!(order_id = %order.id, size = order.remaining, "fok order cannot fill, stopped");
            order.status = OrderStatus::Stopped;
            return OrderConfirmation {
                order,
                trades: Vec::new(),
                passive_orders_affected: Vec::new(),
            };
        }

        let algorithm = self.config.algorithm;
        let fills = self.side_mut(opposite).uncross(&mut order, algorithm);

        let mut trades = Vec::with_capacity(fills.len());
        for fill in &fills {
            trades.push(self.trade(&order, fill));
            if fill.resting.is_filled() {
                self.forget(&fill.resting.id);
            }
        }
        if let Some(last) = trades.last() {
            self.last_traded_price = Some(last.price);
        }

        if order.remaining > 0 {
            let can_rest = order.time_in_force.is_persistent()
                && order.order_type == OrderType::Limit
                && order.price.is_some();
            if can_rest {
                self.rest(order.clone());
            } else {
                order.status = OrderStatus::Stopped;
            }
        }

        debug!(
            order_id = %order.id,
            trades = trades.len(),
            remaining = order.remaining,
            status = ?order.status,
            "order placed"
        );
        if self.config.log_price_levels {
            self.log_price_levels();
        }

        OrderConfirmation {
            order,
            trades,
            passive_orders_affected: fills.into_iter().map(|f| f.resting).collect(),
        }
    }

    fn trade(&mut self, aggressor: &Order, fill: &LevelFill) -> Trade {
        self.trade_seq += 1;
        let resting = &fill.resting;
        let (buyer, seller, buy_order, sell_order) = match aggressor.side {
            Side::Buy => (&aggressor.party_id, &resting.party_id, &aggressor.id, &resting.id),
            Side::Sell => (&resting.party_id, &aggressor.party_id, &resting.id, &aggressor.id),
        };
        Trade {
            id: format!("{}-{:010}", aggressor.id, self.trade_seq),
            market_id: self.market_id.clone(),
            price: fill.price,
            size: fill.size,
            buyer: buyer.clone(),
            seller: seller.clone(),
            buy_order: buy_order.clone(),
            sell_order: sell_order.clone(),
            aggressor: aggressor.side,
            timestamp: self.latest_timestamp,
        }
    }

    fn rest(&mut self, order: Order) {
        let Some(price) = order.price else {
            return;
        };
        self.index.insert(order.id.clone(), (order.side, price));
        if order.time_in_force == TimeInForce::GTT {
            self.expiring.push(ExpiringOrder {
                id: order.id.clone(),
                side: order.side,
                price,
                expires_at: order.expires_at,
            });
        }
        self.side_mut(order.side).add_order(order);
    }

    fn forget(&mut self, id: &OrderId) {
        self.index.remove(id);
        self.expiring.retain(|e| &e.id != id);
    }

    fn log_price_levels(&self) {
        for level in self.bids.levels_best_first() {
            debug!(market = %self.market_id, side = "bid", price = %level.price(), volume = level.volume(), orders = level.len());
        }
        for level in self.asks.levels_best_first() {
            debug!(market = %self.market_id, side = "ask", price = %level.price(), volume = level.volume(), orders = level.len());
        }
    }

    fn amend_in_place(
        &mut self,
        existing: &Order,
        price: Price,
        new_size: Option<u64>,
        new_expiry: Option<Timestamp>,
    ) -> Result<Order, OrderError> {
        let filled = existing.filled();
        let amended = self.side_mut(existing.side).amend_in_place(price, &existing.id, |o| {
            if let Some(size) = new_size {
                o.size = size;
                o.remaining = size - filled;
            }
            if let Some(expiry) = new_expiry {
                o.expires_at = expiry;
            }
        })?;
        if let Some(expiry) = new_expiry {
            if let Some(entry) = self.expiring.iter_mut().find(|e| e.id == existing.id) {
                entry.expires_at = expiry;
            }
        }
        Ok(amended)
    }
}

impl MatchingEngine for OrderBook {
    fn market_id(&self) -> &MarketId {
        &self.market_id
    }

    fn submit(&mut self, order: Order) -> Result<OrderConfirmation, OrderError> {
        self.validate(&order)?;
        Ok(self.place(order))
    }

    fn cancel(&mut self, order: &Order) -> Result<CancellationConfirmation, OrderError> {
        if order.id.is_empty() {
            return Err(OrderError::InvalidOrderId);
        }
        if order.market_id != self.market_id {
            return Err(OrderError::OrderRemovalFailure);
        }
        let price = order.price.ok_or(OrderError::OrderRemovalFailure)?;
        let mut removed = self.side_mut(order.side).remove_order(price, &order.id)?;
        self.forget(&removed.id);
        removed.status = OrderStatus::Cancelled;
        debug!(order_id = %removed.id, "order cancelled");
        Ok(CancellationConfirmation { order: removed })
    }

    fn amend(&mut self, amendment: &OrderAmendment) -> Result<AmendOutcome, OrderError> {
        if amendment.market_id != self.market_id {
            return Err(OrderError::InvalidMarketId);
        }
        if amendment.order_id.is_empty() {
            return Err(OrderError::InvalidOrderId);
        }
        let (side, price) = *self
            .index
            .get(&amendment.order_id)
            .ok_or(OrderError::OrderNotFound)?;
        let existing = self
            .side(side)
            .get(price, &amendment.order_id)
            .cloned()
            .ok_or(OrderError::OrderNotFound)?;

        if existing.party_id != amendment.party_id {
            return Err(OrderError::OrderAmendFailure);
        }

        let price_shift = amendment.price.is_some_and(|p| p != price);
        let (mut size_increase, mut size_decrease) = (false, false);
        if let Some(size) = amendment.size {
            if size <= existing.filled() || size > i64::MAX as u64 {
                return Err(OrderError::OrderAmendFailure);
            }
            size_increase = size > existing.size;
            size_decrease = size < existing.size;
        }
        let mut expiry_change = false;
        if let Some(expiry) = amendment.expires_at {
            if existing.time_in_force != TimeInForce::GTT {
                return Err(OrderError::OrderAmendFailure);
            }
            if expiry.is_zero() || expiry <= self.latest_timestamp {
                return Err(OrderError::InvalidExpiration);
            }
            expiry_change = expiry != existing.expires_at;
        }

        if price_shift || size_increase {
            let cancelled = self.cancel(&existing)?.order;
            let size = amendment.size.unwrap_or(existing.size);
            let mut replacement = existing.clone();
            replacement.price = amendment.price.or(existing.price);
            replacement.size = size;
            replacement.remaining = size - existing.filled();
            replacement.expires_at = amendment.expires_at.unwrap_or(existing.expires_at);
            replacement.created_at = self.latest_timestamp;
            replacement.status = OrderStatus::Active;
            debug!(order_id = %existing.id, "amend by cancel and replace");
            let confirmation = self.place(replacement);
            return Ok(AmendOutcome::Replaced {
                cancelled,
                confirmation,
            });
        }

        if size_decrease || expiry_change {
            let new_expiry = if expiry_change { amendment.expires_at } else { None };
            let amended = self.amend_in_place(&existing, price, amendment.size, new_expiry)?;
            debug!(order_id = %amended.id, remaining = amended.remaining, "amend in place");
            return Ok(AmendOutcome::InPlace(amended));
        }

        Err(OrderError::EditNotAllowed)
    }

    fn remove_expired(&mut self, now: Timestamp) -> Vec<Order> {
        let (due, keep): (Vec<_>, Vec<_>) = self
            .expiring
            .drain(..)
            .partition(|e| e.expires_at <= now);
        self.expiring = keep;

        let mut expired = Vec::with_capacity(due.len());
        for entry in due {
            match self.side_mut(entry.side).remove_order(entry.price, &entry.id) {
                Ok(mut order) => {
                    self.index.remove(&order.id);
                    order.status = OrderStatus::Expired;
                    expired.push(order);
                }
                Err(_) => warn!(order_id = %entry.id, "expiring order missing from its level"),
            }
        }
        expired.sort_by(|a, b| {
            a.price
                .cmp(&b.price)
                .then(a.expires_at.cmp(&b.expires_at))
        });
        expired
    }

    fn remove_distressed_orders(&mut self, party: &PartyId) -> Vec<Order> {
        let mut removed = self.bids.remove_party_orders(party);
        removed.extend(self.asks.remove_party_orders(party));
        for order in removed.iter_mut() {
            self.forget(&order.id);
            order.status = OrderStatus::Cancelled;
        }
        removed
    }

    fn remove_all_orders(&mut self) -> Vec<Order> {
        let mut removed = self.bids.drain();
        removed.extend(self.asks.drain());
        self.index.clear();
        self.expiring.clear();
        for order in removed.iter_mut() {
            order.status = OrderStatus::Cancelled;
        }
        removed
    }

    fn closeout_price(&self, volume: u64, side: Side) -> Option<CloseoutEstimate> {
        let mut left = volume;
        let mut taken = 0u64;
        let mut notional = 0u128;
        for level in self.side(side).levels_best_first() {
            if left == 0 {
                break;
            }
            let take = left.min(level.volume());
            notional += take as u128 * level.price().value() as u128;
            taken += take;
            left -= take;
        }

        if taken == 0 {
            return self.last_traded_price.map(|price| CloseoutEstimate {
                price,
                volume: 0,
                complete: false,
            });
        }
        let average = u64::try_from(notional / taken as u128).ok()?;
        Price::new(average).map(|price| CloseoutEstimate {
            price,
            volume: taken,
            complete: left == 0,
        })
    }

    fn order(&self, id: &OrderId) -> Option<&Order> {
        let (side, price) = self.index.get(id)?;
        self.side(*side).get(*price, id)
    }

    fn last_traded_price(&self) -> Option<Price> {
        self.last_traded_price
    }

    fn best_bid(&self) -> Option<Price> {
        self.bids.best_price()
    }

    fn best_ask(&self) -> Option<Price> {
        self.asks.best_price()
    }

    fn depth(&self, side: Side, max_levels: usize) -> Vec<LevelSummary> {
        self.side(side).depth(max_levels)
    }

    fn reconfigure(&mut self, config: MatchingConfig) -> MatchingConfig {
        std::mem::replace(&mut self.config, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::MatchingAlgorithm;

    fn book() -> OrderBook {
        OrderBook::new(MarketId::from("mkt"), MatchingConfig::default())
    }

    fn limit(id: &str, party: &str, side: Side, price: u64, size: u64, t: i64) -> Order {
        Order::new_limit(
            OrderId::from(id),
            MarketId::from("mkt"),
            PartyId::from(party),
            side,
            Price::new_unchecked(price),
            size,
            TimeInForce::GTC,
            Timestamp::from_nanos(t),
        )
    }

    #[test]
    fn fifo_scenario_two_sellers_one_buyer() {
        let mut book = book();
        book.submit(limit("s1", "A", Side::Sell, 101, 100, 1)).unwrap();
        book.submit(limit("s2", "B", Side::Sell, 101, 100, 2)).unwrap();

        let conf = book.submit(limit("b1", "X", Side::Buy, 101, 150, 3)).unwrap();

        assert_eq!(conf.trades.len(), 2);
        assert_eq!(conf.trades[0].price.value(), 101);
        assert_eq!(conf.trades[0].size, 100);
        assert_eq!(conf.trades[0].buyer, PartyId::from("X"));
        assert_eq!(conf.trades[0].seller, PartyId::from("A"));
        assert_eq!(conf.trades[1].size, 50);
        assert_eq!(conf.trades[1].seller, PartyId::from("B"));

        assert_eq!(conf.passive_orders_affected[0].status, OrderStatus::Filled);
        assert!(book.order(&OrderId::from("s1")).is_none());
        assert_eq!(book.order(&OrderId::from("s2")).unwrap().remaining, 50);
        assert_eq!(conf.order.status, OrderStatus::Filled);
    }

    #[test]
    fn trades_print_at_resting_price() {
        let mut book = book();
        book.submit(limit("s1", "A", Side::Sell, 99, 10, 1)).unwrap();
        let conf = book.submit(limit("b1", "X", Side::Buy, 105, 10, 2)).unwrap();
        assert_eq!(conf.trades[0].price.value(), 99);
        assert_eq!(book.last_traded_price().map(|p| p.value()), Some(99));
    }

    #[test]
    fn validation_order_first_failure_wins() {
        let mut book = book();
        book.submit(limit("s1", "A", Side::Sell, 101, 1, 10)).unwrap();

        let mut wrong_market = limit("x", "A", Side::Buy, 90, 1, 5);
        wrong_market.market_id = MarketId::from("other");
        wrong_market.remaining = 0;
        assert_eq!(book.submit(wrong_market), Err(OrderError::InvalidMarketId));

        let mut stale = limit("x", "A", Side::Buy, 90, 1, 5);
        stale.remaining = 0;
        assert_eq!(book.submit(stale), Err(OrderError::OrderOutOfSequence));

        let mut bad_remaining = limit("x", "A", Side::Buy, 90, 2, 11);
        bad_remaining.remaining = 1;
        assert_eq!(book.submit(bad_remaining), Err(OrderError::InvalidRemainingSize));

        let too_big = limit("x", "A", Side::Buy, 101, i64::MAX as u64 + 1, 11);
        assert_eq!(book.submit(too_big), Err(OrderError::InvalidRemainingSize));
        assert_eq!(book.best_ask().map(|p| p.value()), Some(101));

        let gtt = limit("x", "A", Side::Buy, 90, 1, 11).with_expiry(Timestamp::default());
        assert_eq!(book.submit(gtt), Err(OrderError::InvalidExpiration));

        // zero sequence skips the ordering check
        assert!(book.submit(limit("y", "A", Side::Buy, 90, 1, 0)).is_ok());
    }

    #[test]
    fn fok_without_enough_volume_has_no_effect() {
        let mut book = book();
        book.submit(limit("s1", "A", Side::Sell, 100, 5, 1)).unwrap();

        let mut fok = limit("b1", "X", Side::Buy, 100, 6, 2);
        fok.time_in_force = TimeInForce::FOK;
        let conf = book.submit(fok).unwrap();

        assert!(conf.trades.is_empty());
        assert_eq!(conf.order.status, OrderStatus::Stopped);
        assert_eq!(book.asks().volume(), 5);
    }

    #[test]
    fn ene_leftover_is_discarded() {
        let mut book = book();
        book.submit(limit("s1", "A", Side::Sell, 100, 5, 1)).unwrap();
        book.submit(limit("s2", "B", Side::Sell, 102, 5, 1)).unwrap();

        let mut ene = limit("b1", "X", Side::Buy, 100, 8, 2);
        ene.time_in_force = TimeInForce::ENE;
        let conf = book.submit(ene).unwrap();

        assert_eq!(conf.traded_volume(), 5);
        assert_eq!(conf.order.remaining, 3);
        assert_eq!(conf.order.status, OrderStatus::Stopped);
        // nothing of b1 rests, the offer above its limit is untouched
        assert!(book.best_bid().is_none());
        assert_eq!(book.best_ask().map(|p| p.value()), Some(102));
    }

    #[test]
    fn ioc_leftover_is_discarded() {
        let mut book = book();
        book.submit(limit("s1", "A", Side::Sell, 100, 5, 1)).unwrap();

        let mut ioc = limit("b1", "X", Side::Buy, 100, 8, 2);
        ioc.time_in_force = TimeInForce::IOC;
        let conf = book.submit(ioc).unwrap();

        assert_eq!(conf.traded_volume(), 5);
        assert_eq!(conf.order.remaining, 3);
        assert_eq!(conf.order.status, OrderStatus::Stopped);
        assert!(book.is_empty());
    }

    #[test]
    fn gtc_leftover_rests_at_own_price() {
        let mut book = book();
        book.submit(limit("s1", "A", Side::Sell, 100, 5, 1)).unwrap();
        book.submit(limit("b1", "X", Side::Buy, 102, 8, 2)).unwrap();

        assert_eq!(book.best_bid().map(|p| p.value()), Some(102));
        assert_eq!(book.order(&OrderId::from("b1")).unwrap().remaining, 3);
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn market_order_sweeps_levels_and_never_rests() {
        let mut book = book();
        book.submit(limit("s1", "A", Side::Sell, 100, 5, 1)).unwrap();
        book.submit(limit("s2", "B", Side::Sell, 110, 5, 2)).unwrap();

        let mkt = Order::new_market(
            OrderId::from("m1"),
            MarketId::from("mkt"),
            PartyId::from("X"),
            Side::Buy,
            12,
            Timestamp::from_nanos(3),
        );
        let conf = book.submit(mkt).unwrap();
        assert_eq!(conf.traded_volume(), 10);
        assert_eq!(conf.order.status, OrderStatus::Stopped);
        assert!(book.is_empty());
    }

    #[test]
    fn pro_rata_book_splits_level() {
        let mut book = OrderBook::new(
            MarketId::from("mkt"),
            MatchingConfig {
                algorithm: MatchingAlgorithm::ProRata,
                log_price_levels: false,
            },
        );
        book.submit(limit("s1", "A", Side::Sell, 100, 30, 1)).unwrap();
        book.submit(limit("s2", "B", Side::Sell, 100, 10, 2)).unwrap();

        let conf = book.submit(limit("b1", "X", Side::Buy, 100, 20, 3)).unwrap();
        assert_eq!(conf.trades[0].size, 15);
        assert_eq!(conf.trades[1].size, 5);
    }

    #[test]
    fn cancel_removes_order_and_empty_level() {
        let mut book = book();
        let conf = book.submit(limit("s1", "A", Side::Sell, 100, 5, 1)).unwrap();

        let cancelled = book.cancel(&conf.order).unwrap();
        assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
        assert_eq!(book.asks().level_count(), 0);
        assert_eq!(book.cancel(&conf.order), Err(OrderError::OrderRemovalFailure));

        let mut other = conf.order.clone();
        other.market_id = MarketId::from("other");
        assert_eq!(book.cancel(&other), Err(OrderError::OrderRemovalFailure));

        let mut blank = conf.order;
        blank.id = OrderId::new("");
        assert_eq!(book.cancel(&blank), Err(OrderError::InvalidOrderId));
    }

    fn amendment(id: &str, party: &str) -> OrderAmendment {
        OrderAmendment {
            order_id: OrderId::from(id),
            party_id: PartyId::from(party),
            market_id: MarketId::from("mkt"),
            price: None,
            size: None,
            expires_at: None,
        }
    }

    #[test]
    fn size_decrease_keeps_queue_priority() {
        let mut book = book();
        book.submit(limit("s1", "A", Side::Sell, 100, 10, 1)).unwrap();
        book.submit(limit("s2", "B", Side::Sell, 100, 10, 2)).unwrap();

        let mut amend = amendment("s1", "A");
        amend.size = Some(4);
        let outcome = book.amend(&amend).unwrap();
        assert!(matches!(outcome, AmendOutcome::InPlace(ref o) if o.remaining == 4));

        let conf = book.submit(limit("b1", "X", Side::Buy, 100, 4, 3)).unwrap();
        assert_eq!(conf.trades[0].seller, PartyId::from("A"));
    }

    #[test]
    fn price_change_loses_queue_priority() {
        let mut book = book();
        book.submit(limit("s1", "A", Side::Sell, 101, 10, 1)).unwrap();
        book.submit(limit("s2", "B", Side::Sell, 100, 10, 2)).unwrap();

        let mut amend = amendment("s1", "A");
        amend.price = Some(Price::new_unchecked(100));
        let outcome = book.amend(&amend).unwrap();
        assert!(matches!(outcome, AmendOutcome::Replaced { .. }));

        let conf = book.submit(limit("b1", "X", Side::Buy, 100, 10, 3)).unwrap();
        assert_eq!(conf.trades[0].seller, PartyId::from("B"));
    }

    #[test]
    fn amend_rejections() {
        let mut book = book();
        book.submit(limit("s1", "A", Side::Sell, 100, 10, 1)).unwrap();
        book.submit(limit("b1", "X", Side::Buy, 100, 4, 2)).unwrap();

        assert_eq!(book.amend(&amendment("nope", "A")), Err(OrderError::OrderNotFound));

        let mut wrong_owner = amendment("s1", "B");
        wrong_owner.size = Some(5);
        assert_eq!(book.amend(&wrong_owner), Err(OrderError::OrderAmendFailure));

        let mut below_filled = amendment("s1", "A");
        below_filled.size = Some(4);
        assert_eq!(book.amend(&below_filled), Err(OrderError::OrderAmendFailure));

        let mut oversized = amendment("s1", "A");
        oversized.size = Some(i64::MAX as u64 + 1);
        assert_eq!(book.amend(&oversized), Err(OrderError::OrderAmendFailure));

        let mut expiry_on_gtc = amendment("s1", "A");
        expiry_on_gtc.expires_at = Some(Timestamp::from_nanos(50));
        assert_eq!(book.amend(&expiry_on_gtc), Err(OrderError::OrderAmendFailure));

        assert_eq!(book.amend(&amendment("s1", "A")), Err(OrderError::EditNotAllowed));
    }

    #[test]
    fn remove_expired_returns_due_orders_sorted() {
        let mut book = book();
        let t = 100;
        let gtt = |id: &str, price: u64, expiry: i64| {
            limit(id, "A", Side::Buy, price, 1, 1).with_expiry(Timestamp::from_nanos(expiry))
        };
        book.submit(gtt("late", 95, t + 1)).unwrap();
        book.submit(gtt("now", 90, t)).unwrap();
        book.submit(gtt("early", 95, t - 1)).unwrap();
        book.submit(gtt("cheap", 80, t)).unwrap();

        let expired = book.remove_expired(Timestamp::from_nanos(t));
        let ids: Vec<&str> = expired.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["cheap", "now", "early"]);
        assert!(expired.iter().all(|o| o.status == OrderStatus::Expired));

        assert!(book.order(&OrderId::from("late")).is_some());
        assert_eq!(book.order_count(), 1);
        assert!(book.remove_expired(Timestamp::from_nanos(t)).is_empty());
    }

    #[test]
    fn closeout_price_walks_best_levels() {
        let mut book = book();
        book.submit(limit("b1", "A", Side::Buy, 100, 10, 1)).unwrap();
        book.submit(limit("b2", "B", Side::Buy, 90, 10, 2)).unwrap();

        let full = book.closeout_price(20, Side::Buy).unwrap();
        assert_eq!(full.price.value(), 95);
        assert!(full.complete);

        let partial = book.closeout_price(30, Side::Buy).unwrap();
        assert_eq!(partial.volume, 20);
        assert!(!partial.complete);

        // nothing on the ask side and no trade yet
        assert!(book.closeout_price(5, Side::Sell).is_none());
    }

    #[test]
    fn closeout_price_falls_back_to_last_trade() {
        let mut book = book();
        book.submit(limit("s1", "A", Side::Sell, 100, 5, 1)).unwrap();
        book.submit(limit("b1", "X", Side::Buy, 100, 5, 2)).unwrap();

        let estimate = book.closeout_price(5, Side::Sell).unwrap();
        assert_eq!(estimate.price.value(), 100);
        assert_eq!(estimate.volume, 0);
    }

    #[test]
    fn distressed_party_orders_are_pulled() {
        let mut book = book();
        book.submit(limit("b1", "A", Side::Buy, 100, 10, 1)).unwrap();
        book.submit(limit("s1", "A", Side::Sell, 110, 10, 2)).unwrap();
        book.submit(limit("s2", "B", Side::Sell, 111, 10, 3)).unwrap();

        let removed = book.remove_distressed_orders(&PartyId::from("A"));
        assert_eq!(removed.len(), 2);
        assert_eq!(book.order_count(), 1);
        assert!(book.best_bid().is_none());
    }

    #[test]
    fn remove_all_orders_empties_both_sides() {
        let mut book = book();
        book.submit(limit("b1", "A", Side::Buy, 99, 10, 1)).unwrap();
        book.submit(limit("b2", "B", Side::Buy, 100, 10, 2)).unwrap();
        book.submit(limit("s1", "C", Side::Sell, 105, 10, 3).with_expiry(Timestamp::from_nanos(50))).unwrap();

        let removed = book.remove_all_orders();
        assert_eq!(removed.len(), 3);
        assert_eq!(removed[0].id, OrderId::from("b2"));
        assert!(removed.iter().all(|o| o.status == OrderStatus::Cancelled));
        assert_eq!(book.order_count(), 0);
        assert!(book.remove_expired(Timestamp::from_nanos(100)).is_empty());
    }
}
