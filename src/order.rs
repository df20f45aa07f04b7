//! Order, trade and order-error types.
//!
//! Orders are limit or market orders with one of five time-in-force
//! policies. Trades are immutable facts produced by the matching engine.

use crate::types::{MarketId, OrderId, PartyId, Price, Side, Timestamp};
use serde::{Deserialize, Serialize};

/// Order time in force options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good till cancelled. Rests until filled or cancelled.
    #[default]
    GTC,
    /// Good till time. Rests until `expires_at`.
    GTT,
    /// Fill or kill. Fill entirely or not at all.
    FOK,
    /// Immediate or cancel. Fill what is possible, drop the rest.
    IOC,
    /// Execute and eliminate. Same leftover handling as IOC.
    ENE,
}

impl TimeInForce {
    /// Whether unfilled volume may rest on the book.
    pub fn is_persistent(&self) -> bool {
        matches!(self, TimeInForce::GTC | TimeInForce::GTT)
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Limit order with a price.
    #[default]
    Limit,
    /// Market order. Crosses any price and never rests.
    Market,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Active,
    Filled,
    Cancelled,
    Expired,
    /// Non-persistent order whose leftover was discarded.
    Stopped,
}

/// A trading order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub market_id: MarketId,
    pub party_id: PartyId,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Price>,
    pub size: u64,
    pub remaining: u64,
    pub time_in_force: TimeInForce,
    pub created_at: Timestamp,
    /// Zero means no expiry.
    pub expires_at: Timestamp,
    pub status: OrderStatus,
    pub reference: String,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new_limit(
        id: OrderId,
        market_id: MarketId,
        party_id: PartyId,
        side: Side,
        price: Price,
        size: u64,
        time_in_force: TimeInForce,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            market_id,
            party_id,
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            size,
            remaining: size,
            time_in_force,
            created_at,
            expires_at: Timestamp::default(),
            status: OrderStatus::Active,
            reference: String::new(),
        }
    }

    pub fn new_market(
        id: OrderId,
        market_id: MarketId,
        party_id: PartyId,
        side: Side,
        size: u64,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            market_id,
            party_id,
            side,
            order_type: OrderType::Market,
            price: None,
            size,
            remaining: size,
            time_in_force: TimeInForce::IOC,
            created_at,
            expires_at: Timestamp::default(),
            status: OrderStatus::Active,
            reference: String::new(),
        }
    }

    /// Turn the order into a GTT expiring at `expires_at`.
    pub fn with_expiry(mut self, expires_at: Timestamp) -> Self {
        self.time_in_force = TimeInForce::GTT;
        self.expires_at = expires_at;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn is_filled(&self) -> bool {
        self.remaining == 0
    }

    pub fn filled(&self) -> u64 {
        self.size - self.remaining
    }

    /// Whether a resting order at `resting` is reachable by this order's limit.
    pub fn crosses(&self, resting: Price) -> bool {
        match (self.order_type, self.price) {
            (OrderType::Market, _) | (_, None) => true,
            (OrderType::Limit, Some(limit)) => match self.side {
                Side::Buy => limit >= resting,
                Side::Sell => limit <= resting,
            },
        }
    }

    pub fn fill(&mut self, size: u64) {
        debug_assert!(size <= self.remaining, "cannot fill more than remaining");
        self.remaining -= size;
        if self.remaining == 0 {
            self.status = OrderStatus::Filled;
        }
    }
}

/// An execution between an aggressor and a resting order. Always at the resting price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub market_id: MarketId,
    pub price: Price,
    pub size: u64,
    pub buyer: PartyId,
    pub seller: PartyId,
    pub buy_order: OrderId,
    pub sell_order: OrderId,
    pub aggressor: Side,
    pub timestamp: Timestamp,
}

/// Result of a successful submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConfirmation {
    pub order: Order,
    pub trades: Vec<Trade>,
    /// Resting orders touched by this submit, in fill order, after the fill.
    pub passive_orders_affected: Vec<Order>,
}

impl OrderConfirmation {
    pub fn traded_volume(&self) -> u64 {
        self.trades.iter().map(|t| t.size).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationConfirmation {
    pub order: Order,
}

/// Requested change to a resting order. `None` leaves the field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAmendment {
    pub order_id: OrderId,
    pub party_id: PartyId,
    pub market_id: MarketId,
    pub price: Option<Price>,
    pub size: Option<u64>,
    pub expires_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("order market id does not match the book")]
    InvalidMarketId,
    #[error("order created before the last seen sequence time")]
    OrderOutOfSequence,
    #[error("remaining size must equal size on a new order")]
    InvalidRemainingSize,
    #[error("GTT order needs an expiry after its creation time")]
    InvalidExpiration,
    #[error("order could not be removed from the book")]
    OrderRemovalFailure,
    #[error("order id is invalid")]
    InvalidOrderId,
    #[error("order not found")]
    OrderNotFound,
    #[error("order amendment failed")]
    OrderAmendFailure,
    #[error("amendment changes nothing on the order")]
    EditNotAllowed,
}

impl OrderError {
    /// Name exposed to collaborators. Absence of an error maps to `NONE`.
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::InvalidMarketId => "INVALID_MARKET_ID",
            OrderError::OrderOutOfSequence => "ORDER_OUT_OF_SEQUENCE",
            OrderError::InvalidRemainingSize => "INVALID_REMAINING_SIZE",
            OrderError::InvalidExpiration => "INVALID_EXPIRATION",
            OrderError::OrderRemovalFailure => "ORDER_REMOVAL_FAILURE",
            OrderError::InvalidOrderId => "INVALID_ORDER_ID",
            OrderError::OrderNotFound => "ORDER_NOT_FOUND",
            OrderError::OrderAmendFailure => "ORDER_AMEND_FAILURE",
            OrderError::EditNotAllowed => "EDIT_NOT_ALLOWED",
        }
    }

    pub fn code_of<T>(result: &Result<T, OrderError>) -> &'static str {
        match result {
            Ok(_) => "NONE",
            Err(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(price: u64, size: u64) -> Order {
        Order::new_limit(
            OrderId::from("o1"),
            MarketId::from("m"),
            PartyId::from("p"),
            Side::Buy,
            Price::new_unchecked(price),
            size,
            TimeInForce::GTC,
            Timestamp::from_nanos(1),
        )
    }

    #[test]
    fn fill_marks_order_filled() {
        let mut order = bid(100, 10);
        order.fill(4);
        assert_eq!(order.remaining, 6);
        assert_eq!(order.filled(), 4);
        assert_eq!(order.status, OrderStatus::Active);
        order.fill(6);
        assert!(order.is_filled());
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn limit_crossing_respects_side() {
        let buy = bid(100, 1);
        assert!(buy.crosses(Price::new_unchecked(99)));
        assert!(buy.crosses(Price::new_unchecked(100)));
        assert!(!buy.crosses(Price::new_unchecked(101)));

        let mut sell = bid(100, 1);
        sell.side = Side::Sell;
        assert!(sell.crosses(Price::new_unchecked(101)));
        assert!(!sell.crosses(Price::new_unchecked(99)));
    }

    #[test]
    fn error_codes_match_enumeration() {
        let ok: Result<(), OrderError> = Ok(());
        assert_eq!(OrderError::code_of(&ok), "NONE");
        assert_eq!(OrderError::EditNotAllowed.code(), "EDIT_NOT_ALLOWED");
        assert_eq!(
            OrderError::code_of::<()>(&Err(OrderError::OrderOutOfSequence)),
            "ORDER_OUT_OF_SEQUENCE"
        );
    }
}
