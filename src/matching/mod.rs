// 3.0 matching/: price-level order book and uncrossing.
//   level.rs: one price, FIFO queue, fifo/pro-rata fills
//   side.rs: ordered levels for bids or asks
//   book.rs: validation, submit/cancel/amend, expiry, close-out pricing

pub mod book;
pub mod level;
pub mod side;

pub use book::OrderBook;
pub use level::{LevelFill, PriceLevel};
pub use side::OrderBookSide;

use crate::order::{
    CancellationConfirmation, Order, OrderAmendment, OrderConfirmation, OrderError,
};
use crate::types::{MarketId, PartyId, Price, Side, Timestamp};
use serde::{Deserialize, Serialize};

/// How a level splits an aggressor that does not take all of it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingAlgorithm {
    #[default]
    Fifo,
    ProRata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub algorithm: MatchingAlgorithm,
    /// Dump every level at debug after each submit.
    pub log_price_levels: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelSummary {
    pub price: Price,
    pub volume: u64,
    pub order_count: usize,
}

/// Average exit price for a volume against one side of the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseoutEstimate {
    pub price: Price,
    /// Volume the book could actually absorb. Less than requested when `complete` is false.
    pub volume: u64,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmendOutcome {
    /// Size decrease or expiry change. Queue position kept.
    InPlace(Order),
    /// Price change or size increase. Old order cancelled, new one submitted.
    Replaced {
        cancelled: Order,
        confirmation: OrderConfirmation,
    },
}

/// The matching seam a market drives. `OrderBook` is the only variant today.
pub trait MatchingEngine: std::fmt::Debug {
    fn market_id(&self) -> &MarketId;
    fn submit(&mut self, order: Order) -> Result<OrderConfirmation, OrderError>;
    fn cancel(&mut self, order: &Order) -> Result<CancellationConfirmation, OrderError>;
    fn amend(&mut self, amendment: &OrderAmendment) -> Result<AmendOutcome, OrderError>;
    fn remove_expired(&mut self, now: Timestamp) -> Vec<Order>;
    fn remove_distressed_orders(&mut self, party: &PartyId) -> Vec<Order>;
    /// Cancel everything resting, e.g. when the market closes.
    fn remove_all_orders(&mut self) -> Vec<Order>;
    /// `side` is the resting side the volume would trade against.
    fn closeout_price(&self, volume: u64, side: Side) -> Option<CloseoutEstimate>;
    fn order(&self, id: &crate::types::OrderId) -> Option<&Order>;
    fn last_traded_price(&self) -> Option<Price>;
    fn best_bid(&self) -> Option<Price>;
    fn best_ask(&self) -> Option<Price>;
    fn depth(&self, side: Side, max_levels: usize) -> Vec<LevelSummary>;
    fn reconfigure(&mut self, config: MatchingConfig) -> MatchingConfig;
}
