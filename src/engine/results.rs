// 8.0.2: result types and errors for engine operations.

use crate::collateral::CollateralError;
use crate::config::ConfigError;
use crate::order::{Order, OrderConfirmation, OrderError, Trade};
use crate::risk::{MarginChange, RiskError};
use crate::settlement::SettlementError;
use crate::transfer::TransferResponse;
use crate::types::{MarketId, Timestamp};

/// Money moved by one pass of the settlement/risk pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    /// MTM or close-out collection, losses first.
    pub settlement: Vec<TransferResponse>,
    /// MARGIN_LOW / MARGIN_HIGH movements.
    pub margin: Vec<TransferResponse>,
    /// Parties that could not meet their minimum top-up.
    pub distressed: Vec<MarginChange>,
    /// Resting orders pulled from distressed parties.
    pub removed_orders: Vec<Order>,
}

impl PipelineResult {
    pub fn is_empty(&self) -> bool {
        self.settlement.is_empty()
            && self.margin.is_empty()
            && self.distressed.is_empty()
            && self.removed_orders.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct OrderResult {
    pub confirmation: OrderConfirmation,
    pub pipeline: PipelineResult,
}

#[derive(Debug, Clone)]
pub struct AmendResult {
    /// The order as it rests (or finished) after the amendment.
    pub order: Order,
    /// Set when the amendment replaced the order.
    pub cancelled: Option<Order>,
    /// Trades the replacement made on its way back into the book.
    pub trades: Vec<Trade>,
    pub pipeline: PipelineResult,
}

#[derive(Debug, Clone, Default)]
pub struct TickResult {
    pub time: Timestamp,
    pub expired: Vec<Order>,
    pub pipelines: Vec<(MarketId, PipelineResult)>,
}

#[derive(Debug, Clone)]
pub struct MarkToMarketResult {
    pub market_id: MarketId,
    pub pipeline: PipelineResult,
}

#[derive(Debug, Clone)]
pub struct SettlementResult {
    pub market_id: MarketId,
    pub settlement: Vec<TransferResponse>,
    pub cleared: Vec<TransferResponse>,
    pub cancelled_orders: Vec<Order>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("market {0} not found")]
    MarketNotFound(MarketId),

    #[error("market {0} is already settled")]
    MarketSettled(MarketId),

    #[error("market {0} has no mark price yet")]
    NoMarkPrice(MarketId),

    #[error("limit order needs a price")]
    MissingPrice,

    #[error("time update {next} is before current time {current}")]
    TimeWentBackwards { current: Timestamp, next: Timestamp },

    #[error("order rejected: {0}")]
    Order(#[from] OrderError),

    #[error("collateral error: {0}")]
    Collateral(#[from] CollateralError),

    #[error("settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("risk error: {0}")]
    Risk(#[from] RiskError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Order error code for validation failures, if this is one.
    pub fn order_code(&self) -> Option<&'static str> {
        match self {
            EngineError::Order(e) => Some(e.code()),
            _ => None,
        }
    }
}
