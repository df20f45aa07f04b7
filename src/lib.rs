// derivs-core: trading core for a derivatives venue.
// matching, positions, mark-to-market settlement, margin risk and collateral.
// all computation is deterministic: no clock reads, no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: ids, Side, Price, Timestamp, order id generator
//   2.x  order.rs: orders, trades, amendments, order error codes
//   3.x  matching/: price-time (or pro-rata) limit order book
//   4.x  position.rs: net position per party
//   5.x  transfer.rs: transfer requests, responses, ledger entries
//   6.x  settlement/: mark-to-market and final close-out, Product trait
//   7.x  config.rs: engine-wide config and environment presets
//   8.x  engine/: orchestrator. submit/cancel/amend, time, settle
//   9.x  risk/: risk models, margin levels, zone transfers
//   10.x collateral/: accounts, loss/win collection, margin moves
//   11.x events.rs: bounded audit log
//   12.x market.rs: per-market bundle of book, positions, settlement, risk
//   13.x telemetry.rs: tracing subscriber for binaries
//   store.rs: order and trade storage seams

pub mod collateral;
pub mod config;
pub mod engine;
pub mod events;
pub mod market;
pub mod matching;
pub mod order;
pub mod position;
pub mod risk;
pub mod settlement;
pub mod store;
pub mod telemetry;
pub mod transfer;
pub mod types;

// re exports for convenience
pub use collateral::{CollateralConfig, CollateralEngine, CollateralError};
pub use config::{ConfigError, CoreConfig, Environment};
pub use engine::{
    AmendResult, Engine, EngineConfig, EngineError, MarkToMarketResult, OrderResult,
    OrderSubmission, PipelineResult, SettlementResult, TickResult,
};
pub use events::{Event, EventLog, EventPayload};
pub use market::{Market, MarketConfig, MarketStatus};
pub use matching::{AmendOutcome, MatchingAlgorithm, MatchingConfig, MatchingEngine, OrderBook};
pub use order::{Order, OrderAmendment, OrderError, OrderStatus, OrderType, TimeInForce, Trade};
pub use position::{MarketPosition, PositionTracker};
pub use risk::{RiskConfig, RiskEngine, RiskError, RiskModelConfig, ScalingFactors};
pub use settlement::{Future, PendingSettlement, Product, SettlementEngine, SettlementError};
pub use store::{MemoryStore, OrderStore, Store, TradeStore};
pub use transfer::{Transfer, TransferResponse, TransferType};
pub use types::{AccountId, Asset, MarketId, OrderId, PartyId, Price, Side, Timestamp};
