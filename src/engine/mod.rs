// 8.0: the orchestrator. owns every market and the collateral engine and runs
// book -> positions -> settlement -> collateral -> risk -> collateral on every order and tick.
// deterministic, no clock reads, no external I/O beyond the store seam.

mod config;
mod core;
mod lifecycle;
mod orders;
mod pipeline;
mod results;

pub use config::EngineConfig;
pub use core::Engine;
pub use orders::OrderSubmission;
pub use results::{
    AmendResult, EngineError, MarkToMarketResult, OrderResult, PipelineResult, SettlementResult,
    TickResult,
};
