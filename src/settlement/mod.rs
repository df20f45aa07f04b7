// 6.0 settlement/: mark-to-market and final close-out.
//   engine.rs: per party (size, price) bookkeeping, MTM and close-out transfers (prepare, then commit)
//   product.rs: Product trait + cash-settled Future

pub mod engine;
pub mod product;

pub use engine::{Lot, PendingSettlement, SettledPosition, SettlementEngine};
pub use product::{Future, Product};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    #[error("settlement amount overflows i64")]
    AmountOverflow,
    #[error("product has no final settlement price yet")]
    SettlementPriceMissing,
}
