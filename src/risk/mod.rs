// 9.0 risk/: margin requirements and the zone checks that turn them into transfers.
//   model.rs: Model trait, simple and log-normal risk factors
//   margin.rs: scaling factors + margin levels from book depth
//   engine.rs: RiskEngine, one per market

pub mod engine;
pub mod margin;
pub mod model;

pub use engine::{MarginChange, MarginEvent, RiskEngine};
pub use margin::{margin_levels, MarginLevels, ScalingFactors};
pub use model::{LogNormalModel, Model, RiskFactor, RiskModelConfig, SimpleModel};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RiskError {
    #[error("scaling factors must satisfy release >= initial > search >= 1 (search {search}, initial {initial}, release {release})")]
    InvalidScalingFactors {
        search: Decimal,
        initial: Decimal,
        release: Decimal,
    },
    #[error("invalid risk model parameters: {reason}")]
    InvalidModelParameters { reason: String },
    #[error("margin requirement overflows")]
    MarginOverflow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub model: RiskModelConfig,
    pub scaling: ScalingFactors,
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), RiskError> {
        self.scaling.validate()?;
        self.model.build()?;
        Ok(())
    }
}
