// 7.0 config.rs: every tunable in one place. engine, collateral, default matching and risk.
// 7.1 nothing is loaded from disk here. callers build a config and hand it to Engine::new/reconfigure.

use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::collateral::CollateralConfig;
use crate::engine::EngineConfig;
use crate::matching::{MatchingAlgorithm, MatchingConfig};
use crate::risk::{LogNormalModel, RiskConfig, RiskError, RiskModelConfig, ScalingFactors};

// Complete configuration for the trading core
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub engine: EngineConfig,
    pub collateral: CollateralConfig,
    // Defaults for markets built through Engine::market_config
    pub matching: MatchingConfig,
    pub risk: RiskConfig,
}

impl CoreConfig {
    // Testnet: seeded insurance, verbose book dumps
    pub fn testnet() -> Self {
        let mut config = Self::default();
        config.collateral.insurance_seed = 1_000_000;
        config.matching.log_price_levels = true;
        config.engine.log_transfers = true;
        config
    }

    // Mainnet: log-normal margins, wider scaling bands, pro-rata matching
    pub fn mainnet_conservative() -> Self {
        let mut config = Self::default();
        config.matching.algorithm = MatchingAlgorithm::ProRata;
        config.risk.model = RiskModelConfig::LogNormal(LogNormalModel {
            tau: dec!(0.0001140771161), // one hour in years
            mu: dec!(0),
            sigma: dec!(1.2),
            z: dec!(2.326), // 99% one-sided
        });
        config.risk.scaling = ScalingFactors {
            search: dec!(1.2),
            initial: dec!(1.5),
            release: dec!(2),
        };
        config.collateral.auto_create_accounts = false;
        config
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_events == 0 {
            return Err(ConfigError::InvalidEngine {
                reason: "event log needs room for at least one event".to_string(),
            });
        }
        if self.collateral.max_journal_entries == 0 {
            return Err(ConfigError::InvalidEngine {
                reason: "ledger journal needs room for at least one entry".to_string(),
            });
        }
        self.risk.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid engine config: {reason}")]
    InvalidEngine { reason: String },
    #[error("invalid market config: {reason}")]
    InvalidMarket { reason: String },
    #[error("invalid risk config: {0}")]
    InvalidRisk(#[from] RiskError),
    #[error("config serialization failed: {0}")]
    Serialization(String),
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> CoreConfig {
        match self {
            Environment::Development => CoreConfig::default(),
            Environment::Testnet => CoreConfig::testnet(),
            Environment::Mainnet => CoreConfig::mainnet_conservative(),
        }
    }
}
