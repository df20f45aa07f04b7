//! Market configuration and state.
//!
//! A market bundles one order book, its position tracker, its settlement
//! engine and its risk engine. All four are single-threaded; the engine puts
//! the whole market behind one lock.

use crate::collateral::CollateralEngine;
use crate::config::ConfigError;
use crate::matching::{MatchingConfig, MatchingEngine, OrderBook};
use crate::position::PositionTracker;
use crate::risk::{MarginEvent, RiskConfig, RiskEngine, RiskError};
use crate::settlement::{Future, SettlementEngine};
use crate::types::{Asset, MarketId, PartyId, Price, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    #[default]
    Active,
    /// Closed out against the final price. Accepts no further orders.
    Settled,
}

/// Static market configuration. Serialized to derive the market id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Human-readable name (e.g. "ETH/DEC24")
    pub name: String,
    /// Settlement asset
    pub asset: Asset,
    pub maturity: Timestamp,
    pub matching: MatchingConfig,
    pub risk: RiskConfig,
    /// Initial insurance pool balance
    pub insurance: u64,
}

impl MarketConfig {
    pub fn new(name: impl Into<String>, asset: Asset, maturity: Timestamp) -> Self {
        Self {
            name: name.into(),
            asset,
            maturity,
            matching: MatchingConfig::default(),
            risk: RiskConfig::default(),
            insurance: 0,
        }
    }

    pub fn with_insurance(mut self, insurance: u64) -> Self {
        self.insurance = insurance;
        self
    }

    pub fn with_risk(mut self, risk: RiskConfig) -> Self {
        self.risk = risk;
        self
    }

    pub fn with_matching(mut self, matching: MatchingConfig) -> Self {
        self.matching = matching;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::InvalidMarket {
                reason: "market name must not be empty".to_string(),
            });
        }
        if self.asset.is_empty() {
            return Err(ConfigError::InvalidMarket {
                reason: "settlement asset must not be empty".to_string(),
            });
        }
        self.risk.validate()?;
        Ok(())
    }

    /// Market id for the `seq`-th market created from this config.
    pub fn derive_id(&self, seq: u64) -> Result<MarketId, ConfigError> {
        let payload =
            serde_json::to_vec(self).map_err(|e| ConfigError::Serialization(e.to_string()))?;
        Ok(MarketId::derive(&payload, seq))
    }
}

#[derive(Debug)]
pub struct Market {
    pub id: MarketId,
    pub config: MarketConfig,
    pub status: MarketStatus,
    pub book: Box<dyn MatchingEngine + Send>,
    pub positions: PositionTracker,
    pub settlement: SettlementEngine,
    pub risk: RiskEngine,
}

impl Market {
    pub fn new(id: MarketId, config: MarketConfig) -> Result<Self, RiskError> {
        let risk = RiskEngine::new(id.clone(), config.asset.clone(), config.risk.clone())?;
        let product = Future::new(config.asset.clone(), config.maturity);
        Ok(Self {
            book: Box::new(OrderBook::new(id.clone(), config.matching.clone())),
            positions: PositionTracker::new(id.clone()),
            settlement: SettlementEngine::new(id.clone(), Box::new(product)),
            risk,
            status: MarketStatus::Active,
            id,
            config,
        })
    }

    pub fn asset(&self) -> &Asset {
        &self.config.asset
    }

    pub fn is_active(&self) -> bool {
        self.status == MarketStatus::Active
    }

    /// Last traded price. Margins and MTM are both marked here.
    pub fn mark_price(&self) -> Option<Price> {
        self.book.last_traded_price()
    }

    /// Risk inputs for every party holding a position or margin in this market, sorted by party.
    pub fn margin_events(&self, collateral: &CollateralEngine) -> Vec<MarginEvent> {
        self.positions
            .positions()
            .into_iter()
            .map(|p| self.margin_event(&p.party_id, p.size, collateral))
            .collect()
    }

    pub fn margin_event(&self, party: &PartyId, size: i64, collateral: &CollateralEngine) -> MarginEvent {
        MarginEvent {
            party: party.clone(),
            asset: self.asset().clone(),
            size,
            margin_balance: collateral.margin_balance(&self.id, party, self.asset()),
            general_balance: collateral.general_balance(party, self.asset()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MarketConfig {
        MarketConfig::new("ETH/DEC", Asset::from("USD"), Timestamp::from_secs(1_000))
    }

    #[test]
    fn id_depends_on_config_and_sequence() {
        let a = config().derive_id(1).unwrap();
        assert_eq!(a, config().derive_id(1).unwrap());
        assert_ne!(a, config().derive_id(2).unwrap());
        assert_ne!(a, config().with_insurance(5).derive_id(1).unwrap());
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut cfg = config();
        cfg.name.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidMarket { .. })));
    }

    #[test]
    fn new_market_is_active_without_mark() {
        let market = Market::new(MarketId::from("m"), config()).unwrap();
        assert!(market.is_active());
        assert!(market.mark_price().is_none());
        assert!(market.positions.is_empty());
    }
}
