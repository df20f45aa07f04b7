// 9.3 risk/engine.rs: one per market. turns (position, balances) snapshots into margin transfers.
// zones, highest first: release < bal -> MARGIN_HIGH. search <= bal <= release -> nothing.
// maint <= bal < search -> MARGIN_LOW (best effort). bal < maint -> MARGIN_LOW with a min.

use super::margin::{margin_levels, MarginLevels, ScalingFactors};
use super::model::{Model, RiskFactor};
use super::{RiskConfig, RiskError};
use crate::matching::MatchingEngine;
use crate::transfer::{FinancialAmount, Transfer, TransferType};
use crate::types::{Asset, MarketId, PartyId, Price};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What the risk engine needs to know about one party in one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginEvent {
    pub party: PartyId,
    pub asset: Asset,
    pub size: i64,
    pub margin_balance: u64,
    pub general_balance: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginChange {
    pub transfer: Transfer,
    pub levels: MarginLevels,
    pub event: MarginEvent,
}

#[derive(Debug)]
pub struct RiskEngine {
    market_id: MarketId,
    asset: Asset,
    config: RiskConfig,
    model: Box<dyn Model>,
    factor: RiskFactor,
}

impl RiskEngine {
    pub fn new(market_id: MarketId, asset: Asset, config: RiskConfig) -> Result<Self, RiskError> {
        config.scaling.validate()?;
        let model = config.model.build()?;
        let factor = model.risk_factor(&asset)?;
        Ok(Self {
            market_id,
            asset,
            config,
            model,
            factor,
        })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    pub fn risk_factor(&self) -> RiskFactor {
        self.factor
    }

    pub fn scaling_factors(&self) -> &ScalingFactors {
        &self.config.scaling
    }

    /// Install new scaling factors. Returns the previous ones.
    pub fn update_scaling_factors(&mut self, scaling: ScalingFactors) -> Result<ScalingFactors, RiskError> {
        scaling.validate()?;
        let old = std::mem::replace(&mut self.config.scaling, scaling);
        info!(market = %self.market_id, search = %scaling.search, initial = %scaling.initial, release = %scaling.release, "scaling factors updated");
        Ok(old)
    }

    /// Swap model and scaling together. Nothing changes if either is invalid.
    pub fn reconfigure(&mut self, config: RiskConfig) -> Result<RiskConfig, RiskError> {
        config.scaling.validate()?;
        let model = config.model.build()?;
        let factor = model.risk_factor(&self.asset)?;
        self.model = model;
        self.factor = factor;
        Ok(std::mem::replace(&mut self.config, config))
    }

    pub fn margin_levels(
        &self,
        event: &MarginEvent,
        mark: Price,
        book: &dyn MatchingEngine,
    ) -> Result<MarginLevels, RiskError> {
        margin_levels(event.size, mark, book, &self.factor, &self.config.scaling)
    }

    pub fn update_margins(
        &self,
        events: &[MarginEvent],
        mark: Price,
        book: &dyn MatchingEngine,
    ) -> Result<Vec<MarginChange>, RiskError> {
        let mut changes = Vec::new();
        for event in events {
            if event.size == 0 && event.margin_balance == 0 {
                continue;
            }
            let levels = self.margin_levels(event, mark, book)?;
            if let Some(transfer) = self.zone_transfer(event, &levels)? {
                debug!(
                    market = %self.market_id,
                    party = %event.party,
                    kind = ?transfer.transfer_type,
                    amount = transfer.amount.amount,
                    min = transfer.min_amount,
                    balance = event.margin_balance,
                    maintenance = levels.maintenance,
                    "margin change"
                );
                changes.push(MarginChange {
                    transfer,
                    levels,
                    event: event.clone(),
                });
            }
        }
        Ok(changes)
    }

    /// Parties whose margin balance is below maintenance right now.
    pub fn expect_margins(
        &self,
        events: &[MarginEvent],
        mark: Price,
        book: &dyn MatchingEngine,
    ) -> Result<Vec<MarginEvent>, RiskError> {
        let mut short = Vec::new();
        for event in events {
            let levels = self.margin_levels(event, mark, book)?;
            if event.margin_balance < levels.maintenance {
                short.push(event.clone());
            }
        }
        Ok(short)
    }

    fn zone_transfer(
        &self,
        event: &MarginEvent,
        levels: &MarginLevels,
    ) -> Result<Option<Transfer>, RiskError> {
        let balance = event.margin_balance;
        let (kind, amount, min_amount) = if balance < levels.maintenance {
            (
                TransferType::MarginLow,
                levels.initial - balance,
                levels.search - balance,
            )
        } else if balance < levels.search {
            (TransferType::MarginLow, levels.initial - balance, 0)
        } else if balance > levels.release {
            (TransferType::MarginHigh, balance - levels.release, 0)
        } else {
            return Ok(None);
        };

        let amount = i64::try_from(amount).map_err(|_| RiskError::MarginOverflow)?;
        let mut transfer = Transfer::new(
            event.party.clone(),
            kind,
            FinancialAmount::new(self.asset.clone(), amount),
        );
        transfer.min_amount = min_amount;
        Ok(Some(transfer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{MatchingConfig, OrderBook};
    use rust_decimal_macros::dec;

    fn engine() -> RiskEngine {
        RiskEngine::new(MarketId::from("m"), Asset::from("USD"), RiskConfig::default()).unwrap()
    }

    fn event(size: i64, margin: u64) -> MarginEvent {
        MarginEvent {
            party: PartyId::from("p"),
            asset: Asset::from("USD"),
            size,
            margin_balance: margin,
            general_balance: 1_000,
        }
    }

    fn empty_book() -> OrderBook {
        OrderBook::new(MarketId::from("m"), MatchingConfig::default())
    }

    // size 10 long at mark 100 on an empty book: maint 150, search 165, initial 180, release 210
    fn zone(margin: u64) -> Option<MarginChange> {
        engine()
            .update_margins(&[event(10, margin)], Price::new_unchecked(100), &empty_book())
            .unwrap()
            .pop()
    }

    #[test]
    fn below_maintenance_requires_minimum() {
        let change = zone(100).unwrap();
        assert_eq!(change.transfer.transfer_type, TransferType::MarginLow);
        assert_eq!(change.transfer.amount.amount, 80);
        assert_eq!(change.transfer.min_amount, 65);
        assert_eq!(change.levels.maintenance, 150);
    }

    #[test]
    fn search_zone_is_best_effort() {
        let change = zone(150).unwrap();
        assert_eq!(change.transfer.transfer_type, TransferType::MarginLow);
        assert_eq!(change.transfer.amount.amount, 30);
        assert_eq!(change.transfer.min_amount, 0);

        assert_eq!(zone(164).unwrap().transfer.amount.amount, 16);
    }

    #[test]
    fn healthy_band_emits_nothing() {
        assert!(zone(165).is_none());
        assert!(zone(190).is_none());
        assert!(zone(210).is_none());
    }

    #[test]
    fn excess_above_release_is_returned() {
        let change = zone(250).unwrap();
        assert_eq!(change.transfer.transfer_type, TransferType::MarginHigh);
        assert_eq!(change.transfer.amount.amount, 40);
    }

    #[test]
    fn flat_party_releases_everything_or_is_skipped() {
        let engine = engine();
        let book = empty_book();
        let mark = Price::new_unchecked(100);

        let changes = engine.update_margins(&[event(0, 0)], mark, &book).unwrap();
        assert!(changes.is_empty());

        let changes = engine.update_margins(&[event(0, 30)], mark, &book).unwrap();
        assert_eq!(changes[0].transfer.transfer_type, TransferType::MarginHigh);
        assert_eq!(changes[0].transfer.amount.amount, 30);
    }

    #[test]
    fn expect_margins_lists_parties_under_maintenance() {
        let engine = engine();
        let book = empty_book();
        let short = engine
            .expect_margins(&[event(10, 149), event(10, 150)], Price::new_unchecked(100), &book)
            .unwrap();
        assert_eq!(short.len(), 1);
        assert_eq!(short[0].margin_balance, 149);
    }

    #[test]
    fn bad_scaling_update_keeps_old_factors() {
        let mut engine = engine();
        let bad = ScalingFactors {
            search: dec!(1.5),
            initial: dec!(1.2),
            release: dec!(1.4),
        };
        assert!(engine.update_scaling_factors(bad).is_err());
        assert_eq!(engine.scaling_factors(), &ScalingFactors::default());
    }

    #[test]
    fn top_up_beyond_signed_range_is_an_error() {
        let config = RiskConfig {
            scaling: ScalingFactors {
                search: dec!(1.1),
                initial: dec!(1.2),
                release: dec!(1.2),
            },
            ..RiskConfig::default()
        };
        let engine = RiskEngine::new(MarketId::from("m"), Asset::from("USD"), config).unwrap();

        // maintenance 1.5e19 still fits u64, the 1.8e19 top-up does not fit i64
        let result = engine.update_margins(
            &[event(100_000_000_000_000_000, 0)],
            Price::new_unchecked(1_000),
            &empty_book(),
        );
        assert_eq!(result, Err(RiskError::MarginOverflow));
    }
}
