// 8.3 engine/lifecycle.rs: time, marking, final settlement and distressed removal.

use super::core::Engine;
use super::pipeline;
use super::results::{EngineError, MarkToMarketResult, PipelineResult, SettlementResult, TickResult};
use crate::events::{EventPayload, MarketSettledEvent};
use crate::market::MarketStatus;
use crate::order::Order;
use crate::transfer::TransferResponse;
use crate::types::{MarketId, PartyId, Price, Timestamp};
use tracing::{debug, info, instrument, warn};

impl Engine {
    /// Advance the engine clock. Expires due GTT orders in every market, then
    /// re-runs risk where the book changed under an open position.
    #[instrument(skip(self), fields(time = %time))]
    pub fn on_chain_time_update(&self, time: Timestamp) -> Result<TickResult, EngineError> {
        {
            let mut clock = self.clock.lock();
            if time < *clock {
                return Err(EngineError::TimeWentBackwards { current: *clock, next: time });
            }
            *clock = time;
        }
        self.ids.lock().new_block();
        self.collateral.lock().set_time(time);

        let markets = self.markets.read();
        let mut result = TickResult { time, ..TickResult::default() };
        for (id, market) in markets.iter() {
            let mut market = market.lock();
            if !market.is_active() {
                continue;
            }
            let expired = market.book.remove_expired(time);
            if expired.is_empty() {
                continue;
            }
            debug!(market = %id, expired = expired.len(), "orders expired");
            let refs: Vec<&Order> = expired.iter().collect();
            self.publish_orders(&refs, &[]);

            // closeout depth moved, so margin requirements may have too
            if let Some(mark) = market.mark_price() {
                let mut collateral = self.collateral.lock();
                let mut pipeline = PipelineResult::default();
                pipeline::rebalance(&mut market, &mut collateral, mark, &mut pipeline)?;
                drop(collateral);
                if !pipeline.is_empty() {
                    self.publish_pipeline(id, &pipeline);
                    result.pipelines.push((id.clone(), pipeline));
                }
            }
            result.expired.extend(expired);
        }
        info!(block = self.ids.lock().block(), expired = result.expired.len(), "time updated");
        Ok(result)
    }

    /// Mark every open position to the last traded price.
    #[instrument(skip(self), fields(market = %market_id))]
    pub fn mark_to_market(&self, market_id: &MarketId) -> Result<MarkToMarketResult, EngineError> {
        let markets = self.markets.read();
        let mut market = markets
            .get(market_id)
            .ok_or_else(|| EngineError::MarketNotFound(market_id.clone()))?
            .lock();
        if !market.is_active() {
            return Err(EngineError::MarketSettled(market_id.clone()));
        }
        let mark = market
            .mark_price()
            .ok_or_else(|| EngineError::NoMarkPrice(market_id.clone()))?;

        let mut collateral = self.collateral.lock();
        let pipeline = pipeline::mark_to_market(&mut market, &mut collateral, mark)?;
        drop(collateral);

        debug!(mark = %mark, transfers = pipeline.settlement.len(), "marked to market");
        self.publish_pipeline(market_id, &pipeline);
        Ok(MarkToMarketResult {
            market_id: market_id.clone(),
            pipeline,
        })
    }

    /// Final price the product settles against.
    #[instrument(skip(self), fields(market = %market_id, price = %price))]
    pub fn set_settlement_price(&self, market_id: &MarketId, price: Price) -> Result<(), EngineError> {
        let markets = self.markets.read();
        let mut market = markets
            .get(market_id)
            .ok_or_else(|| EngineError::MarketNotFound(market_id.clone()))?
            .lock();
        if !market.is_active() {
            return Err(EngineError::MarketSettled(market_id.clone()));
        }
        market.settlement.product_mut().set_settlement_price(price);
        info!("settlement price set");
        Ok(())
    }

    /// Close out every position against the product's final price, return all
    /// margin, cancel the book and close the market.
    #[instrument(skip(self), fields(market = %market_id, time = %time))]
    pub fn settle_market(&self, market_id: &MarketId, time: Timestamp) -> Result<SettlementResult, EngineError> {
        let markets = self.markets.read();
        let mut market = markets
            .get(market_id)
            .ok_or_else(|| EngineError::MarketNotFound(market_id.clone()))?
            .lock();
        if !market.is_active() {
            return Err(EngineError::MarketSettled(market_id.clone()));
        }
        let asset = market.asset().clone();

        let mut collateral = self.collateral.lock();
        let pending = market.settlement.prepare_close_out(time)?;
        let settlement = collateral.transfer(market_id, pending.transfers())?;
        let cleared = match collateral.clear_market(market_id, &asset) {
            Ok(cleared) => cleared,
            Err(err) => {
                // positions are still open, so the close-out must not stick either
                if let Err(revert) = collateral.revert(&settlement) {
                    warn!(error = %revert, "close-out transfers could not be reverted");
                }
                return Err(err.into());
            }
        };
        drop(collateral);
        market.settlement.commit(pending);

        let cancelled_orders = market.book.remove_all_orders();
        market.positions.clear();
        market.status = MarketStatus::Settled;
        info!(
            transfers = settlement.len(),
            cleared = cleared.len(),
            cancelled = cancelled_orders.len(),
            "market closed"
        );

        self.publish_transfers(market_id, &settlement);
        self.publish_transfers(market_id, &cleared);
        let refs: Vec<&Order> = cancelled_orders.iter().collect();
        self.publish_orders(&refs, &[]);
        self.emit(EventPayload::MarketSettled(MarketSettledEvent {
            market_id: market_id.clone(),
            transfers: settlement.len(),
        }));

        Ok(SettlementResult {
            market_id: market_id.clone(),
            settlement,
            cleared,
            cancelled_orders,
        })
    }

    /// Hand distressed parties over to whatever resolves them: their margin
    /// goes to insurance and their resting orders are cancelled. Open positions
    /// stay, so later marks keep netting to zero; with no margin left their
    /// losses are drawn from insurance.
    #[instrument(skip(self, parties), fields(market = %market_id, parties = parties.len()))]
    pub fn remove_distressed(
        &self,
        market_id: &MarketId,
        parties: &[PartyId],
    ) -> Result<Vec<TransferResponse>, EngineError> {
        let markets = self.markets.read();
        let mut market = markets
            .get(market_id)
            .ok_or_else(|| EngineError::MarketNotFound(market_id.clone()))?
            .lock();
        let asset = market.asset().clone();

        let responses = self.collateral.lock().remove_distressed(market_id, parties, &asset)?;
        let mut orders = Vec::new();
        for party in parties {
            orders.extend(market.book.remove_distressed_orders(party));
        }
        let open = parties
            .iter()
            .filter(|party| market.positions.get(party).is_some_and(|p| p.size != 0))
            .count();
        info!(orders = orders.len(), open_positions = open, "distressed parties removed");

        self.publish_transfers(market_id, &responses);
        let refs: Vec<&Order> = orders.iter().collect();
        self.publish_orders(&refs, &[]);
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::super::OrderSubmission;
    use super::*;
    use crate::config::CoreConfig;
    use crate::order::{OrderStatus, TimeInForce};
    use crate::types::{Asset, Side};

    fn usd() -> Asset {
        Asset::from("USD")
    }

    fn setup() -> (Engine, MarketId) {
        let engine = Engine::new(CoreConfig::default()).unwrap();
        let config = engine
            .market_config("BTC/MAR", usd(), Timestamp::from_secs(50_000))
            .with_insurance(500);
        let id = engine.add_market(config).unwrap();
        for party in ["A", "B", "C"] {
            engine.deposit(&PartyId::from(party), &usd(), 5_000).unwrap();
        }
        (engine, id)
    }

    fn limit(party: &str, side: Side, price: u64, size: u64) -> OrderSubmission {
        OrderSubmission::limit(PartyId::from(party), side, Price::new_unchecked(price), size, TimeInForce::GTC)
    }

    #[test]
    fn time_cannot_go_backwards() {
        let (engine, _) = setup();
        engine.on_chain_time_update(Timestamp::from_secs(10)).unwrap();
        let err = engine.on_chain_time_update(Timestamp::from_secs(9)).unwrap_err();
        assert!(matches!(err, EngineError::TimeWentBackwards { .. }));
        assert_eq!(engine.time(), Timestamp::from_secs(10));
    }

    #[test]
    fn gtt_orders_expire_on_tick_and_ids_change_block() {
        let (engine, id) = setup();
        engine.on_chain_time_update(Timestamp::from_secs(1)).unwrap();
        let gtt = limit("A", Side::Buy, 90, 2).with_expiry(Timestamp::from_secs(5));
        let placed = engine.submit_order(&id, gtt).unwrap();
        assert!(placed.confirmation.order.id.as_str().starts_with("V0000000001-"));

        let early = engine.on_chain_time_update(Timestamp::from_secs(4)).unwrap();
        assert!(early.expired.is_empty());

        let due = engine.on_chain_time_update(Timestamp::from_secs(5)).unwrap();
        assert_eq!(due.expired.len(), 1);
        assert_eq!(due.expired[0].status, OrderStatus::Expired);
        assert!(engine.best_bid(&id).unwrap().is_none());
    }

    #[test]
    fn mark_to_market_needs_a_trade() {
        let (engine, id) = setup();
        assert!(matches!(engine.mark_to_market(&id), Err(EngineError::NoMarkPrice(_))));
    }

    #[test]
    fn settle_returns_everything_and_closes_market() {
        let (engine, id) = setup();
        let total_before = engine.total_balance(&usd());

        engine.submit_order(&id, limit("A", Side::Sell, 100, 10)).unwrap();
        engine.submit_order(&id, limit("B", Side::Buy, 100, 10)).unwrap();
        engine.submit_order(&id, limit("C", Side::Buy, 90, 1)).unwrap();

        engine.set_settlement_price(&id, Price::new_unchecked(110)).unwrap();
        let result = engine.settle_market(&id, Timestamp::from_secs(50_000)).unwrap();

        assert_eq!(result.cancelled_orders.len(), 1);
        assert_eq!(engine.margin_balance(&id, &PartyId::from("A"), &usd()), 0);
        assert_eq!(engine.margin_balance(&id, &PartyId::from("B"), &usd()), 0);
        assert_eq!(engine.general_balance(&PartyId::from("B"), &usd()), 5_100);
        assert_eq!(engine.general_balance(&PartyId::from("A"), &usd()), 4_900);
        assert_eq!(engine.total_balance(&usd()), total_before);

        let again = engine.submit_order(&id, limit("C", Side::Buy, 90, 1));
        assert!(matches!(again, Err(EngineError::MarketSettled(_))));
    }

    #[test]
    fn settle_without_price_changes_nothing() {
        let (engine, id) = setup();
        engine.submit_order(&id, limit("A", Side::Sell, 100, 1)).unwrap();
        engine.submit_order(&id, limit("B", Side::Buy, 100, 1)).unwrap();
        assert!(engine.settle_market(&id, Timestamp::from_secs(1)).is_err());
        assert_eq!(engine.position(&id, &PartyId::from("B")).unwrap().unwrap().size, 1);
    }
}
