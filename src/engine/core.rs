// 8.0 engine/core.rs: main engine. holds all markets, the collateral engine, the event log.
// lock order: markets map -> one market -> collateral -> (ids | clock | events | store).
// the last group are leaves: never held while acquiring another lock.

use super::results::EngineError;
use crate::collateral::{CollateralEngine, CollateralError};
use crate::config::CoreConfig;
use crate::events::{DepositEvent, Event, EventLog, EventPayload, MarketCreatedEvent};
use crate::market::{Market, MarketConfig};
use crate::matching::{LevelSummary, MatchingConfig};
use crate::order::{Order, Trade};
use crate::position::MarketPosition;
use crate::risk::RiskConfig;
use crate::store::{MemoryStore, Store};
use crate::types::{Asset, MarketId, OrderId, OrderIdGenerator, PartyId, Price, Side, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/** 8.1: main engine struct. per-market state sits behind its own mutex */
#[derive(Debug)]
pub struct Engine {
    pub(super) config: RwLock<CoreConfig>,
    // BTreeMap so time updates visit markets in the same order on every replica
    pub(super) markets: RwLock<BTreeMap<MarketId, Mutex<Market>>>,
    pub(super) collateral: Mutex<CollateralEngine>,
    pub(super) ids: Mutex<OrderIdGenerator>,
    pub(super) clock: Mutex<Timestamp>,
    pub(super) market_seq: Mutex<u64>,
    pub(super) events: Mutex<EventLog>,
    pub(super) store: Mutex<Box<dyn Store>>,
}

impl Engine {
    pub fn new(config: CoreConfig) -> Result<Self, EngineError> {
        Self::with_store(config, Box::new(MemoryStore::new()))
    }

    pub fn with_store(config: CoreConfig, store: Box<dyn Store>) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            collateral: Mutex::new(CollateralEngine::new(config.collateral.clone())),
            events: Mutex::new(EventLog::new(config.engine.max_events)),
            config: RwLock::new(config),
            markets: RwLock::new(BTreeMap::new()),
            ids: Mutex::new(OrderIdGenerator::new(0)),
            clock: Mutex::new(Timestamp::default()),
            market_seq: Mutex::new(0),
            store: Mutex::new(store),
        })
    }

    pub fn time(&self) -> Timestamp {
        *self.clock.lock()
    }

    pub fn config(&self) -> CoreConfig {
        self.config.read().clone()
    }

    /// Swap engine-wide settings. Existing markets keep their own matching
    /// and risk configs; see [`Engine::reconfigure_market`].
    #[instrument(skip(self, config))]
    pub fn reconfigure(&self, config: CoreConfig) -> Result<CoreConfig, EngineError> {
        config.validate()?;
        self.collateral.lock().reconfigure(config.collateral.clone());
        self.events.lock().set_max_events(config.engine.max_events);
        let old = std::mem::replace(&mut *self.config.write(), config);
        info!("engine reconfigured");
        Ok(old)
    }

    /// Swap one market's matching and risk settings. Returns the old pair.
    #[instrument(skip(self, matching, risk), fields(market = %market_id))]
    pub fn reconfigure_market(
        &self,
        market_id: &MarketId,
        matching: MatchingConfig,
        risk: RiskConfig,
    ) -> Result<(MatchingConfig, RiskConfig), EngineError> {
        let markets = self.markets.read();
        let mut market = markets
            .get(market_id)
            .ok_or_else(|| EngineError::MarketNotFound(market_id.clone()))?
            .lock();
        let old_risk = market.risk.reconfigure(risk.clone())?;
        let old_matching = market.book.reconfigure(matching.clone());
        market.config.matching = matching;
        market.config.risk = risk;
        Ok((old_matching, old_risk))
    }

    /// Market config filled with this engine's default matching and risk settings.
    pub fn market_config(&self, name: &str, asset: Asset, maturity: Timestamp) -> MarketConfig {
        let config = self.config.read();
        MarketConfig::new(name, asset, maturity)
            .with_matching(config.matching.clone())
            .with_risk(config.risk.clone())
            .with_insurance(config.collateral.insurance_seed)
    }

    #[instrument(skip(self, config), fields(name = %config.name))]
    pub fn add_market(&self, config: MarketConfig) -> Result<MarketId, EngineError> {
        config.validate()?;

        let mut markets = self.markets.write();
        let mut seq = self.market_seq.lock();
        let id = config.derive_id(*seq + 1)?;
        let market = Market::new(id.clone(), config.clone())?;

        self.collateral
            .lock()
            .create_market_accounts(&id, &config.asset, config.insurance)?;
        *seq += 1;
        markets.insert(id.clone(), Mutex::new(market));
        drop(seq);
        drop(markets);

        info!(market = %id, asset = %config.asset, insurance = config.insurance, "market added");
        self.emit(EventPayload::MarketCreated(MarketCreatedEvent {
            market_id: id.clone(),
            name: config.name,
            asset: config.asset,
            insurance: config.insurance,
        }));
        Ok(id)
    }

    #[instrument(skip(self), fields(party = %party))]
    pub fn deposit(&self, party: &PartyId, asset: &Asset, amount: u64) -> Result<u64, EngineError> {
        let new_balance = self.collateral.lock().deposit(party, asset, amount)?;
        info!(asset = %asset, amount, new_balance, "deposit");
        self.emit(EventPayload::Deposit(DepositEvent {
            party_id: party.clone(),
            asset: asset.clone(),
            amount,
            new_balance,
        }));
        Ok(new_balance)
    }

    pub fn market_ids(&self) -> Vec<MarketId> {
        self.markets.read().keys().cloned().collect()
    }

    /// Run `f` against one market under its lock.
    pub fn with_market<R>(
        &self,
        market_id: &MarketId,
        f: impl FnOnce(&Market) -> R,
    ) -> Result<R, EngineError> {
        let markets = self.markets.read();
        let market = markets
            .get(market_id)
            .ok_or_else(|| EngineError::MarketNotFound(market_id.clone()))?
            .lock();
        Ok(f(&market))
    }

    /// Run `f` against the collateral engine under its lock.
    pub fn with_collateral<R>(&self, f: impl FnOnce(&CollateralEngine) -> R) -> R {
        f(&self.collateral.lock())
    }

    pub fn general_balance(&self, party: &PartyId, asset: &Asset) -> u64 {
        self.collateral.lock().general_balance(party, asset)
    }

    pub fn margin_balance(&self, market_id: &MarketId, party: &PartyId, asset: &Asset) -> u64 {
        self.collateral.lock().margin_balance(market_id, party, asset)
    }

    pub fn total_balance(&self, asset: &Asset) -> u128 {
        self.collateral.lock().total_balance(asset)
    }

    pub fn position(&self, market_id: &MarketId, party: &PartyId) -> Result<Option<MarketPosition>, EngineError> {
        self.with_market(market_id, |m| m.positions.get(party).cloned())
    }

    pub fn positions(&self, market_id: &MarketId) -> Result<Vec<MarketPosition>, EngineError> {
        self.with_market(market_id, |m| m.positions.positions())
    }

    pub fn order(&self, market_id: &MarketId, order_id: &OrderId) -> Result<Option<Order>, EngineError> {
        self.with_market(market_id, |m| m.book.order(order_id).cloned())
    }

    pub fn best_bid(&self, market_id: &MarketId) -> Result<Option<Price>, EngineError> {
        self.with_market(market_id, |m| m.book.best_bid())
    }

    pub fn best_ask(&self, market_id: &MarketId) -> Result<Option<Price>, EngineError> {
        self.with_market(market_id, |m| m.book.best_ask())
    }

    pub fn mark_price(&self, market_id: &MarketId) -> Result<Option<Price>, EngineError> {
        self.with_market(market_id, |m| m.mark_price())
    }

    pub fn depth(&self, market_id: &MarketId, side: Side, max_levels: usize) -> Result<Vec<LevelSummary>, EngineError> {
        self.with_market(market_id, |m| m.book.depth(side, max_levels))
    }

    pub fn trades(&self, market_id: &MarketId) -> Vec<Trade> {
        match self.store.lock().trades_by_market(market_id) {
            Ok(trades) => trades,
            Err(e) => {
                warn!(market = %market_id, error = %e, "trade store read failed");
                Vec::new()
            }
        }
    }

    pub fn recent_events(&self, count: usize) -> Vec<Event> {
        self.events.lock().recent(count).to_vec()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().events().to_vec()
    }

    pub(super) fn emit(&self, payload: EventPayload) {
        let now = self.time();
        self.events.lock().emit(now, payload);
    }

    pub(super) fn require_trader(
        collateral: &mut CollateralEngine,
        market: &Market,
        party: &PartyId,
    ) -> Result<(), CollateralError> {
        if collateral.config().auto_create_accounts {
            collateral.create_trader_accounts(party, market.asset());
        }
        collateral.add_trader_to_market(&market.id, party, market.asset())?;
        Ok(())
    }

    // store failures are logged, never fatal: the book already changed
    pub(super) fn record(&self, orders: &[&Order], trades: &[Trade]) {
        let mut store = self.store.lock();
        for order in orders {
            if let Err(e) = store.put_order(order) {
                warn!(order_id = %order.id, error = %e, "order store write failed");
            }
        }
        for trade in trades {
            if let Err(e) = store.put_trade(trade) {
                warn!(trade_id = %trade.id, error = %e, "trade store write failed");
            }
        }
    }
}
