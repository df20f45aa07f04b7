//! Order entry: submit, cancel and amend.
//!
//! Every call runs under the market lock. Anything that trades is pushed
//! through the settlement/risk pipeline before the lock is released.

use super::core::Engine;
use super::pipeline;
use super::results::{AmendResult, EngineError, OrderResult};
use crate::matching::AmendOutcome;
use crate::order::{Order, OrderAmendment, OrderError, OrderType, TimeInForce};
use crate::types::{MarketId, OrderId, PartyId, Price, Side, Timestamp};
use tracing::{debug, info, instrument};

/// What a party asks for. The engine assigns id, market and creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSubmission {
    pub party: PartyId,
    pub side: Side,
    pub order_type: OrderType,
    /// Required for limit orders, ignored for market orders.
    pub price: Option<Price>,
    pub size: u64,
    pub time_in_force: TimeInForce,
    /// Zero unless GTT.
    pub expires_at: Timestamp,
    pub reference: String,
}

impl OrderSubmission {
    pub fn limit(party: PartyId, side: Side, price: Price, size: u64, time_in_force: TimeInForce) -> Self {
        Self {
            party,
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            size,
            time_in_force,
            expires_at: Timestamp::default(),
            reference: String::new(),
        }
    }

    pub fn market(party: PartyId, side: Side, size: u64) -> Self {
        Self {
            party,
            side,
            order_type: OrderType::Market,
            price: None,
            size,
            time_in_force: TimeInForce::IOC,
            expires_at: Timestamp::default(),
            reference: String::new(),
        }
    }

    /// Good till `expires_at`.
    pub fn with_expiry(mut self, expires_at: Timestamp) -> Self {
        self.time_in_force = TimeInForce::GTT;
        self.expires_at = expires_at;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    fn into_order(self, id: OrderId, market_id: MarketId, created_at: Timestamp) -> Result<Order, EngineError> {
        let mut order = match self.order_type {
            OrderType::Limit => {
                let price = self.price.ok_or(EngineError::MissingPrice)?;
                Order::new_limit(id, market_id, self.party, self.side, price, self.size, self.time_in_force, created_at)
            }
            OrderType::Market => {
                let mut order = Order::new_market(id, market_id, self.party, self.side, self.size, created_at);
                // market orders never rest: FOK stays FOK, everything else is IOC
                if self.time_in_force == TimeInForce::FOK {
                    order.time_in_force = TimeInForce::FOK;
                }
                order
            }
        };
        if order.time_in_force == TimeInForce::GTT {
            order.expires_at = self.expires_at;
        }
        order.reference = self.reference;
        Ok(order)
    }
}

impl Engine {
    #[instrument(skip(self, submission), fields(market = %market_id, party = %submission.party))]
    pub fn submit_order(&self, market_id: &MarketId, submission: OrderSubmission) -> Result<OrderResult, EngineError> {
        let markets = self.markets.read();
        let mut market = markets
            .get(market_id)
            .ok_or_else(|| EngineError::MarketNotFound(market_id.clone()))?
            .lock();
        if !market.is_active() {
            return Err(EngineError::MarketSettled(market_id.clone()));
        }

        // structural checks first: a party without accounts must not reach the book
        let mut collateral = self.collateral.lock();
        Self::require_trader(&mut collateral, &market, &submission.party)?;

        let id = self.ids.lock().next_id();
        let order = submission.into_order(id, market_id.clone(), self.time())?;
        let confirmation = market.book.submit(order)?;
        debug!(
            order_id = %confirmation.order.id,
            status = ?confirmation.order.status,
            trades = confirmation.trades.len(),
            "order submitted"
        );

        let pipeline = pipeline::settle_trades(&mut market, &mut collateral, &confirmation.trades)?;
        drop(collateral);

        let mut touched: Vec<&Order> = Vec::with_capacity(1 + confirmation.passive_orders_affected.len());
        touched.push(&confirmation.order);
        touched.extend(confirmation.passive_orders_affected.iter());
        self.publish_orders(&touched, &confirmation.trades);
        self.publish_pipeline(market_id, &pipeline);

        Ok(OrderResult { confirmation, pipeline })
    }

    /// Cancel a resting order. Only its owner may cancel it.
    #[instrument(skip(self), fields(market = %market_id, order_id = %order_id))]
    pub fn cancel_order(&self, market_id: &MarketId, order_id: &OrderId, party: &PartyId) -> Result<Order, EngineError> {
        let markets = self.markets.read();
        let mut market = markets
            .get(market_id)
            .ok_or_else(|| EngineError::MarketNotFound(market_id.clone()))?
            .lock();

        let resting = market
            .book
            .order(order_id)
            .cloned()
            .ok_or(OrderError::OrderRemovalFailure)?;
        if &resting.party_id != party {
            return Err(OrderError::OrderRemovalFailure.into());
        }
        let cancelled = market.book.cancel(&resting)?.order;
        info!(party = %party, remaining = cancelled.remaining, "order cancelled");

        self.publish_orders(&[&cancelled], &[]);
        Ok(cancelled)
    }

    /// Amend a resting order. A price change or size increase re-enters the
    /// book and may trade, in which case the pipeline runs as for a submit.
    #[instrument(skip(self, amendment), fields(market = %amendment.market_id, order_id = %amendment.order_id))]
    pub fn amend_order(&self, amendment: OrderAmendment) -> Result<AmendResult, EngineError> {
        let markets = self.markets.read();
        let mut market = markets
            .get(&amendment.market_id)
            .ok_or_else(|| EngineError::MarketNotFound(amendment.market_id.clone()))?
            .lock();
        if !market.is_active() {
            return Err(EngineError::MarketSettled(amendment.market_id.clone()));
        }

        let outcome = market.book.amend(&amendment)?;
        match outcome {
            AmendOutcome::InPlace(order) => {
                debug!(remaining = order.remaining, expires_at = %order.expires_at, "amended in place");
                self.publish_orders(&[&order], &[]);
                Ok(AmendResult {
                    order,
                    cancelled: None,
                    trades: Vec::new(),
                    pipeline: Default::default(),
                })
            }
            AmendOutcome::Replaced { cancelled, confirmation } => {
                let mut collateral = self.collateral.lock();
                let pipeline = pipeline::settle_trades(&mut market, &mut collateral, &confirmation.trades)?;
                drop(collateral);
                debug!(trades = confirmation.trades.len(), "amended by replace");

                let mut touched: Vec<&Order> = vec![&cancelled, &confirmation.order];
                touched.extend(confirmation.passive_orders_affected.iter());
                self.publish_orders(&touched, &confirmation.trades);
                self.publish_pipeline(&amendment.market_id, &pipeline);

                Ok(AmendResult {
                    order: confirmation.order,
                    cancelled: Some(cancelled),
                    trades: confirmation.trades,
                    pipeline,
                })
            }
        }
    }
}
