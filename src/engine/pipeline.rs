// 8.2 engine/pipeline.rs: trades -> positions -> MTM -> collateral -> risk -> collateral.
// plain functions over one market and the collateral engine. the caller holds both locks.

use super::core::Engine;
use super::results::{EngineError, PipelineResult};
use crate::collateral::CollateralEngine;
use crate::events::{DistressedEvent, EventPayload, OrderEvent, TransferEvent};
use crate::market::Market;
use crate::order::{Order, Trade};
use crate::position::MarketPosition;
use crate::transfer::TransferResponse;
use crate::types::{MarketId, Price};
use tracing::{debug, info, warn};

/// Run a batch of trades from one order through positions, settlement and risk.
pub(super) fn settle_trades(
    market: &mut Market,
    collateral: &mut CollateralEngine,
    trades: &[Trade],
) -> Result<PipelineResult, EngineError> {
    let Some(last) = trades.last() else {
        return Ok(PipelineResult::default());
    };

    // every position change is materialized before settlement looks at any of them
    let mut updates: Vec<MarketPosition> = Vec::with_capacity(trades.len() * 2);
    for trade in trades {
        updates.extend(market.positions.update(trade));
        market.settlement.add_trade(trade)?;
    }

    mark_positions(market, collateral, last.price, &updates)
}

/// Mark every tracked position to `mark`, then rebalance margins.
pub(super) fn mark_to_market(
    market: &mut Market,
    collateral: &mut CollateralEngine,
    mark: Price,
) -> Result<PipelineResult, EngineError> {
    let positions = market.positions.positions();
    mark_positions(market, collateral, mark, &positions)
}

fn mark_positions(
    market: &mut Market,
    collateral: &mut CollateralEngine,
    mark: Price,
    positions: &[MarketPosition],
) -> Result<PipelineResult, EngineError> {
    // settlement state only moves once collateral took the transfers
    let pending = market.settlement.prepare_mark(mark, positions)?;
    let mut result = PipelineResult {
        settlement: collateral.transfer(&market.id, pending.transfers())?,
        ..PipelineResult::default()
    };
    market.settlement.commit(pending);
    rebalance(market, collateral, mark, &mut result)?;
    Ok(result)
}

/// Risk pass: compute zone transfers for every party, apply them, pull the
/// resting orders of anyone who could not top up.
pub(super) fn rebalance(
    market: &mut Market,
    collateral: &mut CollateralEngine,
    mark: Price,
    result: &mut PipelineResult,
) -> Result<(), EngineError> {
    let events = market.margin_events(collateral);
    let changes = market.risk.update_margins(&events, mark, &*market.book)?;
    if changes.is_empty() {
        return Ok(());
    }

    let (responses, distressed) = collateral.margin_update(&market.id, &changes)?;
    for change in &distressed {
        let removed = market.book.remove_distressed_orders(&change.transfer.owner);
        debug!(
            market = %market.id,
            party = %change.transfer.owner,
            orders = removed.len(),
            "distressed party orders pulled"
        );
        result.removed_orders.extend(removed);
    }
    result.margin.extend(responses);
    result.distressed.extend(distressed);
    Ok(())
}

impl Engine {
    /// Store and announce order state changes and trades.
    pub(super) fn publish_orders(&self, orders: &[&Order], trades: &[Trade]) {
        self.record(orders, trades);
        for order in orders {
            self.emit(EventPayload::OrderUpdated(OrderEvent::from(*order)));
        }
        for trade in trades {
            self.emit(EventPayload::Trade(trade.clone()));
        }
    }

    pub(super) fn publish_transfers(&self, market_id: &MarketId, responses: &[TransferResponse]) {
        let log_transfers = self.config.read().engine.log_transfers;
        for response in responses {
            if log_transfers {
                info!(
                    market = %market_id,
                    owner = %response.owner,
                    kind = %response.transfer_type,
                    requested = response.requested,
                    moved = response.moved(),
                    "transfer"
                );
            }
            self.emit(EventPayload::Transfer(TransferEvent::new(market_id, response)));
        }
    }

    pub(super) fn publish_pipeline(&self, market_id: &MarketId, result: &PipelineResult) {
        self.publish_transfers(market_id, &result.settlement);
        self.publish_transfers(market_id, &result.margin);
        for change in &result.distressed {
            warn!(
                market = %market_id,
                party = %change.transfer.owner,
                margin = change.event.margin_balance,
                general = change.event.general_balance,
                required = change.transfer.min_amount,
                "party distressed"
            );
            self.emit(EventPayload::Distressed(DistressedEvent {
                market_id: market_id.clone(),
                party_id: change.transfer.owner.clone(),
                margin_balance: change.event.margin_balance,
                general_balance: change.event.general_balance,
                required: change.transfer.min_amount,
            }));
        }
        let removed: Vec<&Order> = result.removed_orders.iter().collect();
        self.publish_orders(&removed, &[]);
    }
}
