//! Derivatives core simulation.
//!
//! Walks one futures market through its life: deposits, matching, marking,
//! a margin squeeze, expiry and final settlement. Everything is logged
//! through tracing; set `RUST_LOG=debug` to see the per-order flow.

use derivs_core::telemetry::init_tracing;
use derivs_core::*;
use tracing::{info, warn};

fn main() {
    init_tracing("info");
    info!("derivatives core simulation");

    if let Err(e) = run() {
        warn!(error = %e, "simulation aborted");
        std::process::exit(1);
    }
    info!("all scenarios completed");
}

fn run() -> Result<(), EngineError> {
    let usd = Asset::from("USD");
    let engine = Engine::new(CoreConfig::testnet())?;
    engine.on_chain_time_update(Timestamp::from_secs(1))?;

    let config = engine.market_config("ETH/DEC", usd.clone(), Timestamp::from_secs(3_600));
    let market = engine.add_market(config)?;
    info!(market = %market, "market open");

    scenario_1_basic_trading(&engine, &market, &usd)?;
    scenario_2_fifo_priority(&engine, &market)?;
    scenario_3_mark_to_market(&engine, &market, &usd)?;
    scenario_4_margin_squeeze(&engine, &market, &usd)?;
    scenario_5_expiry(&engine, &market)?;
    scenario_6_final_settlement(&engine, &market, &usd)?;
    Ok(())
}

fn party(name: &str) -> PartyId {
    PartyId::from(name)
}

fn limit(name: &str, side: Side, price: u64, size: u64) -> OrderSubmission {
    OrderSubmission::limit(party(name), side, Price::new_unchecked(price), size, TimeInForce::GTC)
}

/// Two parties cross at one price.
fn scenario_1_basic_trading(engine: &Engine, market: &MarketId, usd: &Asset) -> Result<(), EngineError> {
    info!("scenario 1: basic matching");
    for name in ["alice", "bob", "carol", "dave"] {
        engine.deposit(&party(name), usd, 100_000)?;
    }

    engine.submit_order(market, limit("bob", Side::Sell, 1_000, 10))?;
    let result = engine.submit_order(market, limit("alice", Side::Buy, 1_000, 4))?;
    info!(
        traded = result.confirmation.traded_volume(),
        margin_moves = result.pipeline.margin.len(),
        "alice lifts bob"
    );
    if let Some(pos) = engine.position(market, &party("alice"))? {
        info!(size = pos.size, price = %pos.price, "alice position");
    }
    info!(
        general = engine.general_balance(&party("alice"), usd),
        margin = engine.margin_balance(market, &party("alice"), usd),
        "alice balances"
    );
    Ok(())
}

/// Equal prices fill in arrival order.
fn scenario_2_fifo_priority(engine: &Engine, market: &MarketId) -> Result<(), EngineError> {
    info!("scenario 2: price-time priority");
    engine.submit_order(market, limit("carol", Side::Sell, 1_000, 5))?;
    let result = engine.submit_order(market, limit("dave", Side::Buy, 1_000, 8))?;
    for trade in &result.confirmation.trades {
        info!(seller = %trade.seller, size = trade.size, price = %trade.price, "fill");
    }
    for level in engine.depth(market, Side::Sell, 5)? {
        info!(price = %level.price, volume = level.volume, orders = level.order_count, "ask level");
    }
    Ok(())
}

/// A trade at a higher price moves value from shorts to longs.
fn scenario_3_mark_to_market(engine: &Engine, market: &MarketId, usd: &Asset) -> Result<(), EngineError> {
    info!("scenario 3: mark to market");
    engine.submit_order(market, limit("bob", Side::Sell, 1_050, 1))?;
    let result = engine.submit_order(market, limit("carol", Side::Buy, 1_050, 1))?;
    for transfer in &result.pipeline.settlement {
        info!(
            owner = %transfer.owner,
            kind = %transfer.transfer_type,
            moved = transfer.moved(),
            "settlement"
        );
    }
    info!(total = engine.total_balance(usd) as u64, "system balance");
    Ok(())
}

/// A thinly funded party sells into a rising market.
fn scenario_4_margin_squeeze(engine: &Engine, market: &MarketId, usd: &Asset) -> Result<(), EngineError> {
    info!("scenario 4: margin squeeze");
    engine.deposit(&party("eve"), usd, 300)?;
    engine.submit_order(market, limit("eve", Side::Sell, 1_050, 1))?;
    engine.submit_order(market, limit("eve", Side::Sell, 1_400, 2))?;
    engine.submit_order(market, limit("alice", Side::Buy, 1_050, 1))?;

    engine.submit_order(market, limit("bob", Side::Sell, 1_300, 1))?;
    let result = engine.submit_order(market, limit("dave", Side::Buy, 1_300, 1))?;
    for change in &result.pipeline.distressed {
        warn!(
            party = %change.transfer.owner,
            required = change.transfer.min_amount,
            general = change.event.general_balance,
            "distressed"
        );
    }
    info!(removed = result.pipeline.removed_orders.len(), "orders pulled");

    let distressed: Vec<PartyId> = result
        .pipeline
        .distressed
        .iter()
        .map(|c| c.transfer.owner.clone())
        .collect();
    if !distressed.is_empty() {
        let moved = engine.remove_distressed(market, &distressed)?;
        info!(transfers = moved.len(), "distressed margin moved to insurance");
    }
    Ok(())
}

/// GTT orders leave the book once their time passes.
fn scenario_5_expiry(engine: &Engine, market: &MarketId) -> Result<(), EngineError> {
    info!("scenario 5: expiry");
    let gtt = limit("carol", Side::Buy, 900, 3).with_expiry(Timestamp::from_secs(60));
    let placed = engine.submit_order(market, gtt)?;
    info!(order_id = %placed.confirmation.order.id, "gtt resting");

    let tick = engine.on_chain_time_update(Timestamp::from_secs(60))?;
    info!(expired = tick.expired.len(), "time advanced");
    Ok(())
}

/// Close out against the final price and sweep the market.
fn scenario_6_final_settlement(engine: &Engine, market: &MarketId, usd: &Asset) -> Result<(), EngineError> {
    info!("scenario 6: final settlement");
    let before = engine.total_balance(usd);
    engine.on_chain_time_update(Timestamp::from_secs(3_600))?;
    engine.set_settlement_price(market, Price::new_unchecked(1_200))?;
    let result = engine.settle_market(market, Timestamp::from_secs(3_600))?;
    info!(
        transfers = result.settlement.len(),
        cleared = result.cleared.len(),
        cancelled = result.cancelled_orders.len(),
        "market settled"
    );
    for name in ["alice", "bob", "carol", "dave", "eve"] {
        info!(party = name, general = engine.general_balance(&party(name), usd), "final balance");
    }
    info!(
        before = before as u64,
        after = engine.total_balance(usd) as u64,
        events = engine.events().len(),
        "balance conserved"
    );
    Ok(())
}
