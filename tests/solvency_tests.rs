//! Solvency invariant tests.
//!
//! Money is only ever moved between accounts: no sequence of orders,
//! marks or settlements may create or destroy it, and winners are never
//! paid more than losers (and insurance) put in.

use derivs_core::collateral::account::{insurance_id, margin_id, settlement_id};
use derivs_core::transfer::FinancialAmount;
use derivs_core::*;
use proptest::prelude::*;

fn usd() -> Asset {
    Asset::from("USD")
}

const PARTIES: [&str; 4] = ["p0", "p1", "p2", "p3"];

// (party index, buy?, price, size)
fn order_strategy() -> impl Strategy<Value = (usize, bool, u64, u64)> {
    (0..PARTIES.len(), any::<bool>(), 90u64..=110, 1u64..=20)
}

proptest! {
    /// Total balance of the asset is constant across any order flow and final settlement.
    #[test]
    fn order_flow_conserves_money(
        deposits in proptest::collection::vec(0u64..5_000, PARTIES.len()),
        insurance in 0u64..2_000,
        orders in proptest::collection::vec(order_strategy(), 1..40),
        final_price in 80u64..=120,
    ) {
        let engine = Engine::new(CoreConfig::default()).unwrap();
        let config = engine
            .market_config("SOLV", usd(), Timestamp::from_secs(1_000))
            .with_insurance(insurance);
        let market = engine.add_market(config).unwrap();
        for (name, amount) in PARTIES.iter().zip(&deposits) {
            engine.deposit(&PartyId::from(*name), &usd(), *amount).unwrap();
        }
        let total = engine.total_balance(&usd());

        for (who, buy, price, size) in orders {
            let side = if buy { Side::Buy } else { Side::Sell };
            let submission = OrderSubmission::limit(
                PartyId::from(PARTIES[who]),
                side,
                Price::new_unchecked(price),
                size,
                TimeInForce::GTC,
            );
            let _ = engine.submit_order(&market, submission);
            prop_assert_eq!(engine.total_balance(&usd()), total);
        }

        let _ = engine.mark_to_market(&market);
        prop_assert_eq!(engine.total_balance(&usd()), total);

        engine.set_settlement_price(&market, Price::new_unchecked(final_price)).unwrap();
        engine.settle_market(&market, Timestamp::from_secs(1_000)).unwrap();
        prop_assert_eq!(engine.total_balance(&usd()), total);

        // nothing is left parked in the closed market except insurance
        for name in PARTIES {
            prop_assert_eq!(engine.margin_balance(&market, &PartyId::from(name), &usd()), 0);
        }
        let parked = engine
            .with_collateral(|c| c.balance_of(&settlement_id(&market, &usd())))
            .unwrap();
        prop_assert_eq!(parked, 0);
    }

    /// Net open interest stays zero: every unit bought was sold by someone.
    #[test]
    fn positions_always_net_to_zero(
        orders in proptest::collection::vec(order_strategy(), 1..40),
    ) {
        let engine = Engine::new(CoreConfig::default()).unwrap();
        let market = engine
            .add_market(engine.market_config("OI", usd(), Timestamp::from_secs(1_000)))
            .unwrap();
        for name in PARTIES {
            engine.deposit(&PartyId::from(name), &usd(), 1_000_000).unwrap();
        }
        for (who, buy, price, size) in orders {
            let side = if buy { Side::Buy } else { Side::Sell };
            let submission = OrderSubmission::limit(
                PartyId::from(PARTIES[who]),
                side,
                Price::new_unchecked(price),
                size,
                TimeInForce::GTC,
            );
            engine.submit_order(&market, submission).unwrap();
        }
        let net: i64 = engine.positions(&market).unwrap().iter().map(|p| p.size).sum();
        prop_assert_eq!(net, 0);
    }

    /// One zero-sum batch: wins paid never exceed losses collected, and the
    /// settlement account never goes negative.
    #[test]
    fn wins_never_exceed_collected_losses(
        balances in proptest::collection::vec((0u64..500, 0u64..500), 2..6),
        amounts in proptest::collection::vec(-300i64..300, 1..5),
        insurance in 0u64..500,
    ) {
        let market = MarketId::from("m");
        let mut collateral = CollateralEngine::new(CollateralConfig::default());
        collateral.create_market_accounts(&market, &usd(), insurance).unwrap();

        let parties: Vec<PartyId> = (0..balances.len()).map(|i| PartyId::new(format!("t{i}"))).collect();
        for (party, (margin, general)) in parties.iter().zip(&balances) {
            collateral.create_trader_accounts(party, &usd());
            let margin_acc = collateral.add_trader_to_market(&market, party, &usd()).unwrap();
            collateral.increment_balance(&margin_acc, *margin as i64).unwrap();
            collateral.deposit(party, &usd(), *general).unwrap();
        }

        // one extra share balances the others so the batch sums to zero
        let mut shares: Vec<i64> = amounts.iter().take(parties.len() - 1).copied().collect();
        shares.push(-shares.iter().sum::<i64>());
        let transfers: Vec<Transfer> = parties
            .iter()
            .zip(&shares)
            .filter(|(_, amount)| **amount != 0)
            .map(|(party, amount)| {
                let kind = if *amount < 0 { TransferType::MtmLoss } else { TransferType::MtmWin };
                Transfer::new(party.clone(), kind, FinancialAmount::new(usd(), *amount))
            })
            .collect();

        let total = collateral.total_balance(&usd());
        let generals: Vec<u64> = parties.iter().map(|p| collateral.general_balance(p, &usd())).collect();
        let responses = collateral.transfer(&market, &transfers).unwrap();

        let collected: u64 = responses.iter().filter(|r| r.transfer_type.is_loss()).map(|r| r.moved()).sum();
        let paid: u64 = responses.iter().filter(|r| r.transfer_type.is_win()).map(|r| r.moved()).sum();
        prop_assert!(paid <= collected, "paid {} > collected {}", paid, collected);
        prop_assert_eq!(collateral.total_balance(&usd()), total);

        // losses never reach into the general account, and margin only ever shrinks
        for (((party, (margin_before, _)), general_before), share) in
            parties.iter().zip(&balances).zip(&generals).zip(&shares)
        {
            if *share <= 0 {
                prop_assert_eq!(collateral.general_balance(party, &usd()), *general_before);
            }
            let margin = collateral.balance_of(&margin_id(&market, party, &usd())).unwrap();
            prop_assert!(margin <= *margin_before);
        }
        let ins = collateral.balance_of(&insurance_id(&market, &usd())).unwrap();
        let settle = collateral.balance_of(&settlement_id(&market, &usd())).unwrap();
        // whatever insurance covered on the loss side is the only slack
        prop_assert!(settle + ins + paid <= insurance + collected);
    }
}
