//! End-to-end lifecycle over in-memory stores: a pending signal is scored,
//! its trade is entered as a bracket order, and reconciliation closes it when
//! the broker reports the stop leg filled.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use entry_engine::{EntryConfig, EntryEngine, EntryOptions};
use reconciler::{ReconcileConfig, ReconcileOptions, Reconciler};
use scoring_drain::{BreakerConfig, Drain, DrainConfig, DrainOptions, ScoringBreaker};
use tradeloop_core::api::broker::MockBrokerage;
use tradeloop_core::api::scoring::MockScoringModel;
use tradeloop_core::api::{BrokerOrder, Evaluation, MarketClock, Quote, SideEval};
use tradeloop_core::coord::{CoordStore, MemoryCoord};
use tradeloop_core::store::{LedgerStore, MemoryLedger};
use tradeloop_core::types::{
    AiMeta, RiskTier, Side, Signal, SignalStatus, Trade, TradeStatus,
};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn strong_long_eval() -> Evaluation {
    Evaluation {
        long: SideEval {
            score: 8.4,
            grade: "A".to_string(),
            summary: "clean breakout with volume".to_string(),
        },
        short: SideEval {
            score: 2.1,
            grade: "F".to_string(),
            summary: String::new(),
        },
        qualified: Some(true),
    }
}

fn bracket_order_ack() -> BrokerOrder {
    serde_json::from_value(serde_json::json!({
        "id": "ord-1",
        "symbol": "AAPL",
        "type": "limit",
        "status": "accepted",
        "side": "buy",
        "legs": [
            {"id": "tp-1", "symbol": "AAPL", "type": "limit", "status": "held", "side": "sell"},
            {"id": "sl-1", "symbol": "AAPL", "type": "stop", "status": "held", "side": "sell"}
        ]
    }))
    .unwrap()
}

fn stopped_out_order() -> BrokerOrder {
    serde_json::from_value(serde_json::json!({
        "id": "ord-1",
        "symbol": "AAPL",
        "type": "limit",
        "status": "filled",
        "side": "buy",
        "legs": [
            {"id": "tp-1", "symbol": "AAPL", "type": "limit", "status": "canceled", "side": "sell"},
            {"id": "sl-1", "symbol": "AAPL", "type": "stop", "status": "filled", "side": "sell",
             "filled_avg_price": "95", "filled_qty": "30"}
        ]
    }))
    .unwrap()
}

#[tokio::test]
async fn signal_is_scored_entered_and_reconciled_closed() {
    let ledger: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::new());
    let coord: Arc<dyn CoordStore> = Arc::new(MemoryCoord::new());

    let mut scorer = MockScoringModel::new();
    scorer.expect_score().returning(|_, _| Ok(strong_long_eval()));
    let scorer = Arc::new(scorer);

    // Phase 1: the drain scores a pending long signal.
    let mut signal = Signal::new("AAPL", "scanner");
    signal.side = Some(Side::Long);
    signal.entry_price = Some(dec("100"));
    signal.stop_price = Some(dec("95"));
    ledger.write_signals(&[signal.clone()]).await.unwrap();

    let drain = Drain::new(
        ledger.clone(),
        scorer.clone(),
        ScoringBreaker::new(coord.clone(), BreakerConfig::default()),
        DrainConfig::default(),
    );
    let drained = drain.run(DrainOptions::default()).await;
    assert!(drained.ok);
    assert_eq!(drained.scored, 1);

    let signals = ledger.read_signals().await.unwrap();
    assert_eq!(signals[0].status, SignalStatus::Scored);
    assert_eq!(signals[0].ai_score, Some(8.4));
    assert_eq!(signals[0].qualified, Some(true));

    // Phase 2: a trade candidate derived from the scored signal is entered.
    let mut trade = Trade::new("AAPL", Side::Long, "auto");
    trade.signal_id = Some(signals[0].id);
    trade.entry_price = signals[0].entry_price;
    trade.stop_price = signals[0].stop_price;
    trade.session = Some(Utc::now().format("%Y-%m-%d").to_string());
    trade.ai = Some(AiMeta {
        score: 8.4,
        tier: RiskTier::A,
        risk_mult: dec("1.5"),
    });
    ledger.write_trades(&[trade]).await.unwrap();

    let mut broker = MockBrokerage::new();
    broker.expect_clock().returning(|| {
        Ok(MarketClock {
            is_open: true,
            next_open: None,
            next_close: None,
        })
    });
    broker
        .expect_latest_quote()
        .returning(|_| Ok(Quote::default()));
    broker
        .expect_place_bracket_order()
        .times(1)
        .returning(|_| Ok(bracket_order_ack()));
    // Phase 3 expectations: the position and orders are gone, the parent
    // order is terminal with a filled stop leg.
    broker.expect_list_open_orders().returning(|_| Ok(vec![]));
    broker.expect_list_positions().returning(|| Ok(vec![]));
    broker
        .expect_get_order()
        .returning(|_| Ok(stopped_out_order()));
    let broker = Arc::new(broker);

    let entry = EntryEngine::new(
        ledger.clone(),
        broker.clone(),
        scorer,
        coord.clone(),
        EntryConfig::default(),
    );
    let entered = entry.run(EntryOptions::default()).await;
    assert!(entered.ok);
    assert_eq!(entered.submitted, 1);

    let trades = ledger.read_trades().await.unwrap();
    assert_eq!(trades[0].status, TradeStatus::Open);
    assert_eq!(trades[0].broker_order_id.as_deref(), Some("ord-1"));
    assert_eq!(trades[0].stop_order_id.as_deref(), Some("sl-1"));
    // Tier A: floor($150 / $5 risk) = 30 shares.
    assert_eq!(trades[0].quantity, 30);

    // Phase 3: reconciliation closes the stopped-out trade with realized P&L.
    let reconciler = Reconciler::new(ledger.clone(), broker, coord, ReconcileConfig::default());
    let reconciled = reconciler.run(ReconcileOptions::default()).await;
    assert!(reconciled.ok);
    assert_eq!(reconciled.closed, 1);

    let trades = ledger.read_trades().await.unwrap();
    assert_eq!(trades[0].status, TradeStatus::Closed);
    assert_eq!(trades[0].realized_pnl, Some(dec("-150")));
    assert_eq!(trades[0].realized_r, Some(dec("-1.00")));
    assert!(trades[0]
        .close_reason
        .as_deref()
        .unwrap()
        .starts_with("stop_filled"));

    // A second pass with unchanged broker state mutates nothing.
    let again = reconciler.run(ReconcileOptions::default()).await;
    assert_eq!(again.closed, 0);
    assert_eq!(again.synced, 0);
    assert_eq!(again.backfilled, 0);
}
