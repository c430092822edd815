//! The reconciliation pass.
//!
//! Broker truth is fetched first and any truth-fetch failure aborts the pass
//! with no mutation: deciding against unknown ground truth is unsafe. A
//! single-trade lookup failure degrades only that trade. All mutations from
//! one pass persist as a single ledger write.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use tracing::{error, info, warn};

use tradeloop_core::api::{BrokerOrder, BrokerPosition, Brokerage, FillActivity};
use tradeloop_core::coord::{CoordStore, Lease};
use tradeloop_core::store::LedgerStore;
use tradeloop_core::types::{RunResult, Side, Trade, TradeStatus};
use tradeloop_core::Result;

use crate::legs;
use crate::pnl::{realized_pnl, realized_r};

/// Configuration for the reconciliation loop.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// TTL of the run-level lock; one pass must be the sole active owner of
    /// OPEN -> CLOSED transitions.
    pub run_lock_ttl: StdDuration,
    /// Wall-clock budget for one pass.
    pub time_budget: StdDuration,
    /// Stop admitting new trades when this little budget remains.
    pub soft_stop_margin: StdDuration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            run_lock_ttl: StdDuration::from_secs(120),
            time_budget: StdDuration::from_secs(55),
            soft_stop_margin: StdDuration::from_secs(5),
        }
    }
}

impl ReconcileConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            run_lock_ttl: std::env::var("RECONCILE_LOCK_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(StdDuration::from_secs)
                .unwrap_or(defaults.run_lock_ttl),
            time_budget: std::env::var("RECONCILE_TIME_BUDGET_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(StdDuration::from_millis)
                .unwrap_or(defaults.time_budget),
            soft_stop_margin: std::env::var("RECONCILE_SOFT_STOP_MARGIN_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(StdDuration::from_millis)
                .unwrap_or(defaults.soft_stop_margin),
        }
    }
}

/// Per-invocation options from the trigger request.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Cap on trades examined this pass; the rest wait for the next one.
    pub limit: Option<usize>,
    /// Wall-clock budget override in milliseconds.
    pub budget_ms: Option<u64>,
    /// Compute and report mutations without persisting them.
    pub dry_run: bool,
}

/// The broker reconciliation engine.
pub struct Reconciler {
    ledger: Arc<dyn LedgerStore>,
    broker: Arc<dyn Brokerage>,
    coord: Arc<dyn CoordStore>,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        broker: Arc<dyn Brokerage>,
        coord: Arc<dyn CoordStore>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            ledger,
            broker,
            coord,
            config,
        }
    }

    /// Run one reconciliation pass.
    pub async fn run(&self, opts: ReconcileOptions) -> RunResult {
        let started = Instant::now();
        let mut result = RunResult::new("reconcile");

        let lease = match Lease::acquire(
            self.coord.clone(),
            "reconcile:run",
            self.config.run_lock_ttl,
        )
        .await
        {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                result.note("already_running");
                result.elapsed_ms = started.elapsed().as_millis() as u64;
                return result;
            }
            Err(e) => {
                result.elapsed_ms = started.elapsed().as_millis() as u64;
                return result.fail(format!("lock acquire failed: {e}"));
            }
        };

        if let Err(e) = self.run_inner(&opts, started, &mut result).await {
            error!(error = %e, "Reconciliation pass aborted");
            result.ok = false;
            result.note(format!("aborted: {e}"));
        }
        if let Err(e) = lease.release().await {
            warn!(error = %e, "Run lock release failed; TTL will expire it");
        }
        result.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            processed = result.processed,
            closed = result.closed,
            synced = result.synced,
            backfilled = result.backfilled,
            elapsed_ms = result.elapsed_ms,
            "Reconciliation pass finished"
        );
        result
    }

    async fn run_inner(
        &self,
        opts: &ReconcileOptions,
        started: Instant,
        result: &mut RunResult,
    ) -> Result<()> {
        let budget = opts
            .budget_ms
            .map(StdDuration::from_millis)
            .unwrap_or(self.config.time_budget);
        let deadline = started + budget;

        // Broker truth first; any failure here aborts before mutation.
        let open_orders = self.broker.list_open_orders(None).await?;
        let positions = self.broker.list_positions().await?;
        let mut trades = self.ledger.read_trades().await?;

        let now = Utc::now();
        let mut mutated = false;

        // Tickers the ledger already tracks as live exposure, captured before
        // this pass mutates anything. Stop-less positions flagged on an
        // earlier pass count as tracked so they are not re-synthesized.
        let tracked: HashSet<String> = trades
            .iter()
            .filter(|t| represents_exposure(t))
            .map(|t| t.ticker.clone())
            .collect();

        for idx in 0..trades.len() {
            if !represents_exposure(&trades[idx]) {
                continue;
            }
            if opts.limit.is_some_and(|limit| result.processed >= limit) {
                result.note("limit reached, remaining trades wait for the next pass");
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining <= self.config.soft_stop_margin {
                result.note("soft_stop: budget nearly exhausted");
                break;
            }
            let ticker = trades[idx].ticker.clone();

            if trades[idx].status == TradeStatus::Error {
                // A position previously flagged missing_stop_price: re-check
                // against broker truth so a stop that has since appeared
                // re-opens it. Without a position there is nothing to repair.
                if let Some(pos) = positions.iter().find(|p| p.ticker == ticker) {
                    result.processed += 1;
                    mutated |= sync_with_position(&mut trades[idx], pos, &open_orders, result);
                }
                continue;
            }
            result.processed += 1;

            // Three existence signals.
            let position = positions.iter().find(|p| p.ticker == ticker);
            let linked_order = trades[idx]
                .broker_order_id
                .as_ref()
                .and_then(|id| open_orders.iter().find(|o| &o.id == id));
            let any_ticker_order = open_orders.iter().any(|o| o.ticker == ticker);

            if let Some(pos) = position {
                mutated |= sync_with_position(&mut trades[idx], pos, &open_orders, result);
            } else if let Some(order) = linked_order {
                mutated |= mirror_status(&mut trades[idx], order, result);
            } else if any_ticker_order {
                // Some order for the ticker is still working but it is not the
                // one we recorded; not stale, leave for the next pass.
                result.note(format!("{ticker}: unlinked open order at broker, left as-is"));
            } else {
                // All three absent: resolve definitively.
                match self.resolve_stale(&mut trades[idx], now, result).await {
                    Ok(changed) => mutated |= changed,
                    Err(e) => {
                        warn!(ticker = %ticker, error = %e, "Single-trade lookup failed, degrading");
                        result.note(format!("{ticker}: lookup failed: {e}"));
                    }
                }
            }
        }

        for pos in &positions {
            if tracked.contains(&pos.ticker) {
                continue;
            }
            trades.push(synthesize_trade(pos, &open_orders, now, result));
            mutated = true;
        }

        if opts.dry_run {
            result.note("dry_run: mutations not persisted");
            return Ok(());
        }
        if mutated {
            self.ledger.write_trades(&trades).await?;
        }
        Ok(())
    }

    /// All three existence signals are absent. Look up the linked order and
    /// close the trade with a traceable reason, extracting the exit fill from
    /// nested legs or fill activities.
    async fn resolve_stale(
        &self,
        trade: &mut Trade,
        now: DateTime<Utc>,
        result: &mut RunResult,
    ) -> Result<bool> {
        let Some(order_id) = trade.broker_order_id.clone() else {
            trade.close("stale_untracked: no broker order id recorded", None, None, now);
            result.closed += 1;
            return Ok(true);
        };

        match self.broker.get_order(&order_id).await {
            Ok(order) => {
                if !order.is_terminal() {
                    // The open-orders listing missed it but the direct lookup
                    // says it is live; trust the direct lookup and mirror.
                    return Ok(mirror_status(trade, &order, result));
                }
                if let Some(fill) = legs::exit_fill(&order) {
                    close_with_fill(trade, fill.price, fill.qty, fill.via, now);
                    result.closed += 1;
                    return Ok(true);
                }
                // Terminal but no filled leg inline; fall back to activities.
                let ids = legs::leg_ids(&order);
                let activities = self.broker.list_fill_activities(&ids).await?;
                if let Some((price, qty)) = exit_from_activities(trade.side, &activities) {
                    close_with_fill(trade, price, Some(qty), "activity", now);
                } else {
                    trade.close(
                        format!(
                            "broker_terminal: order {order_id} status {}, legs {ids:?}, no fill activity",
                            order.status
                        ),
                        None,
                        None,
                        now,
                    );
                }
                result.closed += 1;
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                let mut ids = vec![order_id.clone()];
                ids.extend(trade.stop_order_id.iter().cloned());
                ids.extend(trade.take_profit_order_id.iter().cloned());
                let activities = self.broker.list_fill_activities(&ids).await?;
                if let Some((price, qty)) = exit_from_activities(trade.side, &activities) {
                    close_with_fill(trade, price, Some(qty), "activity", now);
                } else {
                    trade.close(
                        format!(
                            "order_vanished: order {order_id} legs {:?} lookup 404, no fill activity",
                            &ids[1..]
                        ),
                        None,
                        None,
                        now,
                    );
                }
                result.closed += 1;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }
}

/// Mirror the broker's order status onto the trade. Returns true on change.
fn mirror_status(trade: &mut Trade, order: &BrokerOrder, result: &mut RunResult) -> bool {
    if trade.broker_status.as_deref() == Some(order.status.as_str()) {
        return false;
    }
    trade.broker_status = Some(order.status.clone());
    result.synced += 1;
    true
}

/// A live position exists: broker truth overrides unconditionally.
fn sync_with_position(
    trade: &mut Trade,
    pos: &BrokerPosition,
    open_orders: &[BrokerOrder],
    result: &mut RunResult,
) -> bool {
    let mut changed = false;

    if trade.entry_price.is_none() && pos.avg_entry_price.is_some() {
        trade.entry_price = pos.avg_entry_price;
        changed = true;
    }
    if trade.quantity == 0 {
        trade.quantity = pos.qty.abs().to_i64().unwrap_or(0);
        changed = true;
    }
    if trade.stop_price.is_none() {
        if let Some(stop) = find_stop_order(open_orders, &trade.ticker) {
            trade.stop_price = stop.stop_price;
            trade.stop_order_id = Some(stop.id.clone());
            changed = true;
        } else {
            // An unprotected live position must never read as healthy. The
            // flag is only written once so repeated passes over an unchanged
            // broker state stay mutation-free.
            if !flagged_missing_stop(trade) {
                trade.mark_error("missing_stop_price: live position has no stop order");
                result.errored += 1;
                changed = true;
            }
            if changed {
                result.synced += 1;
            }
            return changed;
        }
    }

    // A stop is known: force OPEN and clear stale close/error fields.
    if trade.status != TradeStatus::Open {
        trade.status = TradeStatus::Open;
        changed = true;
    }
    if trade.close_reason.is_some() || trade.error.is_some() {
        trade.close_reason = None;
        trade.error = None;
        changed = true;
    }
    if changed {
        result.synced += 1;
    }
    changed
}

fn flagged_missing_stop(trade: &Trade) -> bool {
    trade.status == TradeStatus::Error
        && trade
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("missing_stop_price"))
}

/// Trades that stand for real or suspected broker exposure: everything OPEN
/// plus positions flagged unprotected on an earlier pass.
fn represents_exposure(trade: &Trade) -> bool {
    trade.status == TradeStatus::Open || flagged_missing_stop(trade)
}

/// Represent a broker position absent from the local OPEN set. The ledger
/// must never under-report real exposure.
fn synthesize_trade(
    pos: &BrokerPosition,
    open_orders: &[BrokerOrder],
    now: DateTime<Utc>,
    result: &mut RunResult,
) -> Trade {
    let mut trade = Trade::new(&pos.ticker, pos.direction(), "reconcile_backfill");
    trade.status = TradeStatus::Open;
    trade.entry_price = pos.avg_entry_price;
    trade.quantity = pos.qty.abs().to_i64().unwrap_or(0);
    trade.opened_at = Some(now);
    trade.session = Some(now.format("%Y-%m-%d").to_string());

    if let Some(stop) = find_stop_order(open_orders, &pos.ticker) {
        trade.stop_price = stop.stop_price;
        trade.stop_order_id = Some(stop.id.clone());
        info!(ticker = %pos.ticker, "Backfilled untracked broker position");
    } else {
        trade.mark_error("missing_stop_price: untracked position has no stop order");
        warn!(ticker = %pos.ticker, "Untracked position backfilled without a stop");
        result.errored += 1;
    }
    result.backfilled += 1;
    trade
}

fn find_stop_order<'a>(open_orders: &'a [BrokerOrder], ticker: &str) -> Option<&'a BrokerOrder> {
    open_orders
        .iter()
        .find(|o| o.ticker == ticker && o.is_stop_type() && o.stop_price.is_some())
}

fn close_with_fill(
    trade: &mut Trade,
    exit_price: Decimal,
    exit_qty: Option<Decimal>,
    via: &str,
    now: DateTime<Utc>,
) {
    let qty = exit_qty.unwrap_or_else(|| Decimal::from(trade.quantity));
    let (pnl, r) = match trade.entry_price {
        Some(entry) => {
            let pnl = realized_pnl(trade.side, entry, exit_price, qty);
            let r = realized_r(pnl, entry, trade.stop_price, qty);
            (Some(pnl), r)
        }
        None => (None, None),
    };
    trade.close(format!("{via}_filled at {exit_price}"), pnl, r, now);
}

/// Quantity-weighted exit price from fill activities on the exit side.
fn exit_from_activities(side: Side, activities: &[FillActivity]) -> Option<(Decimal, Decimal)> {
    let exit_side = match side {
        Side::Long => "sell",
        Side::Short => "buy",
    };
    let fills: Vec<&FillActivity> = activities
        .iter()
        .filter(|f| f.side.eq_ignore_ascii_case(exit_side))
        .collect();
    let qty: Decimal = fills.iter().map(|f| f.qty).sum();
    if qty.is_zero() {
        return None;
    }
    let notional: Decimal = fills.iter().map(|f| f.price * f.qty).sum();
    Some((notional / qty, qty))
}
