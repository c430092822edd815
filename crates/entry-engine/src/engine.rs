//! The auto-entry run loop.
//!
//! Contract: place at most the orders implied by eligible, deduplicated
//! AUTO_PENDING trades per run — one per ticker — honoring admission limits
//! and never double-submitting a logical order.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use tracing::{error, info, warn};

use tradeloop_core::api::{BracketLegs, BracketOrderRequest, Brokerage, ScoreCandidate, ScoringModel};
use tradeloop_core::coord::{CoordStore, Lease};
use tradeloop_core::store::LedgerStore;
use tradeloop_core::types::{AiMeta, RiskTier, RunResult, Trade, TradeStatus};
use tradeloop_core::Result;

use crate::bracket::compute_bracket;
use crate::gates::GateReport;
use crate::sizing::size_position;

/// Configuration for the auto-entry engine.
#[derive(Debug, Clone)]
pub struct EntryConfig {
    pub trading_enabled: bool,
    /// Whether this deployment points at a live (non-paper) account.
    pub live_trading: bool,
    /// Operator permission to trade the live account.
    pub allow_live: bool,
    pub max_daily_entries: i64,
    pub max_open_positions: usize,
    /// Candidates older than this are expired, not entered.
    pub max_candidate_age: Duration,
    /// Accept candidates tagged with an earlier session.
    pub allow_cross_session: bool,
    /// Rescore candidates whose score is older than this before entry.
    pub rescore_after: Duration,
    pub rescore_threshold: f64,
    pub rescore_timeout: StdDuration,
    /// Reward:risk multiple for the take-profit leg.
    pub rr_multiple: Decimal,
    pub tick_size: Decimal,
    /// Base dollar risk per trade before the tier multiplier.
    pub base_risk: Decimal,
    /// TTL of the per-trade submission lock.
    pub lock_ttl: StdDuration,
    /// Wall-clock budget for one run.
    pub time_budget: StdDuration,
    /// Stop admitting new candidates when this little budget remains.
    pub soft_stop_margin: StdDuration,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            trading_enabled: true,
            live_trading: false,
            allow_live: false,
            max_daily_entries: 10,
            max_open_positions: 5,
            max_candidate_age: Duration::hours(4),
            allow_cross_session: false,
            rescore_after: Duration::minutes(45),
            rescore_threshold: 7.0,
            rescore_timeout: StdDuration::from_secs(20),
            rr_multiple: Decimal::TWO,
            tick_size: Decimal::new(1, 2), // 0.01
            base_risk: Decimal::new(100, 0),
            lock_ttl: StdDuration::from_secs(60),
            time_budget: StdDuration::from_secs(55),
            soft_stop_margin: StdDuration::from_secs(5),
        }
    }
}

impl EntryConfig {
    /// Create config from environment variables with sane defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            trading_enabled: std::env::var("ENTRY_TRADING_ENABLED")
                .map(|v| v != "false")
                .unwrap_or(defaults.trading_enabled),
            live_trading: std::env::var("ENTRY_LIVE_TRADING")
                .map(|v| v == "true")
                .unwrap_or(defaults.live_trading),
            allow_live: std::env::var("ENTRY_ALLOW_LIVE")
                .map(|v| v == "true")
                .unwrap_or(defaults.allow_live),
            max_daily_entries: std::env::var("ENTRY_MAX_DAILY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_daily_entries),
            max_open_positions: std::env::var("ENTRY_MAX_OPEN_POSITIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_open_positions),
            max_candidate_age: std::env::var("ENTRY_MAX_AGE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::seconds)
                .unwrap_or(defaults.max_candidate_age),
            allow_cross_session: std::env::var("ENTRY_ALLOW_CROSS_SESSION")
                .map(|v| v == "true")
                .unwrap_or(defaults.allow_cross_session),
            rescore_after: std::env::var("ENTRY_RESCORE_AFTER_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::seconds)
                .unwrap_or(defaults.rescore_after),
            rescore_threshold: std::env::var("ENTRY_RESCORE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rescore_threshold),
            rescore_timeout: defaults.rescore_timeout,
            rr_multiple: std::env::var("ENTRY_RR_MULTIPLE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rr_multiple),
            tick_size: std::env::var("ENTRY_TICK_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.tick_size),
            base_risk: std::env::var("ENTRY_BASE_RISK")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.base_risk),
            lock_ttl: defaults.lock_ttl,
            time_budget: std::env::var("ENTRY_TIME_BUDGET_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(StdDuration::from_millis)
                .unwrap_or(defaults.time_budget),
            soft_stop_margin: std::env::var("ENTRY_SOFT_STOP_MARGIN_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(StdDuration::from_millis)
                .unwrap_or(defaults.soft_stop_margin),
        }
    }
}

/// Per-invocation options from the trigger request.
#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    pub limit: Option<usize>,
    /// Wall-clock budget override in milliseconds.
    pub budget_ms: Option<u64>,
    /// Evaluate and report without submitting orders.
    pub dry_run: bool,
}

/// The auto-entry decision engine.
pub struct EntryEngine {
    ledger: Arc<dyn LedgerStore>,
    broker: Arc<dyn Brokerage>,
    scorer: Arc<dyn ScoringModel>,
    coord: Arc<dyn CoordStore>,
    config: EntryConfig,
}

impl EntryEngine {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        broker: Arc<dyn Brokerage>,
        scorer: Arc<dyn ScoringModel>,
        coord: Arc<dyn CoordStore>,
        config: EntryConfig,
    ) -> Self {
        Self {
            ledger,
            broker,
            scorer,
            coord,
            config,
        }
    }

    fn session_today() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    fn daily_key() -> String {
        format!("entries:{}", Self::session_today())
    }

    /// Run one entry invocation.
    pub async fn run(&self, opts: EntryOptions) -> RunResult {
        let started = Instant::now();
        let mut result = RunResult::new("auto_entry");
        if let Err(e) = self.run_inner(&opts, started, &mut result).await {
            error!(error = %e, "Auto-entry run aborted");
            result.ok = false;
            result.note(format!("aborted: {e}"));
        }
        result.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            processed = result.processed,
            submitted = result.submitted,
            skipped = result.skipped,
            errored = result.errored,
            elapsed_ms = result.elapsed_ms,
            "Auto-entry run finished"
        );
        result
    }

    async fn run_inner(
        &self,
        opts: &EntryOptions,
        started: Instant,
        result: &mut RunResult,
    ) -> Result<()> {
        let budget = opts
            .budget_ms
            .map(StdDuration::from_millis)
            .unwrap_or(self.config.time_budget);
        let deadline = started + budget;

        // Ledger read failure is fatal.
        let mut trades = self.ledger.read_trades().await?;

        let gates = self.evaluate_gates(&trades).await?;
        result.note(gates.summary());
        if let Some(blocked) = gates.blocking_gate() {
            result.note(blocked);
            return Ok(());
        }

        // One canonical candidate per ticker: the newest AUTO_PENDING wins,
        // older duplicates are skipped this run.
        let mut by_ticker: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, trade) in trades.iter().enumerate() {
            if trade.status == TradeStatus::AutoPending {
                by_ticker.entry(trade.ticker.clone()).or_default().push(idx);
            }
        }
        let mut canonical: Vec<usize> = Vec::new();
        for indices in by_ticker.values() {
            let Some(&newest) = indices.iter().max_by_key(|&&i| trades[i].created_at) else {
                continue;
            };
            canonical.push(newest);
            let dupes = indices.len() - 1;
            if dupes > 0 {
                result.skipped += dupes;
                result.note(format!(
                    "{}: {dupes} duplicate candidate(s) superseded",
                    trades[newest].ticker
                ));
            }
        }
        // Deterministic order for tests and logs.
        canonical.sort_by_key(|&i| trades[i].created_at);
        if let Some(limit) = opts.limit {
            canonical.truncate(limit);
        }

        if canonical.is_empty() {
            result.note("nothing_to_do");
            return Ok(());
        }

        let open_tickers: Vec<String> = trades
            .iter()
            .filter(|t| t.status == TradeStatus::Open)
            .map(|t| t.ticker.clone())
            .collect();

        let mut mutated = false;
        for idx in canonical {
            // Each candidate can cost a quote, a rescore, and a submission
            // round-trip; stop admitting once the budget is nearly spent.
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining <= self.config.soft_stop_margin {
                result.note("soft_stop: budget nearly exhausted");
                break;
            }
            result.processed += 1;
            let snapshot = trades[idx].clone();

            if open_tickers.contains(&snapshot.ticker) {
                result.skipped += 1;
                result.note(format!("{}: position already open", snapshot.ticker));
                continue;
            }

            match self.enter_one(&mut trades[idx], opts.dry_run, result).await? {
                CandidateOutcome::Submitted => {
                    result.submitted += 1;
                    mutated = true;
                }
                CandidateOutcome::Skipped => result.skipped += 1,
                CandidateOutcome::Errored => {
                    result.errored += 1;
                    mutated = true;
                }
                CandidateOutcome::DailyCapExhausted => {
                    result.skipped += 1;
                    result.note("daily_entry_cap reached mid-run");
                    break;
                }
            }
        }

        if mutated {
            self.ledger.write_trades(&trades).await?;
        }
        Ok(())
    }

    async fn evaluate_gates(&self, trades: &[Trade]) -> Result<GateReport> {
        // Broker clock failure aborts: entries against an unknown session are
        // unsafe.
        let clock = self.broker.clock().await?;
        let daily_entries = self.coord.counter(&Self::daily_key()).await?;
        let open_positions = trades
            .iter()
            .filter(|t| t.status == TradeStatus::Open)
            .count();
        Ok(GateReport {
            trading_enabled: self.config.trading_enabled,
            live_permitted: !self.config.live_trading || self.config.allow_live,
            market_open: clock.is_open,
            daily_entries,
            daily_entry_cap: self.config.max_daily_entries,
            open_positions,
            open_position_cap: self.config.max_open_positions,
        })
    }

    async fn enter_one(
        &self,
        trade: &mut Trade,
        dry_run: bool,
        result: &mut RunResult,
    ) -> Result<CandidateOutcome> {
        let now = Utc::now();

        // Eligibility: age bound, session tag, stale-score rescore.
        if now - trade.created_at > self.config.max_candidate_age {
            trade.mark_error("expired: candidate exceeded max age");
            return Ok(CandidateOutcome::Errored);
        }
        if !self.config.allow_cross_session {
            let today = Self::session_today();
            if trade.session.as_deref() != Some(today.as_str()) {
                trade.mark_error(format!(
                    "cross_session: tagged {:?}, today is {today}",
                    trade.session
                ));
                return Ok(CandidateOutcome::Errored);
            }
        }
        let (entry, stop) = match (trade.entry_price, trade.stop_price) {
            (Some(entry), Some(stop)) if trade.prices_are_sane() => (entry, stop),
            _ => {
                trade.mark_error("invalid_prices: directional sanity failed");
                return Ok(CandidateOutcome::Errored);
            }
        };
        if now - trade.created_at > self.config.rescore_after {
            if !self.rescore(trade).await {
                return Ok(CandidateOutcome::Errored);
            }
        }

        // Exclusive per-trade lock before any broker call. A held lock means
        // a concurrent invocation owns this trade.
        let lock_key = format!("entry:{}", trade.id);
        let Some(lease) =
            Lease::acquire(self.coord.clone(), lock_key, self.config.lock_ttl).await?
        else {
            result.note(format!("{}: already_locked", trade.ticker));
            return Ok(CandidateOutcome::Skipped);
        };

        // Atomic daily admission: increment, then hand back on any non-entry
        // path so unused admissions do not consume the cap.
        let admitted = self
            .coord
            .incr_with_window(&Self::daily_key(), StdDuration::from_secs(36 * 3600))
            .await?;
        if admitted > self.config.max_daily_entries {
            self.coord.decr(&Self::daily_key()).await?;
            lease.release().await?;
            return Ok(CandidateOutcome::DailyCapExhausted);
        }

        let outcome = self.price_and_submit(trade, entry, stop, dry_run, result).await;
        match &outcome {
            Ok(CandidateOutcome::Submitted) => {}
            _ => {
                // Order not placed; return the admission.
                self.coord.decr(&Self::daily_key()).await?;
            }
        }
        lease.release().await?;
        outcome
    }

    async fn price_and_submit(
        &self,
        trade: &mut Trade,
        entry: Decimal,
        stop: Decimal,
        dry_run: bool,
        result: &mut RunResult,
    ) -> Result<CandidateOutcome> {
        // Decision price: bid/ask mid, then last trade, then the seed entry.
        let quote = match self.broker.latest_quote(&trade.ticker).await {
            Ok(q) => q,
            Err(e) => {
                warn!(ticker = %trade.ticker, error = %e, "Quote fetch failed, using seed price");
                Default::default()
            }
        };
        let decision_price = quote.decision_price().unwrap_or(entry);

        let bracket = match compute_bracket(
            trade.side,
            decision_price,
            entry,
            stop,
            self.config.rr_multiple,
            self.config.tick_size,
        ) {
            Ok(b) => b,
            Err(e) => {
                trade.mark_error(format!("invalid_prices: {e}"));
                return Ok(CandidateOutcome::Errored);
            }
        };

        let score = trade.ai.as_ref().map(|ai| ai.score).unwrap_or(0.0);
        let sizing = match size_position(score, self.config.base_risk, bracket.entry, bracket.stop)
        {
            Ok(s) => s,
            Err(e) => {
                trade.mark_error(format!("invalid_prices: {e}"));
                return Ok(CandidateOutcome::Errored);
            }
        };

        if dry_run {
            result.note(format!(
                "dry_run: would submit {} {:?} qty {} entry {} stop {} tp {}",
                trade.ticker, trade.side, sizing.quantity, bracket.entry, bracket.stop,
                bracket.take_profit
            ));
            return Ok(CandidateOutcome::Skipped);
        }

        let request = BracketOrderRequest {
            ticker: trade.ticker.clone(),
            side: trade.side,
            quantity: sizing.quantity,
            limit_price: bracket.entry,
            legs: BracketLegs {
                take_profit_limit: bracket.take_profit,
                stop_loss_stop: bracket.stop,
            },
            client_order_id: format!("tl-{}", trade.id),
        };

        match self.broker.place_bracket_order(&request).await {
            Ok(order) => {
                trade.status = TradeStatus::Open;
                trade.opened_at = Some(Utc::now());
                trade.broker_status = Some(order.status.clone());
                trade.entry_price = Some(bracket.entry);
                trade.stop_price = Some(bracket.stop);
                trade.target_price = Some(bracket.take_profit);
                trade.quantity = sizing.quantity;
                trade.ai = Some(AiMeta {
                    score,
                    tier: sizing.tier,
                    risk_mult: sizing.risk_mult,
                });
                for leg in order.legs.as_deref().unwrap_or_default() {
                    if leg.is_stop_type() {
                        trade.stop_order_id = Some(leg.id.clone());
                    } else {
                        trade.take_profit_order_id = Some(leg.id.clone());
                    }
                }
                trade.broker_order_id = Some(order.id);
                info!(
                    ticker = %trade.ticker,
                    trade_id = %trade.id,
                    qty = sizing.quantity,
                    tier = ?sizing.tier,
                    "Bracket order placed, trade OPEN"
                );
                Ok(CandidateOutcome::Submitted)
            }
            Err(e) => {
                // No silent retry within this run; the reconciliation loop
                // owns repair on the next pass.
                trade.mark_error(format!("broker_rejected: {e}"));
                result.note(format!("{}: broker_rejected: {e}", trade.ticker));
                Ok(CandidateOutcome::Errored)
            }
        }
    }

    /// Refresh a stale score. Returns false when the candidate must be
    /// removed: stale data never passes.
    async fn rescore(&self, trade: &mut Trade) -> bool {
        let candidate = ScoreCandidate {
            ticker: trade.ticker.clone(),
            side: Some(trade.side),
            entry_price: trade.entry_price,
            stop_price: trade.stop_price,
            target_price: trade.target_price,
            timeframe: None,
            context: format!("rescore before entry, original tier {:?}", trade.ai),
        };
        match self
            .scorer
            .score(&candidate, self.config.rescore_timeout)
            .await
        {
            Ok(evaluation) => {
                let fresh = evaluation.side(trade.side).score;
                if fresh < self.config.rescore_threshold {
                    trade.mark_error(format!(
                        "rescore_disqualified: fresh score {fresh:.1} below threshold"
                    ));
                    return false;
                }
                let tier = RiskTier::from_score(fresh);
                trade.ai = Some(AiMeta {
                    score: fresh,
                    tier,
                    risk_mult: tier.risk_mult(),
                });
                true
            }
            Err(e) => {
                trade.mark_error(format!("stale_rescore_failed: {e}"));
                false
            }
        }
    }
}

enum CandidateOutcome {
    Submitted,
    Skipped,
    Errored,
    DailyCapExhausted,
}
