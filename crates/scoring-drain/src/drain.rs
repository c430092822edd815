//! The scoring drain run loop.
//!
//! Contract: score up to N PENDING signals exactly once each per run. Claims
//! are published to the ledger before any scoring starts, so a concurrent
//! second invocation cannot select an already-claimed signal.

use chrono::{Duration, Utc};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use tradeloop_core::api::{ScoreCandidate, ScoreFailure, ScoringModel};
use tradeloop_core::store::LedgerStore;
use tradeloop_core::types::{RunResult, Signal, SignalStatus};
use tradeloop_core::Result;

use crate::breaker::ScoringBreaker;
use crate::qualify::{qualify, Qualification, QualifyConfig};
use crate::retry::RetryPolicy;

/// Configuration for the scoring drain.
#[derive(Debug, Clone)]
pub struct DrainConfig {
    /// Maximum signals claimed per run.
    pub batch_limit: usize,
    /// Fixed width of the worker pool.
    pub worker_width: usize,
    /// Wall-clock budget for one run.
    pub time_budget: StdDuration,
    /// Stop admitting new work when this little budget remains.
    pub soft_stop_margin: StdDuration,
    /// Per-call ceiling; each call races this against the remaining budget.
    pub call_timeout: StdDuration,
    /// Claim TTL mirrored onto `scoring_lock_until`.
    pub claim_ttl: Duration,
    /// A `Scoring` claim older than this is considered crashed and reclaimed.
    pub staleness_after: Duration,
    /// Newest-first selection only considers signals this recent.
    pub selection_window: Duration,
    pub qualify: QualifyConfig,
    pub retry: RetryPolicy,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            batch_limit: 25,
            worker_width: 4,
            time_budget: StdDuration::from_secs(55),
            soft_stop_margin: StdDuration::from_secs(8),
            call_timeout: StdDuration::from_secs(20),
            claim_ttl: Duration::seconds(90),
            staleness_after: Duration::minutes(10),
            selection_window: Duration::hours(24),
            qualify: QualifyConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl DrainConfig {
    /// Create config from environment variables with sane defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_limit: std::env::var("DRAIN_BATCH_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_limit),
            worker_width: std::env::var("DRAIN_WORKER_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.worker_width),
            time_budget: std::env::var("DRAIN_TIME_BUDGET_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(StdDuration::from_millis)
                .unwrap_or(defaults.time_budget),
            soft_stop_margin: std::env::var("DRAIN_SOFT_STOP_MARGIN_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(StdDuration::from_millis)
                .unwrap_or(defaults.soft_stop_margin),
            call_timeout: std::env::var("DRAIN_CALL_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(StdDuration::from_millis)
                .unwrap_or(defaults.call_timeout),
            claim_ttl: std::env::var("DRAIN_CLAIM_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::seconds)
                .unwrap_or(defaults.claim_ttl),
            staleness_after: std::env::var("DRAIN_STALENESS_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::seconds)
                .unwrap_or(defaults.staleness_after),
            selection_window: std::env::var("DRAIN_SELECTION_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::seconds)
                .unwrap_or(defaults.selection_window),
            qualify: QualifyConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Per-invocation options from the trigger request.
#[derive(Debug, Clone, Default)]
pub struct DrainOptions {
    pub limit: Option<usize>,
    pub budget_ms: Option<u64>,
    /// Oldest-first backlog mode instead of newest-first within the window.
    pub backlog: bool,
    /// Cap on claims released back toward PENDING at end of run.
    pub release_limit: Option<usize>,
    /// Report the would-be batch without claiming or scoring.
    pub dry_run: bool,
}

enum ScoreOutcome {
    Scored(Qualification),
    Failed { code: &'static str, message: String },
    TimedOut,
    /// Circuit breaker open: deterministic skip, signal left claimed.
    Skipped,
}

/// The AI scoring drain engine.
pub struct Drain {
    ledger: Arc<dyn LedgerStore>,
    scorer: Arc<dyn ScoringModel>,
    breaker: ScoringBreaker,
    config: DrainConfig,
}

impl Drain {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        scorer: Arc<dyn ScoringModel>,
        breaker: ScoringBreaker,
        config: DrainConfig,
    ) -> Self {
        Self {
            ledger,
            scorer,
            breaker,
            config,
        }
    }

    /// Run one drain invocation to completion or deadline.
    pub async fn run(&self, opts: DrainOptions) -> RunResult {
        let started = Instant::now();
        let mut result = RunResult::new("scoring_drain");
        if let Err(e) = self.run_inner(&opts, started, &mut result).await {
            error!(error = %e, "Scoring drain aborted");
            result.ok = false;
            result.note(format!("aborted: {e}"));
        }
        result.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            processed = result.processed,
            scored = result.scored,
            errored = result.errored,
            timed_out = result.timed_out,
            released = result.released,
            elapsed_ms = result.elapsed_ms,
            "Scoring drain finished"
        );
        result
    }

    async fn run_inner(
        &self,
        opts: &DrainOptions,
        started: Instant,
        result: &mut RunResult,
    ) -> Result<()> {
        let budget = opts
            .budget_ms
            .map(StdDuration::from_millis)
            .unwrap_or(self.config.time_budget);
        let deadline = started + budget;
        let limit = opts.limit.unwrap_or(self.config.batch_limit);

        // Ledger read failure is fatal: no mutation against unknown state.
        let mut signals = self.ledger.read_signals().await?;
        let now = Utc::now();

        // Crash recovery: stale SCORING claims revert to PENDING. Staleness
        // comes from the timestamp on the signal itself.
        let mut reclaimed = 0usize;
        for signal in signals.iter_mut() {
            if signal.claim_is_stale(now, self.config.staleness_after) {
                warn!(signal_id = %signal.id, ticker = %signal.ticker, "Reclaiming stale scoring claim");
                signal.release_claim();
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            // A dry run never persists the reclaim, so the note must not
            // describe one.
            if opts.dry_run {
                result.note(format!("dry_run: would reclaim {reclaimed} stale claims"));
            } else {
                result.note(format!("reclaimed {reclaimed} stale claims"));
            }
        }

        // Batch selection: newest-first within the window, or oldest-first in
        // backlog mode.
        let window_floor = now - self.config.selection_window;
        let mut candidates: Vec<usize> = signals
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status == SignalStatus::Pending)
            .filter(|(_, s)| opts.backlog || s.created_at >= window_floor)
            .map(|(i, _)| i)
            .collect();
        if opts.backlog {
            candidates.sort_by_key(|&i| signals[i].created_at);
        } else {
            candidates.sort_by_key(|&i| std::cmp::Reverse(signals[i].created_at));
        }
        candidates.truncate(limit);

        if opts.dry_run {
            result.processed = candidates.len();
            result.note(format!("dry_run: would claim {} signals", candidates.len()));
            return Ok(());
        }

        if candidates.is_empty() {
            if reclaimed > 0 {
                self.ledger.write_signals(&signals).await?;
            }
            result.note("nothing_to_do");
            return Ok(());
        }

        // Claim: this write publishes the claims. A concurrent run reading
        // after it sees these signals as SCORING, not PENDING.
        for &idx in &candidates {
            signals[idx].begin_scoring(now, self.config.claim_ttl);
        }
        self.ledger.write_signals(&signals).await?;

        let claimed: Vec<Signal> = candidates.iter().map(|&i| signals[i].clone()).collect();
        let batch_size = claimed.len();

        // Fixed-width worker pool: launch a chunk, await it fully, continue.
        let mut outcomes: HashMap<Uuid, ScoreOutcome> = HashMap::new();
        for chunk in claimed.chunks(self.config.worker_width) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining <= self.config.soft_stop_margin {
                result.note("soft_stop: budget nearly exhausted");
                break;
            }
            let futures = chunk.iter().map(|signal| async {
                (signal.id, self.score_one(signal, deadline).await)
            });
            for (id, outcome) in join_all(futures).await {
                outcomes.insert(id, outcome);
            }
        }

        // Apply outcomes. One signal's failure never touches its siblings.
        let scored_at = Utc::now();
        for signal in signals.iter_mut() {
            let Some(outcome) = outcomes.get(&signal.id) else {
                continue;
            };
            result.processed += 1;
            match outcome {
                ScoreOutcome::Scored(q) => {
                    signal.status = SignalStatus::Scored;
                    signal.ai_score = Some(q.score);
                    signal.ai_grade = Some(q.grade.clone());
                    signal.ai_summary = Some(q.summary.clone());
                    signal.qualified = Some(q.qualified);
                    if signal.side.is_none() {
                        signal.side = Some(q.side);
                    }
                    signal.scored_at = Some(scored_at);
                    signal.scoring_lock_until = None;
                    signal.error = None;
                    signal.error_code = None;
                    result.scored += 1;
                }
                ScoreOutcome::Failed { code, message } => {
                    signal.mark_error(*code, message.clone());
                    result.errored += 1;
                    result.note(format!("{} {}: {}", signal.ticker, code, message));
                }
                ScoreOutcome::TimedOut => {
                    // Left in SCORING; release below or reclaim later.
                    result.timed_out += 1;
                }
                ScoreOutcome::Skipped => {
                    result.skipped += 1;
                }
            }
        }

        // Release unfinalized claims toward PENDING, capped by the caller and
        // never exceeding the claimed batch size.
        let release_cap = opts.release_limit.unwrap_or(batch_size).min(batch_size);
        let mut released = 0usize;
        for &idx in &candidates {
            if released >= release_cap {
                break;
            }
            if signals[idx].status == SignalStatus::Scoring {
                signals[idx].release_claim();
                released += 1;
            }
        }
        result.released = released;

        // Write guard: no SCORED record without a finite in-range score ever
        // reaches the ledger.
        for signal in signals.iter_mut() {
            signal.enforce_scored_invariant();
        }

        self.ledger.write_signals(&signals).await?;
        Ok(())
    }

    async fn score_one(&self, signal: &Signal, deadline: Instant) -> ScoreOutcome {
        match self.breaker.is_open().await {
            Ok(true) => return ScoreOutcome::Skipped,
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "Breaker state unavailable, proceeding closed");
            }
        }

        let candidate = Self::candidate_for(signal);
        let mut attempt = 0u32;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return ScoreOutcome::TimedOut;
            }
            let timeout = self.config.call_timeout.min(deadline - now);

            match self.scorer.score(&candidate, timeout).await {
                Ok(evaluation) => {
                    return ScoreOutcome::Scored(qualify(
                        signal.side,
                        &evaluation,
                        &self.config.qualify,
                    ));
                }
                Err(failure) if !failure.is_retryable() => {
                    return ScoreOutcome::Failed {
                        code: failure.error_code(),
                        message: failure.to_string(),
                    };
                }
                Err(failure) => {
                    attempt += 1;
                    if attempt > self.config.retry.max_retries {
                        // Retries exhausted: this burst counts against the
                        // process-wide breaker.
                        if let Err(e) = self.breaker.record_failure().await {
                            warn!(error = %e, "Could not record breaker failure");
                        }
                        return match failure {
                            ScoreFailure::Timeout => ScoreOutcome::TimedOut,
                            other => ScoreOutcome::Failed {
                                code: other.error_code(),
                                message: other.to_string(),
                            },
                        };
                    }
                    let backoff = self.config.retry.backoff(attempt);
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if backoff >= remaining {
                        return ScoreOutcome::TimedOut;
                    }
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    fn candidate_for(signal: &Signal) -> ScoreCandidate {
        let context = format!(
            "ticker={} timeframe={} entry={:?} stop={:?} target={:?} source={}",
            signal.ticker,
            signal.timeframe.as_deref().unwrap_or("unknown"),
            signal.entry_price,
            signal.stop_price,
            signal.target_price,
            signal.source,
        );
        ScoreCandidate {
            ticker: signal.ticker.clone(),
            side: signal.side,
            entry_price: signal.entry_price,
            stop_price: signal.stop_price,
            target_price: signal.target_price,
            timeframe: signal.timeframe.clone(),
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use tradeloop_core::api::scoring::MockScoringModel;
    use tradeloop_core::api::{Evaluation, SideEval};
    use tradeloop_core::coord::{CoordStore, MemoryCoord};
    use tradeloop_core::store::MemoryLedger;
    use tradeloop_core::types::Side;

    fn eval(long: f64, short: f64) -> Evaluation {
        Evaluation {
            long: SideEval {
                score: long,
                grade: "A".to_string(),
                summary: "strong setup".to_string(),
            },
            short: SideEval {
                score: short,
                grade: "F".to_string(),
                summary: "weak".to_string(),
            },
            qualified: None,
        }
    }

    fn fast_config() -> DrainConfig {
        DrainConfig {
            time_budget: StdDuration::from_secs(10),
            soft_stop_margin: StdDuration::from_millis(50),
            call_timeout: StdDuration::from_secs(2),
            retry: RetryPolicy {
                max_retries: 2,
                base_delay_ms: 1,
                max_delay_ms: 4,
            },
            ..Default::default()
        }
    }

    fn drain_with(
        ledger: Arc<MemoryLedger>,
        scorer: MockScoringModel,
        coord: Arc<dyn CoordStore>,
        config: DrainConfig,
    ) -> Drain {
        let breaker = ScoringBreaker::new(coord, BreakerConfig::default());
        Drain::new(ledger, Arc::new(scorer), breaker, config)
    }

    fn pending_signal(ticker: &str, side: Option<Side>) -> Signal {
        let mut signal = Signal::new(ticker, "scanner");
        signal.side = side;
        signal
    }

    #[tokio::test]
    async fn scores_pending_signals_and_persists_claims_first() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .seed_signals(vec![
                pending_signal("AAPL", Some(Side::Long)),
                pending_signal("MSFT", Some(Side::Long)),
            ])
            .await;

        let mut scorer = MockScoringModel::new();
        scorer
            .expect_score()
            .times(2)
            .returning(|_, _| Ok(eval(8.4, 2.0)));

        let drain = drain_with(
            ledger.clone(),
            scorer,
            Arc::new(MemoryCoord::new()),
            fast_config(),
        );
        let result = drain.run(DrainOptions::default()).await;

        assert!(result.ok);
        assert_eq!(result.scored, 2);
        assert_eq!(result.errored, 0);

        let signals = ledger.read_signals().await.unwrap();
        for signal in &signals {
            assert_eq!(signal.status, SignalStatus::Scored);
            assert_eq!(signal.ai_score, Some(8.4));
            assert_eq!(signal.qualified, Some(true));
            assert!(signal.scoring_lock_until.is_none());
        }
    }

    #[tokio::test]
    async fn timeout_twice_then_success_lands_the_score() {
        // Scenario: scoring fails twice (timeout), succeeds on the third try
        // with 8.2 -> final SCORED, qualified.
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .seed_signals(vec![pending_signal("NVDA", Some(Side::Long))])
            .await;

        let mut scorer = MockScoringModel::new();
        let mut seq = mockall::Sequence::new();
        scorer
            .expect_score()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(ScoreFailure::Timeout));
        scorer
            .expect_score()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(eval(8.2, 1.0)));

        let drain = drain_with(
            ledger.clone(),
            scorer,
            Arc::new(MemoryCoord::new()),
            fast_config(),
        );
        let result = drain.run(DrainOptions::default()).await;

        assert_eq!(result.scored, 1);
        let signals = ledger.read_signals().await.unwrap();
        assert_eq!(signals[0].status, SignalStatus::Scored);
        assert_eq!(signals[0].ai_score, Some(8.2));
        assert_eq!(signals[0].qualified, Some(true));
    }

    #[tokio::test]
    async fn garbage_output_is_terminal_parse_failed() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .seed_signals(vec![pending_signal("TSLA", Some(Side::Short))])
            .await;

        let mut scorer = MockScoringModel::new();
        scorer
            .expect_score()
            .times(1) // structural failures never retry
            .returning(|_, _| Err(ScoreFailure::ParseFailed("not json".to_string())));

        let drain = drain_with(
            ledger.clone(),
            scorer,
            Arc::new(MemoryCoord::new()),
            fast_config(),
        );
        let result = drain.run(DrainOptions::default()).await;

        assert_eq!(result.errored, 1);
        let signals = ledger.read_signals().await.unwrap();
        assert_eq!(signals[0].status, SignalStatus::Error);
        assert_eq!(signals[0].error_code.as_deref(), Some("parse_failed"));
        assert!(signals[0].ai_score.is_none());
        assert!(signals[0].ai_grade.is_none());
    }

    #[tokio::test]
    async fn exhausted_timeouts_release_claim_back_to_pending() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .seed_signals(vec![pending_signal("AMD", Some(Side::Long))])
            .await;

        let mut scorer = MockScoringModel::new();
        scorer
            .expect_score()
            .times(3) // initial + 2 retries
            .returning(|_, _| Err(ScoreFailure::Timeout));

        let drain = drain_with(
            ledger.clone(),
            scorer,
            Arc::new(MemoryCoord::new()),
            fast_config(),
        );
        let result = drain.run(DrainOptions::default()).await;

        assert_eq!(result.timed_out, 1);
        assert_eq!(result.released, 1);
        assert_eq!(result.errored, 0);

        let signals = ledger.read_signals().await.unwrap();
        // Released toward PENDING for a later run, never ERROR.
        assert_eq!(signals[0].status, SignalStatus::Pending);
    }

    #[tokio::test]
    async fn release_limit_zero_leaves_timeouts_claimed() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .seed_signals(vec![pending_signal("AMD", Some(Side::Long))])
            .await;

        let mut scorer = MockScoringModel::new();
        scorer
            .expect_score()
            .returning(|_, _| Err(ScoreFailure::Timeout));

        let drain = drain_with(
            ledger.clone(),
            scorer,
            Arc::new(MemoryCoord::new()),
            fast_config(),
        );
        let result = drain
            .run(DrainOptions {
                release_limit: Some(0),
                ..Default::default()
            })
            .await;

        assert_eq!(result.released, 0);
        let signals = ledger.read_signals().await.unwrap();
        assert_eq!(signals[0].status, SignalStatus::Scoring);
    }

    #[tokio::test]
    async fn claimed_signals_are_not_reselected_until_stale() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut claimed = pending_signal("AAPL", Some(Side::Long));
        claimed.begin_scoring(Utc::now(), Duration::seconds(90));
        ledger.seed_signals(vec![claimed]).await;

        // No scoring calls expected: the only signal is freshly claimed.
        let scorer = MockScoringModel::new();
        let drain = drain_with(
            ledger.clone(),
            scorer,
            Arc::new(MemoryCoord::new()),
            fast_config(),
        );
        let result = drain.run(DrainOptions::default()).await;

        assert!(result.ok);
        assert_eq!(result.processed, 0);
        let signals = ledger.read_signals().await.unwrap();
        assert_eq!(signals[0].status, SignalStatus::Scoring);
    }

    #[tokio::test]
    async fn stale_claims_are_reclaimed_and_rescored() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut stale = pending_signal("AAPL", Some(Side::Long));
        stale.begin_scoring(Utc::now() - Duration::minutes(30), Duration::seconds(90));
        ledger.seed_signals(vec![stale]).await;

        let mut scorer = MockScoringModel::new();
        scorer.expect_score().times(1).returning(|_, _| Ok(eval(7.5, 3.0)));

        let drain = drain_with(
            ledger.clone(),
            scorer,
            Arc::new(MemoryCoord::new()),
            fast_config(),
        );
        let result = drain.run(DrainOptions::default()).await;

        assert_eq!(result.scored, 1);
        let signals = ledger.read_signals().await.unwrap();
        assert_eq!(signals[0].status, SignalStatus::Scored);
    }

    #[tokio::test]
    async fn dry_run_reports_reclaims_as_hypothetical() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut stale = pending_signal("AAPL", Some(Side::Long));
        stale.begin_scoring(Utc::now() - Duration::minutes(30), Duration::seconds(90));
        ledger.seed_signals(vec![stale]).await;

        let scorer = MockScoringModel::new();
        let drain = drain_with(
            ledger.clone(),
            scorer,
            Arc::new(MemoryCoord::new()),
            fast_config(),
        );
        let result = drain
            .run(DrainOptions {
                dry_run: true,
                ..Default::default()
            })
            .await;

        // The note is phrased as a would-be reclaim and the claim survives.
        assert!(result.notes.iter().any(|n| n.contains("would reclaim 1")));
        assert!(!result.notes.iter().any(|n| n.starts_with("reclaimed")));
        let signals = ledger.read_signals().await.unwrap();
        assert_eq!(signals[0].status, SignalStatus::Scoring);
    }

    #[tokio::test]
    async fn archived_and_terminal_signals_are_never_selected() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut archived = pending_signal("OLD", Some(Side::Long));
        archived.status = SignalStatus::Archived;
        let mut scored = pending_signal("DONE", Some(Side::Long));
        scored.status = SignalStatus::Scored;
        scored.ai_score = Some(9.0);
        ledger.seed_signals(vec![archived, scored]).await;

        let scorer = MockScoringModel::new();
        let drain = drain_with(
            ledger.clone(),
            scorer,
            Arc::new(MemoryCoord::new()),
            fast_config(),
        );
        let result = drain.run(DrainOptions::default()).await;
        assert_eq!(result.processed, 0);
    }

    #[tokio::test]
    async fn open_breaker_skips_deterministically() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .seed_signals(vec![pending_signal("AAPL", Some(Side::Long))])
            .await;

        let coord: Arc<dyn CoordStore> = Arc::new(MemoryCoord::new());
        coord
            .set_if_absent("breaker:scoring:open", "open", StdDuration::from_secs(60))
            .await
            .unwrap();

        // No model calls while the breaker is open.
        let scorer = MockScoringModel::new();
        let drain = drain_with(ledger.clone(), scorer, coord, fast_config());
        let result = drain.run(DrainOptions::default()).await;

        assert_eq!(result.skipped, 1);
        assert_eq!(result.errored, 0);
        // Skip released back to PENDING at end of run.
        let signals = ledger.read_signals().await.unwrap();
        assert_eq!(signals[0].status, SignalStatus::Pending);
    }

    #[tokio::test]
    async fn backlog_mode_selects_oldest_first() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut old = pending_signal("OLD", Some(Side::Long));
        old.created_at = Utc::now() - Duration::days(3);
        let new = pending_signal("NEW", Some(Side::Long));
        ledger.seed_signals(vec![new, old]).await;

        let mut scorer = MockScoringModel::new();
        scorer
            .expect_score()
            .withf(|candidate, _| candidate.ticker == "OLD")
            .times(1)
            .returning(|_, _| Ok(eval(8.0, 2.0)));

        let drain = drain_with(
            ledger.clone(),
            scorer,
            Arc::new(MemoryCoord::new()),
            fast_config(),
        );
        let result = drain
            .run(DrainOptions {
                limit: Some(1),
                backlog: true,
                ..Default::default()
            })
            .await;
        assert_eq!(result.scored, 1);
    }

    #[tokio::test]
    async fn dry_run_reports_without_claiming() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .seed_signals(vec![pending_signal("AAPL", Some(Side::Long))])
            .await;

        let scorer = MockScoringModel::new();
        let drain = drain_with(
            ledger.clone(),
            scorer,
            Arc::new(MemoryCoord::new()),
            fast_config(),
        );
        let result = drain
            .run(DrainOptions {
                dry_run: true,
                ..Default::default()
            })
            .await;

        assert_eq!(result.processed, 1);
        let signals = ledger.read_signals().await.unwrap();
        assert_eq!(signals[0].status, SignalStatus::Pending);
    }
}
