//! Signal ledger records and their scoring lifecycle.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a trade setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn flipped(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

/// Scoring lifecycle state of a signal.
///
/// `Pending -> Scoring -> {Scored | Error}`; `Archived` is a parking state
/// that never re-enters scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Pending,
    Scoring,
    Scored,
    Error,
    Archived,
}

/// A candidate trade setup awaiting or holding a quality score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub ticker: String,
    /// Explicit direction if the upstream source committed to one.
    pub side: Option<Side>,
    pub entry_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub timeframe: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub status: SignalStatus,
    pub ai_score: Option<f64>,
    pub ai_grade: Option<String>,
    pub ai_summary: Option<String>,
    pub qualified: Option<bool>,
    /// Advisory claim expiry mirrored from the lock store. Staleness decisions
    /// use `scoring_started_at`, not this field.
    pub scoring_lock_until: Option<DateTime<Utc>>,
    pub scoring_started_at: Option<DateTime<Utc>>,
    pub scored_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

impl Signal {
    pub fn new(ticker: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticker: ticker.into(),
            side: None,
            entry_price: None,
            stop_price: None,
            target_price: None,
            timeframe: None,
            source: source.into(),
            created_at: Utc::now(),
            status: SignalStatus::Pending,
            ai_score: None,
            ai_grade: None,
            ai_summary: None,
            qualified: None,
            scoring_lock_until: None,
            scoring_started_at: None,
            scored_at: None,
            error: None,
            error_code: None,
        }
    }

    /// Transition into `Scoring`, publishing the claim timestamps.
    pub fn begin_scoring(&mut self, now: DateTime<Utc>, claim_ttl: Duration) {
        self.status = SignalStatus::Scoring;
        self.scoring_started_at = Some(now);
        self.scoring_lock_until = Some(now + claim_ttl);
    }

    /// Revert a claimed signal back to `Pending`, clearing claim metadata.
    pub fn release_claim(&mut self) {
        self.status = SignalStatus::Pending;
        self.scoring_started_at = None;
        self.scoring_lock_until = None;
    }

    /// Whether a `Scoring` claim is stale, derived from the timestamp on the
    /// signal itself. The lock store's own expiry can disagree after a crash
    /// and is never trusted alone.
    pub fn claim_is_stale(&self, now: DateTime<Utc>, staleness_after: Duration) -> bool {
        if self.status != SignalStatus::Scoring {
            return false;
        }
        match self.scoring_started_at {
            Some(started) => now - started > staleness_after,
            // Claimed with no timestamp: unrecoverable otherwise, treat as stale.
            None => true,
        }
    }

    /// Record a terminal scoring failure, clearing score-dependent fields.
    pub fn mark_error(&mut self, code: impl Into<String>, message: impl Into<String>) {
        self.status = SignalStatus::Error;
        self.error_code = Some(code.into());
        self.error = Some(message.into());
        self.ai_score = None;
        self.ai_grade = None;
        self.ai_summary = None;
        self.qualified = None;
        self.scoring_lock_until = None;
    }

    /// Write guard: `Scored` must carry a finite score in [0, 10]. Violations
    /// are rewritten to `Error` before any persistence.
    pub fn enforce_scored_invariant(&mut self) {
        if self.status != SignalStatus::Scored {
            return;
        }
        let ok = self
            .ai_score
            .map(|s| s.is_finite() && (0.0..=10.0).contains(&s))
            .unwrap_or(false);
        if !ok {
            self.mark_error("invalid_score", "scored record without a finite score");
        }
    }
}
