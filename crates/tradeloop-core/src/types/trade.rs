//! Trade ledger records: intended and live broker positions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::signal::Side;

/// Lifecycle state of a trade record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    /// Qualified signal awaiting the entry engine.
    AutoPending,
    /// Broker order confirmed, position considered live.
    Open,
    /// Closed on broker confirmation or fill.
    Closed,
    /// Terminal failure; requires operator attention.
    Error,
}

/// Discrete risk class derived from a signal's quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTier {
    A,
    B,
    C,
}

impl RiskTier {
    /// Tier cutoffs: A >= 8.0, B >= 6.5, else C.
    pub fn from_score(score: f64) -> Self {
        if score >= 8.0 {
            RiskTier::A
        } else if score >= 6.5 {
            RiskTier::B
        } else {
            RiskTier::C
        }
    }

    /// Position-sizing multiplier applied to the base risk amount.
    pub fn risk_mult(self) -> Decimal {
        match self {
            RiskTier::A => Decimal::new(15, 1), // 1.5
            RiskTier::B => Decimal::ONE,
            RiskTier::C => Decimal::new(5, 1), // 0.5
        }
    }
}

/// AI metadata carried from the scored signal onto the trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiMeta {
    pub score: f64,
    pub tier: RiskTier,
    pub risk_mult: Decimal,
}

/// A ledger record for an intended or live broker position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub ticker: String,
    pub side: Side,
    pub entry_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub quantity: i64,
    pub status: TradeStatus,
    pub source: String,
    pub signal_id: Option<Uuid>,
    /// Trading-day tag (e.g. "2026-08-28") set when the trade was created.
    pub session: Option<String>,
    pub broker_order_id: Option<String>,
    pub stop_order_id: Option<String>,
    pub take_profit_order_id: Option<String>,
    /// Broker-side order status mirrored during reconciliation.
    pub broker_status: Option<String>,
    pub ai: Option<AiMeta>,
    pub created_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub realized_pnl: Option<Decimal>,
    pub realized_r: Option<Decimal>,
    pub close_reason: Option<String>,
    pub error: Option<String>,
}

impl Trade {
    pub fn new(ticker: impl Into<String>, side: Side, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticker: ticker.into(),
            side,
            entry_price: None,
            stop_price: None,
            target_price: None,
            quantity: 0,
            status: TradeStatus::AutoPending,
            source: source.into(),
            signal_id: None,
            session: None,
            broker_order_id: None,
            stop_order_id: None,
            take_profit_order_id: None,
            broker_status: None,
            ai: None,
            created_at: Utc::now(),
            opened_at: None,
            closed_at: None,
            realized_pnl: None,
            realized_r: None,
            close_reason: None,
            error: None,
        }
    }

    /// Directional price sanity: LONG stop < entry < target, SHORT mirrored.
    pub fn prices_are_sane(&self) -> bool {
        let (Some(entry), Some(stop)) = (self.entry_price, self.stop_price) else {
            return false;
        };
        match (self.side, self.target_price) {
            (Side::Long, Some(target)) => stop < entry && entry < target,
            (Side::Long, None) => stop < entry,
            (Side::Short, Some(target)) => stop > entry && entry > target,
            (Side::Short, None) => stop > entry,
        }
    }

    /// Terminal close. Reconciliation is the only caller; callers must supply
    /// a traceable reason.
    pub fn close(
        &mut self,
        reason: impl Into<String>,
        realized_pnl: Option<Decimal>,
        realized_r: Option<Decimal>,
        now: DateTime<Utc>,
    ) {
        self.status = TradeStatus::Closed;
        self.close_reason = Some(reason.into());
        self.realized_pnl = realized_pnl;
        self.realized_r = realized_r;
        self.closed_at = Some(now);
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = TradeStatus::Error;
        self.error = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_cutoffs_and_multipliers() {
        assert_eq!(RiskTier::from_score(9.1), RiskTier::A);
        assert_eq!(RiskTier::from_score(8.0), RiskTier::A);
        assert_eq!(RiskTier::from_score(7.0), RiskTier::B);
        assert_eq!(RiskTier::from_score(6.5), RiskTier::B);
        assert_eq!(RiskTier::from_score(4.0), RiskTier::C);

        assert_eq!(RiskTier::B.risk_mult(), Decimal::ONE);
        assert_eq!(RiskTier::A.risk_mult(), Decimal::new(15, 1));
    }

    #[test]
    fn price_sanity_is_directional() {
        let mut long = Trade::new("AAPL", Side::Long, "auto");
        long.entry_price = Some(Decimal::new(100, 0));
        long.stop_price = Some(Decimal::new(95, 0));
        long.target_price = Some(Decimal::new(110, 0));
        assert!(long.prices_are_sane());

        // Same prices are invalid for a short.
        let mut short = long.clone();
        short.side = Side::Short;
        assert!(!short.prices_are_sane());

        short.stop_price = Some(Decimal::new(105, 0));
        short.target_price = Some(Decimal::new(90, 0));
        assert!(short.prices_are_sane());
    }

    #[test]
    fn missing_required_prices_fail_sanity() {
        let trade = Trade::new("AAPL", Side::Long, "auto");
        assert!(!trade.prices_are_sane());
    }
}
