//! Global admission gates evaluated at the top of every entry run.
//!
//! Each gate is retained in the report even when a later step re-enforces it,
//! so a skipped run explains itself.

use serde::Serialize;

/// Snapshot of every global gate for one run.
#[derive(Debug, Clone, Serialize)]
pub struct GateReport {
    pub trading_enabled: bool,
    pub live_permitted: bool,
    pub market_open: bool,
    pub daily_entries: i64,
    pub daily_entry_cap: i64,
    pub open_positions: usize,
    pub open_position_cap: usize,
}

impl GateReport {
    pub fn all_pass(&self) -> bool {
        self.blocking_gate().is_none()
    }

    /// First gate that blocks the run, if any.
    pub fn blocking_gate(&self) -> Option<&'static str> {
        if !self.trading_enabled {
            Some("trading_disabled")
        } else if !self.live_permitted {
            Some("live_not_permitted")
        } else if !self.market_open {
            Some("market_closed")
        } else if self.daily_entries >= self.daily_entry_cap {
            Some("daily_entry_cap")
        } else if self.open_positions >= self.open_position_cap {
            Some("open_position_cap")
        } else {
            None
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "gates: enabled={} live={} market_open={} daily={}/{} open={}/{}",
            self.trading_enabled,
            self.live_permitted,
            self.market_open,
            self.daily_entries,
            self.daily_entry_cap,
            self.open_positions,
            self.open_position_cap,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing() -> GateReport {
        GateReport {
            trading_enabled: true,
            live_permitted: true,
            market_open: true,
            daily_entries: 2,
            daily_entry_cap: 10,
            open_positions: 1,
            open_position_cap: 5,
        }
    }

    #[test]
    fn passes_when_every_gate_is_clear() {
        assert!(passing().all_pass());
        assert!(passing().blocking_gate().is_none());
    }

    #[test]
    fn first_blocking_gate_is_reported() {
        let mut report = passing();
        report.market_open = false;
        assert_eq!(report.blocking_gate(), Some("market_closed"));

        report.trading_enabled = false;
        assert_eq!(report.blocking_gate(), Some("trading_disabled"));
    }

    #[test]
    fn caps_block_at_exactly_the_limit() {
        let mut report = passing();
        report.daily_entries = 10;
        assert_eq!(report.blocking_gate(), Some("daily_entry_cap"));

        let mut report = passing();
        report.open_positions = 5;
        assert_eq!(report.blocking_gate(), Some("open_position_cap"));
    }
}
