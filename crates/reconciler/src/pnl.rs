//! Realized P&L and R-multiple math.

use rust_decimal::Decimal;
use tradeloop_core::types::Side;

/// Signed dollar P&L for a closed position.
pub fn realized_pnl(side: Side, entry: Decimal, exit: Decimal, qty: Decimal) -> Decimal {
    match side {
        Side::Long => (exit - entry) * qty,
        Side::Short => (entry - exit) * qty,
    }
}

/// P&L as a multiple of the initial dollar risk (entry-to-stop distance x
/// quantity). `None` when the risk denominator is zero or unknown.
pub fn realized_r(
    pnl: Decimal,
    entry: Decimal,
    stop: Option<Decimal>,
    qty: Decimal,
) -> Option<Decimal> {
    let stop = stop?;
    let risk = (entry - stop).abs() * qty;
    if risk.is_zero() {
        return None;
    }
    Some((pnl / risk).round_dp(2))
}
