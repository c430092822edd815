//! Bracket price computation and tick quantization.
//!
//! Take-profit sits at a fixed reward:risk multiple off the resolved entry
//! and the original stop distance. Both legs are quantized to the tick size
//! with directional rounding so a submitted price can never violate exchange
//! tick rules or invert relative to entry.

use rust_decimal::Decimal;
use tradeloop_core::types::Side;
use tradeloop_core::{Error, Result};

/// Final bracket prices, all integer multiples of the tick size.
#[derive(Debug, Clone, PartialEq)]
pub struct Bracket {
    pub entry: Decimal,
    pub stop: Decimal,
    pub take_profit: Decimal,
}

#[derive(Debug, Clone, Copy)]
enum Rounding {
    Down,
    Up,
    Nearest,
}

fn quantize(price: Decimal, tick: Decimal, rounding: Rounding) -> Decimal {
    let ticks = price / tick;
    let whole = match rounding {
        Rounding::Down => ticks.floor(),
        Rounding::Up => ticks.ceil(),
        Rounding::Nearest => ticks.round(),
    };
    (whole * tick).normalize()
}

/// Compute a bracket off the resolved decision price, preserving the original
/// entry-to-stop distance.
///
/// LONG stop rounds down and SHORT stop rounds up (away from entry), take
/// profit rounds nearest. A bracket that inverts after quantization is
/// rejected rather than submitted.
pub fn compute_bracket(
    side: Side,
    resolved_entry: Decimal,
    original_entry: Decimal,
    original_stop: Decimal,
    rr_multiple: Decimal,
    tick: Decimal,
) -> Result<Bracket> {
    if tick <= Decimal::ZERO {
        return Err(Error::InvalidTrade("non-positive tick size".to_string()));
    }
    let stop_distance = (original_entry - original_stop).abs();
    if stop_distance.is_zero() {
        return Err(Error::InvalidTrade("zero stop distance".to_string()));
    }

    let entry = quantize(resolved_entry, tick, Rounding::Nearest);
    let (raw_stop, raw_tp, stop_rounding) = match side {
        Side::Long => (
            entry - stop_distance,
            entry + rr_multiple * stop_distance,
            Rounding::Down,
        ),
        Side::Short => (
            entry + stop_distance,
            entry - rr_multiple * stop_distance,
            Rounding::Up,
        ),
    };
    let stop = quantize(raw_stop, tick, stop_rounding);
    let take_profit = quantize(raw_tp, tick, Rounding::Nearest);

    let ordered = match side {
        Side::Long => stop < entry && entry < take_profit,
        Side::Short => stop > entry && entry > take_profit,
    };
    if !ordered {
        return Err(Error::InvalidTrade(format!(
            "bracket inverted after quantization: stop={stop} entry={entry} tp={take_profit}"
        )));
    }

    Ok(Bracket {
        entry,
        stop,
        take_profit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn long_bracket_orders_and_quantizes() {
        let bracket = compute_bracket(
            Side::Long,
            dec("100.003"), // resolved entry off-tick
            dec("100"),
            dec("95"),
            dec("2"),
            dec("0.01"),
        )
        .unwrap();

        assert_eq!(bracket.entry, dec("100"));
        assert_eq!(bracket.stop, dec("95"));
        assert_eq!(bracket.take_profit, dec("110"));
        assert!(bracket.stop < bracket.entry && bracket.entry < bracket.take_profit);
    }

    #[test]
    fn short_bracket_mirrors() {
        let bracket = compute_bracket(
            Side::Short,
            dec("50"),
            dec("50"),
            dec("52.5"),
            dec("2"),
            dec("0.01"),
        )
        .unwrap();

        assert_eq!(bracket.stop, dec("52.5"));
        assert_eq!(bracket.take_profit, dec("45"));
        assert!(bracket.stop > bracket.entry && bracket.entry > bracket.take_profit);
    }

    #[test]
    fn stop_rounds_away_from_entry() {
        // Stop distance 1.005 puts the raw long stop at 98.995: rounding down
        // to 98.99 widens the stop rather than tightening it onto a bad tick.
        let long = compute_bracket(
            Side::Long,
            dec("100"),
            dec("100"),
            dec("98.995"),
            dec("2"),
            dec("0.01"),
        )
        .unwrap();
        assert_eq!(long.stop, dec("98.99"));

        let short = compute_bracket(
            Side::Short,
            dec("100"),
            dec("100"),
            dec("101.005"),
            dec("2"),
            dec("0.01"),
        )
        .unwrap();
        assert_eq!(short.stop, dec("101.01"));
    }

    #[test]
    fn legs_are_tick_multiples() {
        let bracket = compute_bracket(
            Side::Long,
            dec("10.333"),
            dec("10.30"),
            dec("10.111"),
            dec("1.5"),
            dec("0.05"),
        )
        .unwrap();
        for price in [bracket.entry, bracket.stop, bracket.take_profit] {
            assert!(
                (price / dec("0.05")).fract().is_zero(),
                "{price} not a tick multiple"
            );
        }
    }

    #[test]
    fn sub_tick_distance_is_rejected() {
        // Distance smaller than one tick collapses the bracket onto entry.
        let result = compute_bracket(
            Side::Long,
            dec("100"),
            dec("100"),
            dec("99.999"),
            dec("2"),
            dec("0.01"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn zero_stop_distance_is_rejected() {
        assert!(compute_bracket(
            Side::Long,
            dec("100"),
            dec("100"),
            dec("100"),
            dec("2"),
            dec("0.01")
        )
        .is_err());
    }
}
