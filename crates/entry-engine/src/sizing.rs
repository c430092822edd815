//! Risk-tier position sizing.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tradeloop_core::types::RiskTier;
use tradeloop_core::{Error, Result};

/// Sizing decision for one trade.
#[derive(Debug, Clone, PartialEq)]
pub struct Sizing {
    pub tier: RiskTier,
    pub risk_mult: Decimal,
    /// Dollars at risk between entry and stop.
    pub risk_dollars: Decimal,
    pub quantity: i64,
}

/// quantity = floor(risk_dollars / |entry - stop|), minimum 1.
pub fn size_position(
    score: f64,
    base_risk: Decimal,
    entry: Decimal,
    stop: Decimal,
) -> Result<Sizing> {
    let distance = (entry - stop).abs();
    if distance.is_zero() {
        return Err(Error::InvalidTrade("zero stop distance".to_string()));
    }
    let tier = RiskTier::from_score(score);
    let risk_mult = tier.risk_mult();
    let risk_dollars = base_risk * risk_mult;
    let quantity = (risk_dollars / distance)
        .floor()
        .to_i64()
        .unwrap_or(0)
        .max(1);
    Ok(Sizing {
        tier,
        risk_mult,
        risk_dollars,
        quantity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_b_long_sizes_by_risk_over_distance() {
        // entry=100, stop=95, tier B (mult 1.0), base risk $100 -> floor(100/5) = 20.
        let sizing = size_position(
            7.0,
            Decimal::new(100, 0),
            Decimal::new(100, 0),
            Decimal::new(95, 0),
        )
        .unwrap();
        assert_eq!(sizing.tier, RiskTier::B);
        assert_eq!(sizing.quantity, 20);
        assert_eq!(sizing.risk_dollars, Decimal::new(100, 0));
    }

    #[test]
    fn tier_scales_quantity() {
        let a = size_position(
            9.0,
            Decimal::new(100, 0),
            Decimal::new(100, 0),
            Decimal::new(95, 0),
        )
        .unwrap();
        assert_eq!(a.tier, RiskTier::A);
        assert_eq!(a.quantity, 30); // floor(150/5)

        let c = size_position(
            3.0,
            Decimal::new(100, 0),
            Decimal::new(100, 0),
            Decimal::new(95, 0),
        )
        .unwrap();
        assert_eq!(c.quantity, 10); // floor(50/5)
    }

    #[test]
    fn quantity_floor_is_one() {
        // Wide stop relative to risk budget still buys a single share.
        let sizing = size_position(
            5.0,
            Decimal::new(100, 0),
            Decimal::new(500, 0),
            Decimal::new(300, 0),
        )
        .unwrap();
        assert_eq!(sizing.quantity, 1);
    }

    #[test]
    fn zero_distance_is_an_error() {
        assert!(size_position(
            7.0,
            Decimal::new(100, 0),
            Decimal::new(50, 0),
            Decimal::new(50, 0)
        )
        .is_err());
    }
}
