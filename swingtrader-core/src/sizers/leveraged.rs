//! Leveraged percentage-of-equity sizer.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Direction, PositionIntent};
use crate::signals::Signal;
use crate::sizers::Sizer;

/// Rounding slack so that e.g. 7.5 / 0.1 does not floor to 74.
const LOT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizingParams {
    /// Fraction of equity committed as margin (0.0–1.0).
    pub position_size_pct: f64,
    pub leverage: u8,
    /// Quantity granularity of the market; quantities are floored to a multiple of it.
    pub lot_step: f64,
}

/// Sizes a position as `equity × position_size_pct × leverage`.
///
/// # Formula
/// ```text
/// raw      = equity * position_size_pct * leverage
/// notional = min(raw, risk_cap, equity * leverage)
/// quantity = floor(notional / price / lot_step) * lot_step
/// ```
/// The last bound holds no matter what `position_size_pct` says.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    params: SizingParams,
}

impl PositionSizer {
    pub fn new(params: SizingParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SizingParams {
        &self.params
    }

    pub fn raw_notional(&self, equity: f64) -> f64 {
        equity.max(0.0) * self.params.position_size_pct * f64::from(self.params.leverage)
    }

    /// Full-margin ceiling.
    pub fn ceiling(&self, equity: f64) -> f64 {
        equity.max(0.0) * f64::from(self.params.leverage)
    }

    fn floor_to_lot(&self, quantity: f64) -> f64 {
        let step = self.params.lot_step;
        if step <= 0.0 || !step.is_finite() {
            return quantity;
        }
        (quantity / step + LOT_EPSILON).floor() * step
    }
}

impl Sizer for PositionSizer {
    fn size(
        &self,
        equity: f64,
        direction: Direction,
        signal: &Signal,
        size_cap: Option<f64>,
    ) -> PositionIntent {
        let price = signal.price;
        let leverage = self.params.leverage;
        if direction.is_flat() || equity <= 0.0 || price <= 0.0 || !price.is_finite() {
            return PositionIntent::flat(leverage, price);
        }

        let raw = self.raw_notional(equity);
        let mut notional = raw;
        if let Some(cap) = size_cap {
            if cap < notional {
                debug!(raw, cap, "notional scaled down by per-trade loss cap");
                notional = cap;
            }
        }
        // f64::min drops a NaN operand, so a NaN raw notional collapses to the ceiling.
        notional = notional.min(self.ceiling(equity)).max(0.0);

        let quantity = self.floor_to_lot(notional / price);
        if quantity <= 0.0 {
            return PositionIntent::flat(leverage, price);
        }

        PositionIntent {
            direction,
            notional_size: (quantity * price).min(notional),
            quantity,
            leverage,
            stop_price: signal.stop_price,
            reference_price: price,
        }
    }

    fn name(&self) -> &str {
        "LeveragedPct"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalReason;

    fn sizer(pct: f64, leverage: u8) -> PositionSizer {
        PositionSizer::new(SizingParams {
            position_size_pct: pct,
            leverage,
            lot_step: 0.1,
        })
    }

    fn long_at(price: f64, stop: f64) -> Signal {
        Signal {
            direction: Direction::Long,
            stop_price: Some(stop),
            reference_swing: None,
            reason: SignalReason::Uptrend,
            price,
        }
    }

    #[test]
    fn raw_notional_uses_leverage() {
        let intent = sizer(0.25, 3).size(1000.0, Direction::Long, &long_at(100.0, 98.0), None);
        assert_eq!(intent.direction, Direction::Long);
        assert!((intent.notional_size - 750.0).abs() < 1e-9);
        assert!((intent.quantity - 7.5).abs() < 1e-9);
        assert_eq!(intent.stop_price, Some(98.0));
    }

    #[test]
    fn stricter_cap_wins() {
        let intent =
            sizer(0.25, 3).size(1000.0, Direction::Long, &long_at(100.0, 98.0), Some(400.0));
        assert!((intent.notional_size - 400.0).abs() < 1e-9);
    }

    #[test]
    fn looser_cap_is_ignored() {
        let intent =
            sizer(0.25, 3).size(1000.0, Direction::Long, &long_at(100.0, 98.0), Some(2500.0));
        assert!((intent.notional_size - 750.0).abs() < 1e-9);
    }

    #[test]
    fn misconfigured_pct_is_clamped_to_ceiling() {
        let intent = sizer(4.0, 2).size(1000.0, Direction::Long, &long_at(100.0, 98.0), None);
        assert!(intent.notional_size <= 2000.0 + 1e-9);
    }

    #[test]
    fn flat_direction_sizes_to_zero() {
        let intent = sizer(0.25, 3).size(1000.0, Direction::Flat, &long_at(100.0, 98.0), None);
        assert!(intent.is_flat());
        assert_eq!(intent.notional_size, 0.0);
    }

    #[test]
    fn quantity_floors_to_lot_step() {
        let intent = sizer(0.25, 1).size(1000.0, Direction::Long, &long_at(30.0, 29.0), None);
        // 250 / 30 = 8.333.. -> 8.3
        assert!((intent.quantity - 8.3).abs() < 1e-9);
        assert!(intent.notional_size <= 250.0);
    }

    #[test]
    fn sub_lot_size_becomes_flat() {
        let intent =
            sizer(0.25, 1).size(1000.0, Direction::Long, &long_at(100.0, 98.0), Some(5.0));
        assert!(intent.is_flat());
    }
}
