//! Signal generation: swing structure in, one directional signal out.
//!
//! Signals never see account or position state. They describe what the
//! market structure says, not what the account currently holds.

pub mod swing_trend;

pub use swing_trend::SignalEngine;

use serde::{Deserialize, Serialize};

use crate::domain::{Direction, SwingPoint};

/// Why the engine produced its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalReason {
    /// Higher highs and higher lows.
    Uptrend,
    /// Lower highs and lower lows.
    Downtrend,
    /// Fewer than two highs or two lows confirmed.
    Indeterminate,
    /// Highs and lows disagree (or are equal).
    Contradictory,
    /// Trend intact but the latest close already crossed the structural stop.
    StopBreached,
}

/// Exactly one per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    /// Latest swing low for long, latest swing high for short, `None` for flat.
    pub stop_price: Option<f64>,
    /// The swing point the stop is taken from.
    pub reference_swing: Option<SwingPoint>,
    pub reason: SignalReason,
    /// Close the signal was evaluated against.
    pub price: f64,
}

impl Signal {
    pub fn flat(reason: SignalReason, price: f64) -> Self {
        Self {
            direction: Direction::Flat,
            stop_price: None,
            reference_swing: None,
            reason,
            price,
        }
    }

    /// Distance from `price` to the stop as a fraction of `price`.
    ///
    /// `None` when there is no stop or the stop sits on the wrong side of the price.
    pub fn stop_distance_fraction(&self) -> Option<f64> {
        let stop = self.stop_price?;
        if self.price <= 0.0 {
            return None;
        }
        let distance = match self.direction {
            Direction::Long => self.price - stop,
            Direction::Short => stop - self.price,
            Direction::Flat => return None,
        };
        (distance > 0.0).then(|| distance / self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_distance_for_long_and_short() {
        let long = Signal {
            direction: Direction::Long,
            stop_price: Some(98.0),
            reference_swing: None,
            reason: SignalReason::Uptrend,
            price: 100.0,
        };
        assert!((long.stop_distance_fraction().unwrap() - 0.02).abs() < 1e-12);

        let short = Signal {
            direction: Direction::Short,
            stop_price: Some(105.0),
            reference_swing: None,
            reason: SignalReason::Downtrend,
            price: 100.0,
        };
        assert!((short.stop_distance_fraction().unwrap() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn stop_on_wrong_side_has_no_distance() {
        let s = Signal {
            direction: Direction::Long,
            stop_price: Some(101.0),
            reference_swing: None,
            reason: SignalReason::Uptrend,
            price: 100.0,
        };
        assert!(s.stop_distance_fraction().is_none());
        assert!(Signal::flat(SignalReason::Indeterminate, 100.0)
            .stop_distance_fraction()
            .is_none());
    }
}
