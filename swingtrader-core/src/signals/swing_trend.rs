//! Higher-highs/higher-lows trend classification over swing structure.

use crate::domain::{Direction, SwingKind, SwingStructure};

use super::{Signal, SignalReason};

/// Classifies the two most recent swing highs and lows.
///
/// - Long when the latest high is above the prior high AND the latest low is
///   above the prior low. Stop = latest swing low.
/// - Short on the mirror condition. Stop = latest swing high.
/// - Flat otherwise.
///
/// Pure function of its inputs: no state is kept between calls.
#[derive(Debug, Clone)]
pub struct SignalEngine {
    exit_on_stop_breach: bool,
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self {
            exit_on_stop_breach: true,
        }
    }
}

impl SignalEngine {
    pub fn new(exit_on_stop_breach: bool) -> Self {
        Self {
            exit_on_stop_breach,
        }
    }

    pub fn evaluate(&self, structure: &SwingStructure, latest_close: f64) -> Signal {
        let mut highs = structure.latest(SwingKind::High);
        let mut lows = structure.latest(SwingKind::Low);

        let (Some(high), Some(prior_high), Some(low), Some(prior_low)) =
            (highs.next(), highs.next(), lows.next(), lows.next())
        else {
            return Signal::flat(SignalReason::Indeterminate, latest_close);
        };

        let (direction, reason, reference) =
            if high.price > prior_high.price && low.price > prior_low.price {
                (Direction::Long, SignalReason::Uptrend, *low)
            } else if high.price < prior_high.price && low.price < prior_low.price {
                (Direction::Short, SignalReason::Downtrend, *high)
            } else {
                return Signal::flat(SignalReason::Contradictory, latest_close);
            };

        let breached = match direction {
            Direction::Long => latest_close <= reference.price,
            Direction::Short => latest_close >= reference.price,
            Direction::Flat => false,
        };
        if self.exit_on_stop_breach && breached {
            return Signal::flat(SignalReason::StopBreached, latest_close);
        }

        Signal {
            direction,
            stop_price: Some(reference.price),
            reference_swing: Some(reference),
            reason,
            price: latest_close,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SwingLevel, SwingPoint};
    use chrono::{TimeZone, Utc};

    fn structure(prices: &[(SwingKind, f64)]) -> SwingStructure {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let points = prices
            .iter()
            .enumerate()
            .map(|(i, &(kind, price))| SwingPoint {
                time: t0 + chrono::Duration::hours(i as i64 * 2),
                candle_index: i * 2,
                price,
                kind,
                level: SwingLevel::Intermediate,
            })
            .collect();
        SwingStructure::from_points(SwingLevel::Intermediate, points).unwrap()
    }

    use SwingKind::{High as H, Low as L};

    #[test]
    fn uptrend_is_long_with_latest_low_stop() {
        let s = structure(&[(L, 10.0), (H, 14.0), (L, 11.0), (H, 15.0)]);
        let sig = SignalEngine::default().evaluate(&s, 14.5);
        assert_eq!(sig.direction, Direction::Long);
        assert_eq!(sig.stop_price, Some(11.0));
        assert_eq!(sig.reason, SignalReason::Uptrend);
        assert_eq!(sig.reference_swing.unwrap().kind, L);
    }

    #[test]
    fn downtrend_is_short_with_latest_high_stop() {
        let s = structure(&[(H, 15.0), (L, 11.0), (H, 14.0), (L, 10.0)]);
        let sig = SignalEngine::default().evaluate(&s, 10.5);
        assert_eq!(sig.direction, Direction::Short);
        assert_eq!(sig.stop_price, Some(14.0));
    }

    #[test]
    fn mixed_structure_is_flat() {
        // higher high, lower low: expanding range
        let s = structure(&[(L, 10.0), (H, 14.0), (L, 9.0), (H, 15.0)]);
        let sig = SignalEngine::default().evaluate(&s, 12.0);
        assert_eq!(sig.direction, Direction::Flat);
        assert_eq!(sig.reason, SignalReason::Contradictory);
        assert!(sig.stop_price.is_none());
    }

    #[test]
    fn equal_highs_are_flat() {
        let s = structure(&[(L, 10.0), (H, 14.0), (L, 11.0), (H, 14.0)]);
        assert_eq!(
            SignalEngine::default().evaluate(&s, 12.0).direction,
            Direction::Flat
        );
    }

    #[test]
    fn too_few_points_is_indeterminate() {
        let s = structure(&[(L, 10.0), (H, 14.0), (L, 11.0)]);
        let sig = SignalEngine::default().evaluate(&s, 12.0);
        assert_eq!(sig.reason, SignalReason::Indeterminate);
        let empty = SwingStructure::empty(SwingLevel::Intermediate);
        assert_eq!(
            SignalEngine::default().evaluate(&empty, 12.0).reason,
            SignalReason::Indeterminate
        );
    }

    #[test]
    fn close_through_stop_goes_flat() {
        let s = structure(&[(L, 10.0), (H, 14.0), (L, 11.0), (H, 15.0)]);
        let sig = SignalEngine::default().evaluate(&s, 10.9);
        assert_eq!(sig.direction, Direction::Flat);
        assert_eq!(sig.reason, SignalReason::StopBreached);

        let lenient = SignalEngine::new(false).evaluate(&s, 10.9);
        assert_eq!(lenient.direction, Direction::Long);
    }

    #[test]
    fn repeated_evaluation_is_identical() {
        let s = structure(&[(L, 10.0), (H, 14.0), (L, 11.0), (H, 15.0)]);
        let engine = SignalEngine::default();
        let first = engine.evaluate(&s, 14.0);
        for _ in 0..10 {
            assert_eq!(engine.evaluate(&s, 14.0), first);
        }
    }
}
