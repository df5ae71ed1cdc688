//! Larry Williams swing detection at two structural levels.
//!
//! - **Intermediate**: a candle is a swing high when its high is strictly
//!   above the neighbouring candles' highs (swing low: symmetric on lows).
//! - **Long-term**: the same extremum rule applied to the sequence of
//!   intermediate swing highs (and, separately, lows) rather than to candles.
//!
//! A run of equal values (plateau) is one candidate; the earliest candle of
//! the plateau is the pivot, confirmed only once the first different value
//! after the plateau moves away from it. The last candle can therefore never
//! be a pivot, and neither can a plateau that reaches the end of the series.
//!
//! Output alternates strictly between highs and lows. When two consecutive
//! candidates share a kind, the more extreme one is kept (earliest on ties).

use thiserror::Error;
use tracing::warn;

use crate::domain::{Candle, CandleSeries, SwingKind, SwingLevel, SwingPoint, SwingStructure};

/// Fewer confirmed points than this yields an empty (indeterminate) structure.
pub const MIN_CONFIRMED_POINTS: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SwingError {
    #[error("insufficient data: {available} candles available, {required} required")]
    InsufficientData { required: usize, available: usize },
}

/// Extracts swing structure at one configured level.
#[derive(Debug, Clone)]
pub struct SwingDetector {
    level: SwingLevel,
    min_candles: usize,
}

impl SwingDetector {
    pub fn new(level: SwingLevel, min_candles: usize) -> Self {
        Self { level, min_candles }
    }

    pub fn level(&self) -> SwingLevel {
        self.level
    }

    pub fn min_candles(&self) -> usize {
        self.min_candles
    }

    pub fn detect(&self, series: &CandleSeries) -> Result<SwingStructure, SwingError> {
        if series.len() < self.min_candles {
            return Err(SwingError::InsufficientData {
                required: self.min_candles,
                available: series.len(),
            });
        }

        let intermediate = intermediate_swings(series.candles());
        let points = match self.level {
            SwingLevel::Intermediate => intermediate,
            SwingLevel::Longterm => longterm_swings(&intermediate),
        };

        if points.len() < MIN_CONFIRMED_POINTS {
            return Ok(SwingStructure::empty(self.level));
        }

        Ok(into_structure(self.level, points))
    }
}

/// Wrap confirmed points, degrading to an empty structure if ordering or
/// alternation does not hold.
fn into_structure(level: SwingLevel, points: Vec<SwingPoint>) -> SwingStructure {
    let count = points.len();
    match SwingStructure::from_points(level, points) {
        Some(structure) => structure,
        None => {
            warn!(%level, count, "swing points out of order or not alternating, treating as indeterminate");
            SwingStructure::empty(level)
        }
    }
}

/// Strict local extremum with earliest-in-time plateau resolution.
fn pivot_indices(values: &[f64], kind: SwingKind) -> Vec<usize> {
    let beats = |a: f64, b: f64| match kind {
        SwingKind::High => a > b,
        SwingKind::Low => a < b,
    };

    let mut pivots = Vec::new();
    let mut i = 1;
    while i + 1 < values.len() {
        if !beats(values[i], values[i - 1]) {
            i += 1;
            continue;
        }
        let mut next = i + 1;
        while next < values.len() && values[next] == values[i] {
            next += 1;
        }
        if next < values.len() && beats(values[i], values[next]) {
            pivots.push(i);
        }
        i = next;
    }
    pivots
}

fn intermediate_swings(candles: &[Candle]) -> Vec<SwingPoint> {
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();

    let point = |index: usize, kind: SwingKind| {
        let candle = &candles[index];
        SwingPoint {
            time: candle.open_time,
            candle_index: index,
            price: match kind {
                SwingKind::High => candle.high,
                SwingKind::Low => candle.low,
            },
            kind,
            level: SwingLevel::Intermediate,
        }
    };

    // (candle index, tiebreak within the candle, point)
    let mut candidates: Vec<(usize, u8, SwingPoint)> = Vec::new();
    for index in pivot_indices(&highs, SwingKind::High) {
        let order = if candles[index].is_bullish() { 1 } else { 0 };
        candidates.push((index, order, point(index, SwingKind::High)));
    }
    for index in pivot_indices(&lows, SwingKind::Low) {
        let order = if candles[index].is_bullish() { 0 } else { 1 };
        candidates.push((index, order, point(index, SwingKind::Low)));
    }
    candidates.sort_by_key(|(index, order, _)| (*index, *order));

    enforce_alternation(candidates.into_iter().map(|(_, _, p)| p))
}

fn longterm_swings(intermediate: &[SwingPoint]) -> Vec<SwingPoint> {
    let mut candidates: Vec<(usize, SwingPoint)> = Vec::new();

    for kind in [SwingKind::High, SwingKind::Low] {
        let members: Vec<(usize, &SwingPoint)> = intermediate
            .iter()
            .enumerate()
            .filter(|(_, p)| p.kind == kind)
            .collect();
        let prices: Vec<f64> = members.iter().map(|(_, p)| p.price).collect();

        for pivot in pivot_indices(&prices, kind) {
            let (position, source) = members[pivot];
            candidates.push((
                position,
                SwingPoint {
                    level: SwingLevel::Longterm,
                    ..*source
                },
            ));
        }
    }
    candidates.sort_by_key(|(position, _)| *position);

    enforce_alternation(candidates.into_iter().map(|(_, p)| p))
}

fn enforce_alternation(points: impl Iterator<Item = SwingPoint>) -> Vec<SwingPoint> {
    let mut out: Vec<SwingPoint> = Vec::new();
    for point in points {
        match out.last_mut() {
            Some(last) if last.kind == point.kind => {
                let more_extreme = match point.kind {
                    SwingKind::High => point.price > last.price,
                    SwingKind::Low => point.price < last.price,
                };
                if more_extreme {
                    *last = point;
                }
            }
            _ => out.push(point),
        }
    }
    out
}
