//! Candles, the fundamental market data unit, and the validated series built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// OHLCV candle for one market on one interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        open_time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns true if any OHLCV field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan()
            || self.high.is_nan()
            || self.low.is_nan()
            || self.close.is_nan()
            || self.volume.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, open and close inside the range, prices positive.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
            && self.volume >= 0.0
    }

    /// Close at or above open.
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }
}

/// Candle intervals accepted by the exchange, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum CandleInterval {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
    D15,
}

impl CandleInterval {
    pub const ALL: [CandleInterval; 9] = [
        Self::M1,
        Self::M5,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H4,
        Self::D1,
        Self::W1,
        Self::D15,
    ];

    pub fn minutes(self) -> u32 {
        match self {
            Self::M1 => 1,
            Self::M5 => 5,
            Self::M15 => 15,
            Self::M30 => 30,
            Self::H1 => 60,
            Self::H4 => 240,
            Self::D1 => 1440,
            Self::W1 => 10080,
            Self::D15 => 21600,
        }
    }

    pub fn duration(self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.minutes()))
    }
}

impl TryFrom<u32> for CandleInterval {
    type Error = CandleError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|i| i.minutes() == minutes)
            .ok_or(CandleError::UnsupportedInterval(minutes))
    }
}

impl From<CandleInterval> for u32 {
    fn from(interval: CandleInterval) -> Self {
        interval.minutes()
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.minutes())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CandleError {
    #[error("unsupported candle interval: {0} minutes")]
    UnsupportedInterval(u32),

    #[error("candle {index} is not after its predecessor ({time})")]
    OutOfOrder { index: usize, time: DateTime<Utc> },

    #[error("candle {index} at {time} has invalid OHLC values")]
    Insane { index: usize, time: DateTime<Utc> },
}

/// Ordered, immutable snapshot of candles for one (market, interval) pair.
///
/// Construction guarantees strictly increasing `open_time` and sane OHLC on
/// every candle. There is no way to mutate the candles afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandleSeries {
    market: String,
    interval: CandleInterval,
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(
        market: impl Into<String>,
        interval: CandleInterval,
        candles: Vec<Candle>,
    ) -> Result<Self, CandleError> {
        for (index, candle) in candles.iter().enumerate() {
            if !candle.is_sane() {
                return Err(CandleError::Insane {
                    index,
                    time: candle.open_time,
                });
            }
            if index > 0 && candle.open_time <= candles[index - 1].open_time {
                return Err(CandleError::OutOfOrder {
                    index,
                    time: candle.open_time,
                });
            }
        }
        Ok(Self {
            market: market.into(),
            interval,
            candles,
        })
    }

    /// Keep only the most recent `lookback` candles.
    pub fn tail(mut self, lookback: usize) -> Self {
        if self.candles.len() > lookback {
            let start = self.candles.len() - lookback;
            self.candles.drain(..start);
        }
        self
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    pub fn interval(&self) -> CandleInterval {
        self.interval
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Close of the most recent candle.
    pub fn latest_close(&self) -> Option<f64> {
        self.candles.last().map(|c| c.close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle_at(hour: i64, close: f64) -> Candle {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + chrono::Duration::hours(hour);
        Candle::new(t, close, close + 1.0, close - 1.0, close, 10.0)
    }

    #[test]
    fn candle_is_sane() {
        assert!(candle_at(0, 100.0).is_sane());
    }

    #[test]
    fn candle_detects_void() {
        let mut c = candle_at(0, 100.0);
        c.open = f64::NAN;
        assert!(c.is_void());
        assert!(!c.is_sane());
    }

    #[test]
    fn candle_detects_insane_high_low() {
        let mut c = candle_at(0, 100.0);
        c.high = 98.0; // below low
        assert!(!c.is_sane());
    }

    #[test]
    fn series_rejects_duplicate_time() {
        let candles = vec![candle_at(0, 100.0), candle_at(0, 101.0)];
        let err = CandleSeries::new("ADAUSD", CandleInterval::H1, candles).unwrap_err();
        assert!(matches!(err, CandleError::OutOfOrder { index: 1, .. }));
    }

    #[test]
    fn series_rejects_insane_candle() {
        let mut bad = candle_at(1, 100.0);
        bad.close = 200.0;
        let err =
            CandleSeries::new("ADAUSD", CandleInterval::H1, vec![candle_at(0, 100.0), bad])
                .unwrap_err();
        assert!(matches!(err, CandleError::Insane { index: 1, .. }));
    }

    #[test]
    fn tail_keeps_most_recent() {
        let candles: Vec<Candle> = (0..10).map(|h| candle_at(h, 100.0 + h as f64)).collect();
        let series = CandleSeries::new("ADAUSD", CandleInterval::H1, candles)
            .unwrap()
            .tail(3);
        assert_eq!(series.len(), 3);
        assert_eq!(series.latest_close(), Some(109.0));
        assert_eq!(series.candles()[0].close, 107.0);
    }

    #[test]
    fn interval_from_minutes() {
        assert_eq!(CandleInterval::try_from(240).unwrap(), CandleInterval::H4);
        assert_eq!(
            CandleInterval::try_from(7),
            Err(CandleError::UnsupportedInterval(7))
        );
    }

    #[test]
    fn interval_serializes_as_minutes() {
        let json = serde_json::to_string(&CandleInterval::D1).unwrap();
        assert_eq!(json, "1440");
        let back: CandleInterval = serde_json::from_str("60").unwrap();
        assert_eq!(back, CandleInterval::H1);
        assert!(serde_json::from_str::<CandleInterval>("61").is_err());
    }
}
