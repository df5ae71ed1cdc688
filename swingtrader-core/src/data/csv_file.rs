//! CSV candle import.
//!
//! Expected header: `open_time,open,high,low,close,volume`, with
//! `open_time` in unix seconds. Rows must already be in time order.

use std::path::{Path, PathBuf};

use chrono::DateTime;
use serde::Deserialize;

use crate::domain::{Candle, CandleInterval, CandleSeries};
use crate::exchange::{CandleSource, ExchangeError};

#[derive(Debug, Deserialize)]
struct CsvRow {
    open_time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

pub struct CsvCandles {
    path: PathBuf,
}

impl CsvCandles {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_rows(&self) -> Result<Vec<Candle>, ExchangeError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| ExchangeError::Parse(format!("{}: {e}", self.path.display())))?;

        let mut candles = Vec::new();
        for (line, record) in reader.deserialize::<CsvRow>().enumerate() {
            let row = record.map_err(|e| {
                ExchangeError::Parse(format!("{} row {}: {e}", self.path.display(), line + 1))
            })?;
            let open_time = DateTime::from_timestamp(row.open_time, 0).ok_or_else(|| {
                ExchangeError::Parse(format!("invalid timestamp: {}", row.open_time))
            })?;
            candles.push(Candle::new(
                open_time, row.open, row.high, row.low, row.close, row.volume,
            ));
        }
        Ok(candles)
    }
}

impl CandleSource for CsvCandles {
    fn name(&self) -> &str {
        "csv"
    }

    fn get_candles(
        &self,
        market: &str,
        interval: CandleInterval,
        lookback: usize,
    ) -> Result<CandleSeries, ExchangeError> {
        let candles = self.read_rows()?;
        if candles.is_empty() {
            return Err(ExchangeError::NoData {
                market: market.to_string(),
            });
        }
        Ok(CandleSeries::new(market, interval, candles)?.tail(lookback))
    }
}
