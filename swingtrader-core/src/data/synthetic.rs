//! Seeded synthetic candles for dry runs and tests.

use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::{Candle, CandleInterval, CandleSeries};
use crate::exchange::{CandleSource, ExchangeError};

/// Random-walk candles. Identical seeds give identical series.
#[derive(Debug, Clone)]
pub struct SyntheticCandles {
    seed: u64,
    start_price: f64,
    /// Maximum fractional move per candle.
    volatility: f64,
    start: DateTime<Utc>,
}

impl SyntheticCandles {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            start_price: 100.0,
            volatility: 0.02,
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default(),
        }
    }

    pub fn with_start_price(mut self, price: f64) -> Self {
        self.start_price = price;
        self
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    pub fn generate(&self, count: usize, interval: CandleInterval) -> Vec<Candle> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let vol = self.volatility.abs().clamp(1e-6, 0.5);
        let mut close = self.start_price.max(1e-6);
        let mut candles = Vec::with_capacity(count);

        for i in 0..count {
            let open = close;
            close = (open * (1.0 + rng.gen_range(-vol..vol))).max(1e-6);
            let wick_up = rng.gen_range(0.0..vol / 2.0);
            let wick_down = rng.gen_range(0.0..vol / 2.0);
            let high = open.max(close) * (1.0 + wick_up);
            let low = open.min(close) * (1.0 - wick_down);
            let volume = rng.gen_range(100.0..10_000.0);
            let open_time = self.start + interval.duration() * i as i32;
            candles.push(Candle::new(open_time, open, high, low, close, volume));
        }
        candles
    }
}

impl CandleSource for SyntheticCandles {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn get_candles(
        &self,
        market: &str,
        interval: CandleInterval,
        lookback: usize,
    ) -> Result<CandleSeries, ExchangeError> {
        Ok(CandleSeries::new(
            market,
            interval,
            self.generate(lookback, interval),
        )?)
    }
}
