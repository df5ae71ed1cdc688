//! Candle sources: Kraken public OHLC, CSV import, and seeded synthetic series.
//!
//! All sources return a validated [`CandleSeries`](crate::domain::CandleSeries)
//! truncated to the requested lookback, oldest first.

pub mod csv_file;
pub mod kraken;
pub mod synthetic;

pub use csv_file::CsvCandles;
pub use kraken::KrakenCandles;
pub use synthetic::SyntheticCandles;
