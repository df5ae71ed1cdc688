//! Exchange boundary: the collaborator traits the engine talks to.
//!
//! The core never speaks HTTP to place orders itself. It sees an
//! [`Exchange`] (account + orders) and a [`CandleSource`] (market data).
//! Retry policy for transport errors lives in the execution manager,
//! not in implementations of these traits.

pub mod paper;

pub use paper::{PaperBook, PaperExchange, PaperSettings, RememberedOrder};

use thiserror::Error;

use crate::domain::{AccountState, CandleError, CandleInterval, CandleSeries, OrderRequest, OrderResult};

/// Structured errors at the exchange boundary.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited by exchange (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("exchange API error: {0}")]
    Api(String),

    #[error("unexpected response format: {0}")]
    Parse(String),

    #[error("no candles returned for {market}")]
    NoData { market: String },

    #[error(transparent)]
    Candle(#[from] CandleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExchangeError {
    /// Timeouts, connectivity failures, rate limits and 5xx responses.
    ///
    /// Everything else is a definitive answer and must not be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) | Self::RateLimited { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            Self::Transport(e.to_string())
        } else if e.is_decode() {
            Self::Parse(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Market data provider.
pub trait CandleSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// The most recent `lookback` candles, oldest first.
    fn get_candles(
        &self,
        market: &str,
        interval: CandleInterval,
        lookback: usize,
    ) -> Result<CandleSeries, ExchangeError>;
}

/// Account and order surface of a margin exchange.
pub trait Exchange: CandleSource {
    fn get_account_state(&self, market: &str) -> Result<AccountState, ExchangeError>;

    /// Submit one order. `Ok(Rejected)` is a definitive refusal; `Err` is a
    /// failure to get an answer.
    fn submit_order(&mut self, order: &OrderRequest) -> Result<OrderResult, ExchangeError>;
}

impl<T: CandleSource + ?Sized> CandleSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get_candles(
        &self,
        market: &str,
        interval: CandleInterval,
        lookback: usize,
    ) -> Result<CandleSeries, ExchangeError> {
        (**self).get_candles(market, interval, lookback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ExchangeError::Timeout("t".into()).is_transient());
        assert!(ExchangeError::Transport("reset".into()).is_transient());
        assert!(ExchangeError::Http {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(!ExchangeError::Http {
            status: 400,
            message: "bad".into()
        }
        .is_transient());
        assert!(!ExchangeError::Api("EOrder:Insufficient funds".into()).is_transient());
    }
}
