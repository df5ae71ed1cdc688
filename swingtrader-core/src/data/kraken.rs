//! Kraken public OHLC provider.
//!
//! Fetches candles from `/0/public/OHLC`. No authentication is involved.
//! Transport errors, HTTP 429 and 5xx are retried with exponential backoff;
//! errors reported in the API's `error` array are returned as-is.

use std::time::Duration;

use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{Candle, CandleInterval, CandleSeries};
use crate::exchange::{CandleSource, ExchangeError};

pub const DEFAULT_BASE_URL: &str = "https://api.kraken.com";

#[derive(Debug, Deserialize)]
struct OhlcResponse {
    #[serde(default)]
    error: Vec<String>,
    result: Option<serde_json::Map<String, Value>>,
}

pub struct KrakenCandles {
    client: reqwest::blocking::Client,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl KrakenCandles {
    pub fn new(timeout: Duration) -> Result<Self, ExchangeError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("swingtrader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExchangeError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    fn ohlc_url(&self, market: &str, interval: CandleInterval) -> String {
        format!(
            "{}/0/public/OHLC?pair={market}&interval={}",
            self.base_url,
            interval.minutes()
        )
    }

    fn fetch_with_retry(&self, url: &str) -> Result<OhlcResponse, ExchangeError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                std::thread::sleep(delay);
            }

            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(ExchangeError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status.is_server_error() {
                        last_error = Some(ExchangeError::Http {
                            status: status.as_u16(),
                            message: format!("server error fetching {url}"),
                        });
                        continue;
                    }

                    if !status.is_success() {
                        return Err(ExchangeError::Http {
                            status: status.as_u16(),
                            message: format!("request to {url} failed"),
                        });
                    }

                    return resp
                        .json::<OhlcResponse>()
                        .map_err(|e| ExchangeError::Parse(format!("OHLC response: {e}")));
                }
                Err(e) => {
                    let err = ExchangeError::from(e);
                    if !err.is_transient() {
                        return Err(err);
                    }
                    warn!(attempt, error = %err, "OHLC request failed, retrying");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ExchangeError::Transport("all retries exhausted".into())))
    }
}

/// Turn an OHLC response body into a validated series.
///
/// Rows are `[time, open, high, low, close, vwap, volume, count]`; prices
/// come as decimal strings. The result object also carries a `last` cursor,
/// which is skipped.
fn parse_response(
    market: &str,
    interval: CandleInterval,
    resp: OhlcResponse,
    lookback: usize,
) -> Result<CandleSeries, ExchangeError> {
    if !resp.error.is_empty() {
        return Err(ExchangeError::Api(resp.error.join("; ")));
    }
    let result = resp
        .result
        .ok_or_else(|| ExchangeError::Parse("missing result object".into()))?;

    let rows = result
        .iter()
        .find(|(key, _)| key.as_str() != "last")
        .and_then(|(_, v)| v.as_array())
        .ok_or_else(|| ExchangeError::NoData {
            market: market.to_string(),
        })?;

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let row = row
            .as_array()
            .ok_or_else(|| ExchangeError::Parse("OHLC row is not an array".into()))?;
        let ts = row
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| ExchangeError::Parse("OHLC row without timestamp".into()))?;
        let open_time = DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| ExchangeError::Parse(format!("invalid timestamp: {ts}")))?;
        candles.push(Candle::new(
            open_time,
            number(row, 1)?,
            number(row, 2)?,
            number(row, 3)?,
            number(row, 4)?,
            number(row, 6)?,
        ));
    }

    if candles.is_empty() {
        return Err(ExchangeError::NoData {
            market: market.to_string(),
        });
    }
    debug!(market, count = candles.len(), "parsed OHLC rows");
    Ok(CandleSeries::new(market, interval, candles)?.tail(lookback))
}

fn number(row: &[Value], index: usize) -> Result<f64, ExchangeError> {
    match row.get(index) {
        Some(Value::String(s)) => s
            .parse::<f64>()
            .map_err(|e| ExchangeError::Parse(format!("column {index}: '{s}': {e}"))),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ExchangeError::Parse(format!("column {index}: {n}"))),
        _ => Err(ExchangeError::Parse(format!("column {index} missing"))),
    }
}

impl CandleSource for KrakenCandles {
    fn name(&self) -> &str {
        "kraken"
    }

    fn get_candles(
        &self,
        market: &str,
        interval: CandleInterval,
        lookback: usize,
    ) -> Result<CandleSeries, ExchangeError> {
        let url = self.ohlc_url(market, interval);
        let resp = self.fetch_with_retry(&url)?;
        parse_response(market, interval, resp, lookback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: &str) -> OhlcResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_rows_and_skips_last_cursor() {
        let resp = body(
            r#"{"error":[],"result":{
                "ADAUSD":[
                    [1704067200,"0.5900","0.6000","0.5800","0.5950","0.5900","1000.5",10],
                    [1704070800,"0.5950","0.6100","0.5900","0.6050","0.6000","2000.0",12],
                    [1704074400,"0.6050","0.6200","0.6000","0.6150","0.6100","1500.0",9]
                ],
                "last":1704074400}}"#,
        );
        let series = parse_response("ADAUSD", CandleInterval::H1, resp, 2).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.latest_close(), Some(0.615));
        assert_eq!(series.candles()[0].volume, 2000.0);
    }

    #[test]
    fn api_error_array_is_surfaced() {
        let resp = body(r#"{"error":["EQuery:Unknown asset pair"]}"#);
        let err = parse_response("XXXUSD", CandleInterval::H1, resp, 10).unwrap_err();
        assert!(matches!(err, ExchangeError::Api(ref m) if m.contains("Unknown asset pair")));
        assert!(!err.is_transient());
    }

    #[test]
    fn malformed_price_is_a_parse_error() {
        let resp = body(
            r#"{"error":[],"result":{"ADAUSD":[[1704067200,"abc","1","1","1","1","1",1]]}}"#,
        );
        let err = parse_response("ADAUSD", CandleInterval::H1, resp, 10).unwrap_err();
        assert!(matches!(err, ExchangeError::Parse(_)));
    }

    #[test]
    fn url_carries_pair_and_interval() {
        let src = KrakenCandles::new(Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://localhost:9/");
        assert_eq!(
            src.ohlc_url("ADAUSD", CandleInterval::H4),
            "http://localhost:9/0/public/OHLC?pair=ADAUSD&interval=240"
        );
    }
}
