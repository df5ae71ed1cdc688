//! Paper exchange: a simulated single-market margin account for dry runs.
//!
//! Market data comes from any [`CandleSource`]. Orders fill at the latest
//! close seen, a taker fee is charged in basis points, and the book is
//! persisted to JSON so consecutive invocations see the same account.

use std::cell::Cell;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::atomic::write_json_atomic;
use crate::domain::{
    AccountState, CandleInterval, CandleSeries, Direction, ExchangePosition, OrderRequest,
    OrderResult, OrderSide,
};
use crate::exchange::{CandleSource, Exchange, ExchangeError};

/// Idempotency memory: client order ids remembered for replay detection.
const REMEMBERED_ORDERS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaperSettings {
    pub starting_balance: f64,
    pub fee_bps: f64,
    /// Exposure limit as a multiple of equity.
    pub max_leverage: f64,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            starting_balance: 1_000.0,
            fee_bps: 26.0,
            max_leverage: 5.0,
        }
    }
}

/// Persisted account book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperBook {
    /// Cash balance including realized PnL, net of fees.
    pub balance: f64,
    /// Signed position quantity; positive is long.
    pub position_qty: f64,
    pub entry_price: f64,
    pub fees_paid: f64,
    pub last_price: Option<f64>,
    pub order_seq: u64,
    /// Oldest first.
    #[serde(default)]
    pub recent_orders: Vec<RememberedOrder>,
}

/// A filled order kept for replay detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RememberedOrder {
    pub client_order_id: String,
    pub exchange_order_id: String,
    pub side: OrderSide,
    pub quantity: f64,
}

impl RememberedOrder {
    fn matches(&self, order: &OrderRequest) -> bool {
        self.side == order.side && self.quantity == order.quantity
    }
}

impl PaperBook {
    pub fn new(balance: f64) -> Self {
        Self {
            balance,
            position_qty: 0.0,
            entry_price: 0.0,
            fees_paid: 0.0,
            last_price: None,
            order_seq: 0,
            recent_orders: Vec::new(),
        }
    }

    pub fn unrealized_pnl(&self, mark: f64) -> f64 {
        self.position_qty * (mark - self.entry_price)
    }

    pub fn equity(&self, mark: f64) -> f64 {
        self.balance + self.unrealized_pnl(mark)
    }

    pub fn position(&self) -> ExchangePosition {
        let direction = if self.position_qty > 0.0 {
            Direction::Long
        } else if self.position_qty < 0.0 {
            Direction::Short
        } else {
            Direction::Flat
        };
        ExchangePosition::new(direction, self.position_qty.abs(), Some(self.entry_price))
    }

    fn remembered(&self, client_order_id: &str) -> Option<&RememberedOrder> {
        self.recent_orders
            .iter()
            .find(|o| o.client_order_id == client_order_id)
    }

    /// Apply a fill of `delta` (signed) at `price`.
    fn fill(&mut self, delta: f64, price: f64, fee: f64) {
        let old = self.position_qty;
        let new = old + delta;

        if old != 0.0 && old.signum() != delta.signum() {
            let closed = delta.abs().min(old.abs());
            self.balance += closed * (price - self.entry_price) * old.signum();
        }

        if new.abs() < f64::EPSILON {
            self.position_qty = 0.0;
            self.entry_price = 0.0;
        } else if old == 0.0 || old.signum() != new.signum() {
            self.position_qty = new;
            self.entry_price = price;
        } else if new.abs() > old.abs() {
            self.entry_price = (old.abs() * self.entry_price + delta.abs() * price) / new.abs();
            self.position_qty = new;
        } else {
            self.position_qty = new;
        }

        self.balance -= fee;
        self.fees_paid += fee;
    }
}

pub struct PaperExchange<S> {
    source: S,
    settings: PaperSettings,
    book: PaperBook,
    book_path: Option<PathBuf>,
    mark: Cell<Option<f64>>,
}

impl<S: CandleSource> PaperExchange<S> {
    /// In-memory paper account.
    pub fn new(source: S, settings: PaperSettings) -> Self {
        let book = PaperBook::new(settings.starting_balance);
        Self {
            source,
            settings,
            mark: Cell::new(book.last_price),
            book,
            book_path: None,
        }
    }

    /// Paper account backed by a JSON book; a missing file starts a fresh account.
    pub fn open(
        source: S,
        settings: PaperSettings,
        path: impl Into<PathBuf>,
    ) -> Result<Self, ExchangeError> {
        let path = path.into();
        let book = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                ExchangeError::Parse(format!("paper book {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), balance = settings.starting_balance, "starting fresh paper account");
                PaperBook::new(settings.starting_balance)
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            source,
            settings,
            mark: Cell::new(book.last_price),
            book,
            book_path: Some(path),
        })
    }

    pub fn book(&self) -> &PaperBook {
        &self.book
    }

    pub fn book_path(&self) -> Option<&Path> {
        self.book_path.as_deref()
    }

    fn mark_price(&self) -> Option<f64> {
        self.mark.get().or(self.book.last_price)
    }

    fn persist(&self) -> Result<(), ExchangeError> {
        if let Some(path) = &self.book_path {
            write_json_atomic(path, &self.book)?;
        }
        Ok(())
    }

    fn reject(reason: &str) -> OrderResult {
        OrderResult::Rejected {
            reason: reason.to_string(),
        }
    }
}

impl<S: CandleSource> CandleSource for PaperExchange<S> {
    fn name(&self) -> &str {
        "paper"
    }

    fn get_candles(
        &self,
        market: &str,
        interval: CandleInterval,
        lookback: usize,
    ) -> Result<CandleSeries, ExchangeError> {
        let series = self.source.get_candles(market, interval, lookback)?;
        if let Some(close) = series.latest_close() {
            self.mark.set(Some(close));
        }
        Ok(series)
    }
}

impl<S: CandleSource> Exchange for PaperExchange<S> {
    fn get_account_state(&self, _market: &str) -> Result<AccountState, ExchangeError> {
        let equity = match self.mark_price() {
            Some(mark) => self.book.equity(mark),
            None => self.book.balance,
        };
        Ok(AccountState {
            equity,
            position: self.book.position(),
        })
    }

    fn submit_order(&mut self, order: &OrderRequest) -> Result<OrderResult, ExchangeError> {
        if let Some(existing) = self.book.remembered(&order.client_order_id.0) {
            if !existing.matches(order) {
                warn!(
                    client_order_id = %order.client_order_id,
                    side = %order.side,
                    quantity = order.quantity,
                    "client order id reused for a different order"
                );
                return Ok(Self::reject("client order id reused for a different order"));
            }
            debug!(client_order_id = %order.client_order_id, "replayed order, returning prior fill");
            return Ok(OrderResult::Accepted {
                exchange_order_id: existing.exchange_order_id.clone(),
            });
        }

        let price = self
            .mark_price()
            .ok_or_else(|| ExchangeError::Api("no market price for paper fill".into()))?;
        if order.quantity <= 0.0 || !order.quantity.is_finite() {
            return Ok(Self::reject("invalid quantity"));
        }

        let delta = match order.side {
            OrderSide::Buy => order.quantity,
            OrderSide::Sell => -order.quantity,
        };
        let old = self.book.position_qty;
        let new = old + delta;

        if order.reduce_only && (new.abs() > old.abs() + 1e-12 || new * old < 0.0) {
            return Ok(Self::reject("reduce-only order would increase position"));
        }

        let fee = order.quantity * price * self.settings.fee_bps / 10_000.0;
        let equity_after_fee = self.book.equity(price) - fee;
        let exposure = new.abs() * price;
        if new.abs() > old.abs() && exposure > equity_after_fee * self.settings.max_leverage {
            return Ok(Self::reject("insufficient margin"));
        }

        self.book.fill(delta, price, fee);
        self.book.last_price = Some(price);
        self.book.order_seq += 1;
        let exchange_order_id = format!("PAPER-{:06}", self.book.order_seq);
        self.book.recent_orders.push(RememberedOrder {
            client_order_id: order.client_order_id.0.clone(),
            exchange_order_id: exchange_order_id.clone(),
            side: order.side,
            quantity: order.quantity,
        });
        if self.book.recent_orders.len() > REMEMBERED_ORDERS {
            let excess = self.book.recent_orders.len() - REMEMBERED_ORDERS;
            self.book.recent_orders.drain(..excess);
        }
        self.persist()?;

        info!(
            side = %order.side,
            quantity = order.quantity,
            price,
            fee,
            position = self.book.position_qty,
            "paper fill"
        );
        Ok(OrderResult::Accepted { exchange_order_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SyntheticCandles;
    use crate::domain::{ClientOrderId, OrderType, RunId};

    fn exchange() -> PaperExchange<SyntheticCandles> {
        let ex = PaperExchange::new(SyntheticCandles::new(7), PaperSettings::default());
        ex.mark.set(Some(100.0));
        ex
    }

    fn order(leg: usize, side: OrderSide, quantity: f64, reduce_only: bool) -> OrderRequest {
        OrderRequest {
            client_order_id: ClientOrderId::for_leg(
                &RunId::new("paper-test"),
                "inv",
                leg,
                side,
                quantity,
            ),
            market: "ADAUSD".into(),
            side,
            order_type: OrderType::Market,
            quantity,
            leverage: 3,
            reduce_only,
        }
    }

    #[test]
    fn opens_and_reports_position() {
        let mut ex = exchange();
        let r = ex.submit_order(&order(0, OrderSide::Buy, 10.0, false)).unwrap();
        assert!(r.is_accepted());
        let state = ex.get_account_state("ADAUSD").unwrap();
        assert_eq!(state.position.direction, Direction::Long);
        assert_eq!(state.position.quantity, 10.0);
        // fee: 10 * 100 * 26bps = 2.6
        assert!((state.equity - 997.4).abs() < 1e-9);
    }

    #[test]
    fn rejects_over_margin() {
        let mut ex = exchange();
        // 60 * 100 = 6000 > 1000 * 5
        let r = ex.submit_order(&order(0, OrderSide::Buy, 60.0, false)).unwrap();
        assert_eq!(
            r,
            OrderResult::Rejected {
                reason: "insufficient margin".into()
            }
        );
    }

    #[test]
    fn close_realizes_pnl() {
        let mut ex = exchange();
        ex.submit_order(&order(0, OrderSide::Buy, 10.0, false)).unwrap();
        ex.mark.set(Some(110.0));
        ex.submit_order(&order(1, OrderSide::Sell, 10.0, true)).unwrap();
        let book = ex.book();
        assert_eq!(book.position_qty, 0.0);
        // +100 pnl, fees 2.6 + 2.86
        assert!((book.balance - (1000.0 + 100.0 - 2.6 - 2.86)).abs() < 1e-9);
    }

    #[test]
    fn reduce_only_cannot_flip() {
        let mut ex = exchange();
        ex.submit_order(&order(0, OrderSide::Buy, 5.0, false)).unwrap();
        let r = ex.submit_order(&order(1, OrderSide::Sell, 8.0, true)).unwrap();
        assert!(!r.is_accepted());
    }

    #[test]
    fn replayed_client_id_does_not_fill_twice() {
        let mut ex = exchange();
        let first = ex.submit_order(&order(0, OrderSide::Buy, 5.0, false)).unwrap();
        let second = ex.submit_order(&order(0, OrderSide::Buy, 5.0, false)).unwrap();
        assert_eq!(first, second);
        assert_eq!(ex.book().position_qty, 5.0);
    }

    #[test]
    fn reused_client_id_with_different_order_is_rejected() {
        let mut ex = exchange();
        let first = order(0, OrderSide::Buy, 5.0, false);
        ex.submit_order(&first).unwrap();

        let mut flipped = order(0, OrderSide::Sell, 5.0, false);
        flipped.client_order_id = first.client_order_id.clone();
        let r = ex.submit_order(&flipped).unwrap();
        assert!(!r.is_accepted());

        let mut resized = order(0, OrderSide::Buy, 7.0, false);
        resized.client_order_id = first.client_order_id.clone();
        assert!(!ex.submit_order(&resized).unwrap().is_accepted());
        assert_eq!(ex.book().position_qty, 5.0);
    }

    #[test]
    fn book_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.json");
        {
            let mut ex =
                PaperExchange::open(SyntheticCandles::new(7), PaperSettings::default(), &path)
                    .unwrap();
            ex.mark.set(Some(100.0));
            ex.submit_order(&order(0, OrderSide::Sell, 3.0, false)).unwrap();
        }
        let ex = PaperExchange::open(SyntheticCandles::new(7), PaperSettings::default(), &path)
            .unwrap();
        let state = ex.get_account_state("ADAUSD").unwrap();
        assert_eq!(state.position.direction, Direction::Short);
        assert_eq!(state.position.quantity, 3.0);
    }
}
