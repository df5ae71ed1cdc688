//! Orders submitted to the exchange and their results.

use super::direction::Direction;
use super::ids::ClientOrderId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Side that increases exposure in `direction`. `None` for flat.
    pub fn opening(direction: Direction) -> Option<Self> {
        match direction {
            Direction::Long => Some(Self::Buy),
            Direction::Short => Some(Self::Sell),
            Direction::Flat => None,
        }
    }

    /// Side that reduces exposure in `direction`. `None` for flat.
    pub fn closing(direction: Direction) -> Option<Self> {
        Self::opening(direction).map(Self::opposite)
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
}

/// A single order as handed to the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: ClientOrderId,
    pub market: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Base-asset quantity.
    pub quantity: f64,
    pub leverage: u8,
    /// Only reduce an existing position; never open or flip.
    pub reduce_only: bool,
}

/// Exchange verdict on a submitted order.
///
/// Transport failures are not represented here; they surface as
/// `ExchangeError` from the submission call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderResult {
    Accepted { exchange_order_id: String },
    Rejected { reason: String },
}

impl OrderResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}
