use super::direction::Direction;
use serde::{Deserialize, Serialize};

/// Position as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub direction: Direction,
    /// Base-asset quantity, always >= 0. Zero when flat.
    pub quantity: f64,
    pub entry_price: Option<f64>,
}

impl ExchangePosition {
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn new(direction: Direction, quantity: f64, entry_price: Option<f64>) -> Self {
        if direction.is_flat() || quantity <= 0.0 {
            return Self::flat();
        }
        Self {
            direction,
            quantity,
            entry_price,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.direction.is_flat() || self.quantity <= 0.0
    }

    /// Signed quantity: positive long, negative short.
    pub fn signed_quantity(&self) -> f64 {
        self.direction.sign() * self.quantity
    }
}

/// Account snapshot used for one run's decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    /// Account equity in quote currency (balance plus unrealised PnL).
    pub equity: f64,
    pub position: ExchangePosition,
}

/// Target exposure produced by the position sizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionIntent {
    pub direction: Direction,
    /// Total position value in quote currency, leverage included.
    pub notional_size: f64,
    /// Base-asset quantity at the reference price, rounded down to the lot step.
    pub quantity: f64,
    pub leverage: u8,
    pub stop_price: Option<f64>,
    pub reference_price: f64,
}

impl PositionIntent {
    pub fn flat(leverage: u8, reference_price: f64) -> Self {
        Self {
            direction: Direction::Flat,
            notional_size: 0.0,
            quantity: 0.0,
            leverage,
            stop_price: None,
            reference_price,
        }
    }

    /// Flat direction or nothing left to hold after rounding.
    pub fn is_flat(&self) -> bool {
        self.direction.is_flat() || self.quantity <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_quantity_position_normalises_to_flat() {
        let p = ExchangePosition::new(Direction::Long, 0.0, Some(1.0));
        assert!(p.is_flat());
        assert_eq!(p.direction, Direction::Flat);
    }

    #[test]
    fn signed_quantity() {
        assert_eq!(
            ExchangePosition::new(Direction::Short, 4.0, None).signed_quantity(),
            -4.0
        );
    }
}
