//! Diffing a [`PositionIntent`] against an [`ExchangePosition`].

use serde::{Deserialize, Serialize};

use crate::domain::{Direction, ExchangePosition, OrderSide, PositionIntent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegKind {
    /// Close the whole current position.
    Close,
    /// Open a new position from flat.
    Open,
    /// Partial close, same direction.
    Reduce,
    /// Add to the current position, same direction.
    Increase,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderAction {
    pub kind: LegKind,
    pub side: OrderSide,
    pub quantity: f64,
    pub reduce_only: bool,
}

/// Ordered legs. Closing legs always precede opening legs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionPlan {
    actions: Vec<OrderAction>,
}

impl ExecutionPlan {
    /// Minimal plan moving `current` to `intent`.
    ///
    /// `tolerance_pct` (0–100) is the relative size difference treated as "equal".
    pub fn diff(intent: &PositionIntent, current: &ExchangePosition, tolerance_pct: f64) -> Self {
        let target_dir = if intent.is_flat() {
            Direction::Flat
        } else {
            intent.direction
        };
        let current_dir = if current.is_flat() {
            Direction::Flat
        } else {
            current.direction
        };
        let mut actions = Vec::new();

        if target_dir == current_dir {
            if target_dir.is_flat() {
                return Self { actions };
            }
            let delta = intent.quantity - current.quantity;
            let tolerance = intent.quantity * tolerance_pct.max(0.0) / 100.0;
            if delta.abs() <= tolerance {
                return Self { actions };
            }
            // Both sides exist because direction is non-flat here.
            if let (Some(open), Some(close)) =
                (OrderSide::opening(target_dir), OrderSide::closing(target_dir))
            {
                actions.push(if delta > 0.0 {
                    OrderAction {
                        kind: LegKind::Increase,
                        side: open,
                        quantity: delta,
                        reduce_only: false,
                    }
                } else {
                    OrderAction {
                        kind: LegKind::Reduce,
                        side: close,
                        quantity: -delta,
                        reduce_only: true,
                    }
                });
            }
            return Self { actions };
        }

        if let Some(side) = OrderSide::closing(current_dir) {
            actions.push(OrderAction {
                kind: LegKind::Close,
                side,
                quantity: current.quantity,
                reduce_only: true,
            });
        }
        if let Some(side) = OrderSide::opening(target_dir) {
            actions.push(OrderAction {
                kind: LegKind::Open,
                side,
                quantity: intent.quantity,
                reduce_only: false,
            });
        }
        Self { actions }
    }

    pub fn actions(&self) -> &[OrderAction] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }
}
