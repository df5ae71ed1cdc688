//! Position sizing: turns an approved direction into a concrete position intent.
//!
//! Sizers are equity-aware but signal-agnostic: they never change the
//! direction, only how much of it to hold.

pub mod leveraged;

pub use leveraged::{PositionSizer, SizingParams};

use crate::domain::{Direction, PositionIntent};
use crate::signals::Signal;

/// Position sizing logic.
///
/// # Responsibilities
/// - Convert equity + approved direction + risk cap → target position
/// - Never exceed the full-margin ceiling `equity × leverage`
///
/// # Non-Responsibilities
/// - Sizers do NOT decide direction (signal + risk guard do)
/// - Sizers do NOT know the current exchange position (execution does)
pub trait Sizer: Send + Sync {
    fn size(
        &self,
        equity: f64,
        direction: Direction,
        signal: &Signal,
        size_cap: Option<f64>,
    ) -> PositionIntent;

    /// Sizer name for journal/logging
    fn name(&self) -> &str;
}
