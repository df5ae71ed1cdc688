//! Swing-structure detection over candle series.

pub mod detector;

pub use detector::{SwingDetector, SwingError, MIN_CONFIRMED_POINTS};
