//! Risk state persisted between invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::RunId;

/// Circuit-breaker mode of the risk guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardMode {
    #[default]
    Normal,
    Halted,
}

impl fmt::Display for GuardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Halted => write!(f, "HALTED"),
        }
    }
}

/// The only record that survives between runs.
///
/// Read once at run start and written once at run end. Only the risk guard
/// produces new values of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    /// Monotonic high-water mark of observed equity. Zero until the first observation.
    pub peak_equity: f64,
    pub current_equity: f64,
    /// `current_equity - peak_equity` at the last observation (never positive).
    pub realized_pnl_since_peak: f64,
    pub trade_count: u64,
    pub last_run_time: Option<DateTime<Utc>>,
    pub circuit_breaker_tripped: bool,
    #[serde(default)]
    pub halt_reason: Option<String>,
    #[serde(default)]
    pub last_run_id: Option<RunId>,
    #[serde(default)]
    pub last_outcome: Option<String>,
    /// Set when the last run ended with a partial or failed execution.
    #[serde(default)]
    pub needs_reconcile: bool,
}

impl Default for RiskState {
    fn default() -> Self {
        Self {
            peak_equity: 0.0,
            current_equity: 0.0,
            realized_pnl_since_peak: 0.0,
            trade_count: 0,
            last_run_time: None,
            circuit_breaker_tripped: false,
            halt_reason: None,
            last_run_id: None,
            last_outcome: None,
            needs_reconcile: false,
        }
    }
}

impl RiskState {
    pub fn mode(&self) -> GuardMode {
        if self.circuit_breaker_tripped {
            GuardMode::Halted
        } else {
            GuardMode::Normal
        }
    }

    /// Fraction of peak lost at the last observation; 0.0 before any peak exists.
    pub fn drawdown(&self) -> f64 {
        drawdown(self.peak_equity, self.current_equity)
    }
}

/// `(peak - equity) / peak`, clamped to zero when there is no positive peak.
pub fn drawdown(peak_equity: f64, equity: f64) -> f64 {
    if peak_equity <= 0.0 {
        return 0.0;
    }
    (peak_equity - equity) / peak_equity
}
