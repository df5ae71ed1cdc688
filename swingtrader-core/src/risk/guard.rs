//! Stateful gate between the signal and the sizer.
//!
//! The guard owns the run's copy of [`RiskState`]. It is the only place new
//! state values are produced; the coordinator persists whatever
//! [`RiskGuard::finish`] returns, exactly once per run.
//!
//! Mode transitions:
//! ```text
//! NORMAL --(equity < floor | drawdown >= max)--> HALTED
//! HALTED --(equity >= floor & drawdown < recovery, on a later run)--> NORMAL
//! ```
//! The trip boundary is inclusive. The recovery threshold sits below the trip
//! threshold so the breaker does not flap around a single level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{drawdown, Direction, GuardMode, RiskState, RunId};
use crate::signals::Signal;

/// Limits, all percentages expressed on a 0–100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_drawdown_pct: f64,
    /// Drawdown below which a halted guard resumes. Must be < `max_drawdown_pct`.
    pub drawdown_recovery_pct: f64,
    pub max_loss_per_trade_pct: f64,
    pub min_balance_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VetoReason {
    BalanceFloor { equity: f64, floor: f64 },
    Drawdown { drawdown_pct: f64, limit_pct: f64 },
    AwaitingRecovery { drawdown_pct: f64, recovery_pct: f64 },
}

impl std::fmt::Display for VetoReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BalanceFloor { equity, floor } => {
                write!(f, "balance floor breached: {equity:.2} < {floor:.2}")
            }
            Self::Drawdown {
                drawdown_pct,
                limit_pct,
            } => write!(f, "max drawdown reached: {drawdown_pct:.2}% >= {limit_pct:.2}%"),
            Self::AwaitingRecovery {
                drawdown_pct,
                recovery_pct,
            } => write!(
                f,
                "halted until drawdown recovers below {recovery_pct:.2}% (now {drawdown_pct:.2}%)"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Vetoed { reason: VetoReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeTransition {
    Halted,
    Resumed,
}

/// Outcome of one risk evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDecision {
    pub verdict: Verdict,
    /// Direction after the veto: the signal's direction if approved, flat otherwise.
    pub direction: Direction,
    /// Largest notional whose loss to the stop stays within the per-trade ceiling.
    pub size_cap: Option<f64>,
    /// Fraction of peak equity lost, measured against the peak before this run's update.
    pub drawdown: f64,
    pub mode: GuardMode,
    pub transition: Option<ModeTransition>,
}

impl RiskDecision {
    pub fn is_vetoed(&self) -> bool {
        matches!(self.verdict, Verdict::Vetoed { .. })
    }

    pub fn is_balance_floor(&self) -> bool {
        matches!(
            self.verdict,
            Verdict::Vetoed {
                reason: VetoReason::BalanceFloor { .. }
            }
        )
    }

    pub fn veto_reason(&self) -> Option<&VetoReason> {
        match &self.verdict {
            Verdict::Vetoed { reason } => Some(reason),
            Verdict::Approved => None,
        }
    }
}

pub struct RiskGuard {
    limits: RiskLimits,
    state: RiskState,
}

impl RiskGuard {
    pub fn new(limits: RiskLimits, state: RiskState) -> Self {
        Self { limits, state }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    /// Evaluate a proposed signal against current equity and update the run's state.
    pub fn evaluate(&mut self, signal: &Signal, equity: f64, now: DateTime<Utc>) -> RiskDecision {
        let was_halted = self.state.circuit_breaker_tripped;

        if self.state.peak_equity <= 0.0 {
            self.state.peak_equity = equity.max(0.0);
        }
        // Thresholds are compared as fractions; `dd_pct` is for reporting only.
        let dd = drawdown(self.state.peak_equity, equity);
        let dd_pct = dd * 100.0;

        let mut veto = None;
        if equity < self.limits.min_balance_usd {
            self.trip("balance floor breached");
            veto = Some(VetoReason::BalanceFloor {
                equity,
                floor: self.limits.min_balance_usd,
            });
        } else if dd >= self.limits.max_drawdown_pct / 100.0 {
            self.trip("max drawdown reached");
            if !signal.direction.is_flat() {
                veto = Some(VetoReason::Drawdown {
                    drawdown_pct: dd_pct,
                    limit_pct: self.limits.max_drawdown_pct,
                });
            }
        } else if was_halted {
            if dd < self.limits.drawdown_recovery_pct / 100.0 {
                self.state.circuit_breaker_tripped = false;
                self.state.halt_reason = None;
                info!(
                    drawdown_pct = dd_pct,
                    recovery_pct = self.limits.drawdown_recovery_pct,
                    "risk guard resumed"
                );
            } else if !signal.direction.is_flat() {
                veto = Some(VetoReason::AwaitingRecovery {
                    drawdown_pct: dd_pct,
                    recovery_pct: self.limits.drawdown_recovery_pct,
                });
            }
        }

        // High-water mark moves only upwards, after the drawdown is measured.
        if equity > self.state.peak_equity {
            self.state.peak_equity = equity;
        }
        self.state.current_equity = equity;
        self.state.realized_pnl_since_peak = equity - self.state.peak_equity;
        self.state.last_run_time = Some(now);

        let is_halted = self.state.circuit_breaker_tripped;
        let transition = match (was_halted, is_halted) {
            (false, true) => Some(ModeTransition::Halted),
            (true, false) => Some(ModeTransition::Resumed),
            _ => None,
        };

        let (verdict, direction, size_cap) = match veto {
            Some(reason) => {
                warn!(%reason, signal = %signal.direction, "signal vetoed");
                (Verdict::Vetoed { reason }, Direction::Flat, None)
            }
            None => {
                let cap = (!signal.direction.is_flat())
                    .then(|| self.max_notional_for_loss(signal, equity));
                (Verdict::Approved, signal.direction, cap)
            }
        };

        RiskDecision {
            verdict,
            direction,
            size_cap,
            drawdown: dd,
            mode: self.state.mode(),
            transition,
        }
    }

    /// Largest notional whose loss to the signal's stop is within the per-trade ceiling.
    ///
    /// A signal with no usable stop distance gets a cap of zero: its loss cannot be bounded.
    pub fn max_notional_for_loss(&self, signal: &Signal, equity: f64) -> f64 {
        let budget = equity.max(0.0) * self.limits.max_loss_per_trade_pct / 100.0;
        match signal.stop_distance_fraction() {
            Some(fraction) => budget / fraction,
            None => 0.0,
        }
    }

    /// Fold the execution result into the run's state.
    pub fn record_execution(&mut self, orders_accepted: usize, needs_reconcile: bool) {
        if orders_accepted > 0 {
            self.state.trade_count += 1;
        }
        self.state.needs_reconcile = needs_reconcile;
    }

    /// Close out the run and hand back the state to persist.
    pub fn finish(mut self, run_id: &RunId, outcome: &str, now: DateTime<Utc>) -> RiskState {
        self.state.last_run_id = Some(run_id.clone());
        self.state.last_outcome = Some(outcome.to_string());
        self.state.last_run_time = Some(now);
        self.state
    }

    fn trip(&mut self, reason: &str) {
        if !self.state.circuit_breaker_tripped {
            warn!(reason, "risk guard halted");
        }
        self.state.circuit_breaker_tripped = true;
        self.state.halt_reason = Some(reason.to_string());
    }
}

/// Loss if a position of `notional` is exited at the signal's stop.
pub fn worst_case_loss(signal: &Signal, notional: f64) -> Option<f64> {
    signal.stop_distance_fraction().map(|f| notional * f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalReason;
    use chrono::TimeZone;

    fn limits() -> RiskLimits {
        RiskLimits {
            max_drawdown_pct: 20.0,
            drawdown_recovery_pct: 10.0,
            max_loss_per_trade_pct: 5.0,
            min_balance_usd: 10.0,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap()
    }

    fn long_signal(price: f64, stop: f64) -> Signal {
        Signal {
            direction: Direction::Long,
            stop_price: Some(stop),
            reference_swing: None,
            reason: SignalReason::Uptrend,
            price,
        }
    }

    fn state(peak: f64, tripped: bool) -> RiskState {
        RiskState {
            peak_equity: peak,
            current_equity: peak,
            circuit_breaker_tripped: tripped,
            ..RiskState::default()
        }
    }

    #[test]
    fn fresh_state_initialises_peak() {
        let mut guard = RiskGuard::new(limits(), RiskState::default());
        let d = guard.evaluate(&long_signal(100.0, 98.0), 1000.0, now());
        assert_eq!(d.verdict, Verdict::Approved);
        assert_eq!(guard.state().peak_equity, 1000.0);
        assert_eq!(guard.state().last_run_time, Some(now()));
    }

    #[test]
    fn balance_floor_vetoes_even_flat() {
        let mut guard = RiskGuard::new(limits(), state(1000.0, false));
        let d = guard.evaluate(&Signal::flat(SignalReason::Contradictory, 1.0), 5.0, now());
        assert!(d.is_balance_floor());
        assert_eq!(d.direction, Direction::Flat);
        assert_eq!(d.mode, GuardMode::Halted);
        assert_eq!(d.transition, Some(ModeTransition::Halted));
    }

    #[test]
    fn drawdown_boundary_is_inclusive() {
        let mut guard = RiskGuard::new(limits(), state(1000.0, false));
        let d = guard.evaluate(&long_signal(100.0, 98.0), 800.0, now());
        assert!((d.drawdown - 0.2).abs() < 1e-12);
        assert_eq!(d.mode, GuardMode::Halted);
        assert!(matches!(
            d.veto_reason(),
            Some(VetoReason::Drawdown { .. })
        ));
        assert_eq!(d.direction, Direction::Flat);
    }

    #[test]
    fn drawdown_boundary_holds_for_inexact_percentages() {
        // 570 / 1000 is exactly 57%, but 0.57 * 100 rounds below 57.
        let tight = RiskLimits {
            max_drawdown_pct: 57.0,
            drawdown_recovery_pct: 30.0,
            ..limits()
        };
        let mut guard = RiskGuard::new(tight, state(1000.0, false));
        let d = guard.evaluate(&long_signal(100.0, 98.0), 430.0, now());
        assert_eq!(d.mode, GuardMode::Halted);
        assert!(matches!(d.veto_reason(), Some(VetoReason::Drawdown { .. })));
    }

    #[test]
    fn recovery_boundary_is_exclusive_for_inexact_percentages() {
        let wide = RiskLimits {
            max_drawdown_pct: 60.0,
            drawdown_recovery_pct: 57.0,
            ..limits()
        };
        let mut guard = RiskGuard::new(wide, state(1000.0, true));
        let d = guard.evaluate(&long_signal(100.0, 98.0), 430.0, now());
        assert_eq!(d.mode, GuardMode::Halted);
        assert!(matches!(
            d.veto_reason(),
            Some(VetoReason::AwaitingRecovery { .. })
        ));
    }

    #[test]
    fn just_below_boundary_is_approved() {
        let mut guard = RiskGuard::new(limits(), state(1000.0, false));
        let d = guard.evaluate(&long_signal(100.0, 98.0), 800.01, now());
        assert_eq!(d.verdict, Verdict::Approved);
        assert_eq!(d.mode, GuardMode::Normal);
    }

    #[test]
    fn halt_is_sticky_inside_hysteresis_band() {
        // drawdown 15%: below trip (20) but above recovery (10)
        let mut guard = RiskGuard::new(limits(), state(1000.0, true));
        let d = guard.evaluate(&long_signal(100.0, 98.0), 850.0, now());
        assert!(matches!(
            d.veto_reason(),
            Some(VetoReason::AwaitingRecovery { .. })
        ));
        assert_eq!(d.mode, GuardMode::Halted);
        assert_eq!(d.transition, None);
    }

    #[test]
    fn recovers_below_recovery_threshold() {
        let mut guard = RiskGuard::new(limits(), state(1000.0, true));
        let d = guard.evaluate(&long_signal(100.0, 98.0), 950.0, now());
        assert_eq!(d.verdict, Verdict::Approved);
        assert_eq!(d.transition, Some(ModeTransition::Resumed));
        assert!(!guard.state().circuit_breaker_tripped);
    }

    #[test]
    fn halted_flat_signal_is_not_vetoed() {
        let mut guard = RiskGuard::new(limits(), state(1000.0, true));
        let d = guard.evaluate(&Signal::flat(SignalReason::Indeterminate, 1.0), 850.0, now());
        assert_eq!(d.verdict, Verdict::Approved);
        assert_eq!(d.direction, Direction::Flat);
        assert_eq!(d.mode, GuardMode::Halted);
    }

    #[test]
    fn peak_is_monotonic() {
        let mut guard = RiskGuard::new(limits(), state(1000.0, false));
        guard.evaluate(&long_signal(100.0, 98.0), 1200.0, now());
        assert_eq!(guard.state().peak_equity, 1200.0);
        let mut guard = RiskGuard::new(limits(), guard.state().clone());
        guard.evaluate(&long_signal(100.0, 98.0), 1100.0, now());
        assert_eq!(guard.state().peak_equity, 1200.0);
        assert_eq!(guard.state().realized_pnl_since_peak, -100.0);
    }

    #[test]
    fn per_trade_cap_bounds_loss() {
        let guard = RiskGuard::new(limits(), state(1000.0, false));
        let sig = long_signal(100.0, 98.0);
        let cap = guard.max_notional_for_loss(&sig, 1000.0);
        // 5% of 1000 = 50 budget; 2% stop distance -> 2500 notional
        assert!((cap - 2500.0).abs() < 1e-9);
        assert!((worst_case_loss(&sig, cap).unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn unusable_stop_caps_to_zero() {
        let guard = RiskGuard::new(limits(), state(1000.0, false));
        assert_eq!(guard.max_notional_for_loss(&long_signal(100.0, 101.0), 1000.0), 0.0);
    }

    #[test]
    fn finish_records_run_metadata() {
        let mut guard = RiskGuard::new(limits(), state(1000.0, false));
        guard.evaluate(&long_signal(100.0, 98.0), 1000.0, now());
        guard.record_execution(2, true);
        let s = guard.finish(&RunId::new("r1"), "partial_execution", now());
        assert_eq!(s.trade_count, 1);
        assert!(s.needs_reconcile);
        assert_eq!(s.last_run_id, Some(RunId::new("r1")));
        assert_eq!(s.last_outcome.as_deref(), Some("partial_execution"));
    }
}
