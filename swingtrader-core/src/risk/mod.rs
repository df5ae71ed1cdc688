//! Risk guard: drawdown circuit breaker, balance floor, per-trade loss ceiling.

pub mod guard;

pub use guard::{
    worst_case_loss, ModeTransition, RiskDecision, RiskGuard, RiskLimits, Verdict, VetoReason,
};
