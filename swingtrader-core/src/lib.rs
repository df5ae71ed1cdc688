//! SwingTrader Core: the decision-and-risk engine of a single-market swing trader.
//!
//! This crate contains everything one invocation decides with:
//! - Domain types (candles, swing points, signals, risk state, orders, positions)
//! - Swing detection at intermediate and long-term structural levels
//! - The long/short/flat signal engine
//! - The drawdown / balance-floor risk guard
//! - Leveraged position sizing with a hard full-margin ceiling
//! - Execution planning and bounded-retry order submission
//! - The exchange boundary traits plus bundled candle sources and a paper exchange

pub mod atomic;
pub mod data;
pub mod domain;
pub mod exchange;
pub mod execution;
pub mod risk;
pub mod signals;
pub mod sizers;
pub mod swing;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: core value types are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::CandleSeries>();
        require_sync::<domain::CandleSeries>();
        require_send::<domain::SwingStructure>();
        require_sync::<domain::SwingStructure>();
        require_send::<domain::RiskState>();
        require_sync::<domain::RiskState>();
        require_send::<domain::PositionIntent>();
        require_sync::<domain::PositionIntent>();
        require_send::<signals::Signal>();
        require_sync::<signals::Signal>();
        require_send::<execution::ExecutionPlan>();
        require_sync::<execution::ExecutionPlan>();
        require_send::<execution::ExecutionReport>();
        require_sync::<execution::ExecutionReport>();
        require_send::<risk::RiskDecision>();
        require_sync::<risk::RiskDecision>();
    }

    /// Architecture contract: the signal engine never sees account or position state.
    ///
    /// `evaluate()` takes a swing structure and a price, nothing else. If an
    /// account parameter is ever added, this stops compiling.
    #[test]
    fn signal_engine_has_no_account_parameter() {
        fn _check(
            engine: &signals::SignalEngine,
            structure: &domain::SwingStructure,
            price: f64,
        ) -> signals::Signal {
            engine.evaluate(structure, price)
        }
    }

    /// Architecture contract: sizing does not see the exchange position.
    #[test]
    fn sizer_has_no_position_parameter() {
        fn _check(
            sizer: &dyn sizers::Sizer,
            signal: &signals::Signal,
        ) -> domain::PositionIntent {
            sizer.size(1000.0, signal.direction, signal, None)
        }
    }
}
