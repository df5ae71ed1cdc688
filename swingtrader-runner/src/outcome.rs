//! Terminal outcome of one invocation and its process exit status.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Pipeline completed; the position already matched the intent.
    NoAction,
    /// Pipeline completed; every planned order was accepted.
    TradeExecuted,
    /// Too few candles for swing detection; nothing was sent to the exchange.
    InsufficientData,
    /// Risk guard vetoed or is halted; only risk-reducing orders, if any, were sent.
    RiskHalted,
    /// Some legs went through, a later one did not.
    PartialExecution,
    /// Unrecoverable failure, including a first leg that never went through.
    Fatal,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::NoAction => 0,
            Self::TradeExecuted => 10,
            Self::InsufficientData => 20,
            Self::RiskHalted => 21,
            Self::PartialExecution => 30,
            Self::Fatal => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoAction => "no_action",
            Self::TradeExecuted => "trade_executed",
            Self::InsufficientData => "insufficient_data",
            Self::RiskHalted => "risk_halted",
            Self::PartialExecution => "partial_execution",
            Self::Fatal => "fatal",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::NoAction | Self::TradeExecuted)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let all = [
            RunOutcome::NoAction,
            RunOutcome::TradeExecuted,
            RunOutcome::InsufficientData,
            RunOutcome::RiskHalted,
            RunOutcome::PartialExecution,
            RunOutcome::Fatal,
        ];
        let mut codes: Vec<i32> = all.iter().map(|o| o.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RunOutcome::PartialExecution).unwrap(),
            "\"partial_execution\""
        );
    }
}
