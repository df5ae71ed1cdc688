//! ExecutionManager: submits a plan leg by leg.
//!
//! Legs run strictly in plan order; a leg must be accepted before the next
//! one is submitted. A rejection or an exhausted retry budget stops the
//! plan, and the legs after it are reported as skipped.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::{
    ClientOrderId, ExchangePosition, OrderRequest, OrderResult, OrderType, PositionIntent, RunId,
};
use crate::exchange::{Exchange, ExchangeError};
use crate::execution::plan::{ExecutionPlan, OrderAction};
use crate::execution::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: ExchangeError,
    },

    #[error(transparent)]
    Exchange(ExchangeError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LegOutcome {
    Accepted {
        exchange_order_id: String,
        attempts: u32,
    },
    Rejected {
        reason: String,
        attempts: u32,
    },
    Failed {
        error: String,
        attempts: u32,
    },
    /// Not submitted because an earlier leg did not go through.
    Skipped,
}

impl LegOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegReport {
    pub leg: usize,
    pub action: OrderAction,
    pub client_order_id: ClientOrderId,
    pub outcome: LegOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Empty plan.
    NoAction,
    /// Every leg accepted.
    Completed,
    /// At least one leg accepted, then a later leg failed.
    Partial,
    /// The first leg failed; nothing changed on the exchange.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub run_id: RunId,
    pub plan: ExecutionPlan,
    pub legs: Vec<LegReport>,
    pub status: ExecutionStatus,
}

impl ExecutionReport {
    pub fn accepted_count(&self) -> usize {
        self.legs.iter().filter(|l| l.outcome.is_accepted()).count()
    }

    /// The next run must reconcile against the exchange before trusting its plan.
    pub fn needs_reconcile(&self) -> bool {
        matches!(self.status, ExecutionStatus::Partial | ExecutionStatus::Failed)
    }

    /// The leg that stopped the plan, if any.
    pub fn failed_leg(&self) -> Option<&LegReport> {
        self.legs
            .iter()
            .find(|l| matches!(l.outcome, LegOutcome::Rejected { .. } | LegOutcome::Failed { .. }))
    }
}

pub struct ExecutionManager {
    market: String,
    retry: RetryPolicy,
    size_tolerance_pct: f64,
    /// Distinguishes invocations that share a run id.
    invocation: String,
}

impl ExecutionManager {
    pub fn new(market: impl Into<String>, retry: RetryPolicy, size_tolerance_pct: f64) -> Self {
        Self {
            market: market.into(),
            retry,
            size_tolerance_pct,
            invocation: String::new(),
        }
    }

    /// Token mixed into every client order id of this invocation.
    pub fn with_invocation(mut self, token: impl Into<String>) -> Self {
        self.invocation = token.into();
        self
    }

    pub fn plan(&self, intent: &PositionIntent, current: &ExchangePosition) -> ExecutionPlan {
        ExecutionPlan::diff(intent, current, self.size_tolerance_pct)
    }

    /// Plan and execute. Running it again with the updated position yields no action.
    pub fn execute<E: Exchange + ?Sized>(
        &self,
        exchange: &mut E,
        run_id: &RunId,
        intent: &PositionIntent,
        current: &ExchangePosition,
    ) -> ExecutionReport {
        let plan = self.plan(intent, current);
        self.execute_plan(exchange, run_id, plan, intent.leverage)
    }

    pub fn execute_plan<E: Exchange + ?Sized>(
        &self,
        exchange: &mut E,
        run_id: &RunId,
        plan: ExecutionPlan,
        leverage: u8,
    ) -> ExecutionReport {
        let mut legs = Vec::with_capacity(plan.len());
        let mut halted = false;

        for (leg, action) in plan.actions().iter().enumerate() {
            let client_order_id = ClientOrderId::for_leg(
                run_id,
                &self.invocation,
                leg,
                action.side,
                action.quantity,
            );
            if halted {
                legs.push(LegReport {
                    leg,
                    action: *action,
                    client_order_id,
                    outcome: LegOutcome::Skipped,
                });
                continue;
            }

            let request = OrderRequest {
                client_order_id: client_order_id.clone(),
                market: self.market.clone(),
                side: action.side,
                order_type: OrderType::Market,
                quantity: action.quantity,
                leverage,
                reduce_only: action.reduce_only,
            };

            let (result, attempts) = self.retry.run(ExchangeError::is_transient, |attempt| {
                if attempt > 1 {
                    warn!(%run_id, leg, attempt, "retrying order submission");
                }
                exchange.submit_order(&request)
            });

            let outcome = match result {
                Ok(OrderResult::Accepted { exchange_order_id }) => {
                    info!(
                        %run_id,
                        leg,
                        kind = ?action.kind,
                        side = %action.side,
                        quantity = action.quantity,
                        %exchange_order_id,
                        "order accepted"
                    );
                    LegOutcome::Accepted {
                        exchange_order_id,
                        attempts,
                    }
                }
                Ok(OrderResult::Rejected { reason }) => {
                    error!(%run_id, leg, %reason, "order rejected, aborting plan");
                    LegOutcome::Rejected { reason, attempts }
                }
                Err(source) => {
                    let err = if source.is_transient() {
                        ExecutionError::RetriesExhausted { attempts, source }
                    } else {
                        ExecutionError::Exchange(source)
                    };
                    error!(%run_id, leg, error = %err, "order submission failed, aborting plan");
                    LegOutcome::Failed {
                        error: err.to_string(),
                        attempts,
                    }
                }
            };
            halted = !outcome.is_accepted();
            legs.push(LegReport {
                leg,
                action: *action,
                client_order_id,
                outcome,
            });
        }

        let accepted = legs.iter().filter(|l| l.outcome.is_accepted()).count();
        let status = if legs.is_empty() {
            ExecutionStatus::NoAction
        } else if accepted == legs.len() {
            ExecutionStatus::Completed
        } else if accepted > 0 {
            ExecutionStatus::Partial
        } else {
            ExecutionStatus::Failed
        };

        ExecutionReport {
            run_id: run_id.clone(),
            plan,
            legs,
            status,
        }
    }
}
