//! Execution: reconcile a target position against the exchange's reported one.
//!
//! Key concepts:
//! - **Plan**: the minimal ordered legs that move the current position to the intent
//! - **Close before open**: a flip is two independent legs, never one combined order
//! - **Retry**: bounded, backoff-scheduled, transient transport errors only
//! - **Idempotency**: every leg carries a client order id derived from the run id

pub mod manager;
pub mod plan;
pub mod retry;

pub use manager::{
    ExecutionError, ExecutionManager, ExecutionReport, ExecutionStatus, LegOutcome, LegReport,
};
pub use plan::{ExecutionPlan, LegKind, OrderAction};
pub use retry::RetryPolicy;
