//! Run coordinator: one invocation of the pipeline, end to end.
//!
//! ```text
//! lease → load state → candles → swings → signal → account → risk → size
//!       → execute → persist state → notify → journal → release lease
//! ```
//!
//! Insufficient data and a balance-floor breach stop the pipeline before any
//! order is sent. Every other stage carries its outcome through to
//! persistence and notification. State is saved exactly once per run, even
//! when the pipeline failed part-way.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use swingtrader_core::domain::{
    CandleInterval, GuardMode, PositionIntent, RiskState, RunId, SwingPoint,
};
use swingtrader_core::exchange::{Exchange, ExchangeError};
use swingtrader_core::execution::{ExecutionManager, ExecutionReport, ExecutionStatus, LegReport};
use swingtrader_core::risk::{worst_case_loss, ModeTransition, RiskDecision, RiskGuard};
use swingtrader_core::signals::{Signal, SignalEngine};
use swingtrader_core::sizers::{PositionSizer, Sizer};
use swingtrader_core::swing::{SwingDetector, SwingError};

use crate::config::AgentConfig;
use crate::journal::{JournalEntry, RunJournal};
use crate::lease::{LeaseError, RunLease};
use crate::notify::{escape_html, Notifier, Severity};
use crate::outcome::RunOutcome;
use crate::store::{StateStore, StoreError};

/// Swing points kept in the report and journal.
const RECENT_SWINGS: usize = 6;

/// Errors that prevent a run from recording its outcome.
///
/// Everything else is folded into [`RunReport::outcome`].
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Lease(#[from] LeaseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
enum StageError {
    #[error("candle fetch failed: {0}")]
    Candles(#[source] ExchangeError),

    #[error("account fetch failed: {0}")]
    Account(#[source] ExchangeError),

    #[error("candle series for {0} is empty")]
    NoPrice(String),
}

/// Everything one invocation decided and did.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub market: String,
    pub dry_run: bool,
    pub outcome: RunOutcome,
    pub candle_count: usize,
    pub equity: Option<f64>,
    pub recent_swings: Vec<SwingPoint>,
    pub signal: Option<Signal>,
    pub decision: Option<RiskDecision>,
    pub intent: Option<PositionIntent>,
    pub execution: Option<ExecutionReport>,
    /// The state persisted at the end of the run.
    pub state: RiskState,
    pub error: Option<String>,
}

impl RunReport {
    fn new(run_id: RunId, started_at: DateTime<Utc>, config: &AgentConfig) -> Self {
        Self {
            run_id,
            started_at,
            market: config.market.pair.clone(),
            dry_run: config.runtime.dry_run,
            outcome: RunOutcome::Fatal,
            candle_count: 0,
            equity: None,
            recent_swings: Vec::new(),
            signal: None,
            decision: None,
            intent: None,
            execution: None,
            state: RiskState::default(),
            error: None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    pub fn journal_entry(&self, config_fingerprint: &str) -> JournalEntry {
        JournalEntry {
            run_id: self.run_id.clone(),
            timestamp: self.started_at,
            config_fingerprint: config_fingerprint.to_string(),
            dry_run: self.dry_run,
            market: self.market.clone(),
            candle_count: self.candle_count,
            equity: self.equity,
            recent_swings: self.recent_swings.clone(),
            signal: self.signal.clone(),
            decision: self.decision.clone(),
            intent: self.intent,
            execution: self.execution.clone(),
            outcome: self.outcome,
            error: self.error.clone(),
        }
    }
}

/// Start of the scheduling slot containing `now`.
pub fn slot_start(now: DateTime<Utc>, interval: CandleInterval) -> DateTime<Utc> {
    let step = i64::from(interval.minutes()) * 60;
    let ts = now.timestamp();
    DateTime::from_timestamp(ts - ts.rem_euclid(step), 0).unwrap_or(now)
}

pub struct RunCoordinator {
    config: AgentConfig,
    exchange: Box<dyn Exchange>,
    store: Box<dyn StateStore>,
    notifier: Box<dyn Notifier>,
    journal: Option<RunJournal>,
}

impl RunCoordinator {
    /// Coordinator journaling to the configured state directory.
    pub fn new(
        config: AgentConfig,
        exchange: Box<dyn Exchange>,
        store: Box<dyn StateStore>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        let journal = Some(RunJournal::new(config.journal_path()));
        Self {
            config,
            exchange,
            store,
            notifier,
            journal,
        }
    }

    pub fn with_journal(mut self, journal: Option<RunJournal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Execute one invocation for the slot containing `now`.
    pub fn run(&mut self, now: DateTime<Utc>) -> Result<RunReport, RunError> {
        let interval = self.config.market.candle_interval;
        let run_id = RunId::for_slot(&self.config.market.pair, slot_start(now, interval));

        let lease = RunLease::acquire(self.config.lease_path(), &run_id, now, interval.duration())?;
        info!(%run_id, dry_run = self.config.runtime.dry_run, "run started");

        let state = self.store.load()?;
        if state.needs_reconcile {
            warn!(last_run = ?state.last_run_id, "previous run left a partial execution, reconciling against exchange");
        }
        let mut guard = RiskGuard::new(self.config.risk_limits(), state);
        let mut report = RunReport::new(run_id.clone(), now, &self.config);

        report.outcome = match self.pipeline(&run_id, lease.token(), now, &mut guard, &mut report) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(%run_id, error = %e, "run failed");
                report.error = Some(e.to_string());
                RunOutcome::Fatal
            }
        };

        let state = guard.finish(&run_id, report.outcome.as_str(), now);
        if let Err(e) = self.store.save(&state) {
            self.notifier.notify(
                &format!(
                    "<b>{}</b>: risk state could not be saved\n{}",
                    escape_html(&report.market),
                    escape_html(&e.to_string())
                ),
                Severity::Critical,
            );
            return Err(e.into());
        }
        report.state = state;

        self.announce(&report);
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(&report.journal_entry(&self.config.fingerprint())) {
                warn!(path = %journal.path().display(), error = %e, "journal append failed");
            }
        }

        info!(%run_id, outcome = %report.outcome, exit_code = report.exit_code(), "run finished");
        drop(lease);
        Ok(report)
    }

    fn pipeline(
        &mut self,
        run_id: &RunId,
        invocation: &str,
        now: DateTime<Utc>,
        guard: &mut RiskGuard,
        report: &mut RunReport,
    ) -> Result<RunOutcome, StageError> {
        let pair = self.config.market.pair.clone();
        let interval = self.config.market.candle_interval;
        let lookback = self.config.strategy.lookback_candles;

        let series = self
            .exchange
            .get_candles(&pair, interval, lookback)
            .map_err(StageError::Candles)?
            .tail(lookback);
        report.candle_count = series.len();

        let detector = SwingDetector::new(self.config.strategy.swing_level, lookback);
        let structure = match detector.detect(&series) {
            Ok(structure) => structure,
            Err(e @ SwingError::InsufficientData { .. }) => {
                warn!(%run_id, error = %e, "aborting before any exchange mutation");
                report.error = Some(e.to_string());
                return Ok(RunOutcome::InsufficientData);
            }
        };
        let points = structure.points();
        report.recent_swings = points[points.len().saturating_sub(RECENT_SWINGS)..].to_vec();

        let close = series
            .latest_close()
            .ok_or_else(|| StageError::NoPrice(pair.clone()))?;
        let signal = SignalEngine::new(self.config.strategy.exit_on_stop_breach)
            .evaluate(&structure, close);
        info!(
            %run_id,
            level = %structure.level(),
            swings = structure.len(),
            direction = %signal.direction,
            reason = ?signal.reason,
            stop = ?signal.stop_price,
            close,
            "signal evaluated"
        );
        report.signal = Some(signal.clone());

        let account = self
            .exchange
            .get_account_state(&pair)
            .map_err(StageError::Account)?;
        report.equity = Some(account.equity);

        let decision = guard.evaluate(&signal, account.equity, now);
        report.decision = Some(decision.clone());
        if decision.is_balance_floor() {
            return Ok(RunOutcome::RiskHalted);
        }

        let sizer = PositionSizer::new(self.config.sizing_params());
        let intent = sizer.size(account.equity, decision.direction, &signal, decision.size_cap);
        info!(
            %run_id,
            direction = %intent.direction,
            notional = intent.notional_size,
            quantity = intent.quantity,
            leverage = intent.leverage,
            "position intent"
        );
        report.intent = Some(intent);

        let manager = ExecutionManager::new(
            pair,
            self.config.retry_policy(),
            self.config.execution.size_tolerance_pct,
        )
        .with_invocation(invocation);
        let execution = manager.execute(&mut *self.exchange, run_id, &intent, &account.position);
        guard.record_execution(execution.accepted_count(), execution.needs_reconcile());

        let outcome = match execution.status {
            ExecutionStatus::Failed => {
                report.error = execution.failed_leg().map(describe_leg_failure);
                RunOutcome::Fatal
            }
            ExecutionStatus::Partial => {
                report.error = execution.failed_leg().map(describe_leg_failure);
                RunOutcome::PartialExecution
            }
            _ if decision.is_vetoed() || decision.mode == GuardMode::Halted => {
                RunOutcome::RiskHalted
            }
            ExecutionStatus::Completed => RunOutcome::TradeExecuted,
            ExecutionStatus::NoAction => RunOutcome::NoAction,
        };
        report.execution = Some(execution);
        Ok(outcome)
    }

    fn announce(&self, report: &RunReport) {
        if report.outcome == RunOutcome::NoAction
            && !self.config.notify.notify_no_action
            && !report
                .decision
                .as_ref()
                .is_some_and(|d| d.transition.is_some())
        {
            return;
        }
        let (message, severity) = render_message(report);
        self.notifier.notify(&message, severity);
    }
}

fn describe_leg_failure(leg: &LegReport) -> String {
    format!("leg {} ({:?} {}): {:?}", leg.leg, leg.action.kind, leg.action.side, leg.outcome)
}

/// HTML notification body and severity for a finished run.
pub fn render_message(report: &RunReport) -> (String, Severity) {
    let mut lines = Vec::new();
    if report.dry_run {
        lines.push("🧪 <b>DRY RUN</b>".to_string());
    }
    lines.push(format!(
        "<b>{}</b> · {}",
        escape_html(&report.market),
        report.outcome
    ));

    if let Some(signal) = &report.signal {
        let stop = signal
            .stop_price
            .map(|s| format!("{s:.4}"))
            .unwrap_or_else(|| "none".into());
        lines.push(format!(
            "signal: {} ({:?}) close {:.4} stop {}",
            signal.direction, signal.reason, signal.price, stop
        ));
    }

    let mut severity = match report.outcome {
        RunOutcome::NoAction => Severity::Info,
        RunOutcome::TradeExecuted => Severity::Success,
        RunOutcome::InsufficientData | RunOutcome::RiskHalted => Severity::Warning,
        RunOutcome::PartialExecution | RunOutcome::Fatal => Severity::Critical,
    };

    if let Some(decision) = &report.decision {
        lines.push(format!(
            "equity: {:.2} · drawdown {:.2}% · mode {}",
            report.equity.unwrap_or(0.0),
            decision.drawdown * 100.0,
            decision.mode
        ));
        if let Some(reason) = decision.veto_reason() {
            lines.push(format!("vetoed: {}", escape_html(&reason.to_string())));
        }
        match decision.transition {
            Some(ModeTransition::Halted) => {
                lines.push("🛑 circuit breaker tripped".into());
                severity = Severity::Critical;
            }
            Some(ModeTransition::Resumed) => lines.push("🟢 circuit breaker reset".into()),
            None => {}
        }
    }

    if let (Some(intent), Some(execution)) = (&report.intent, &report.execution) {
        if !execution.plan.is_empty() {
            lines.push(format!(
                "target: {} {:.4} (notional {:.2}, x{})",
                intent.direction, intent.quantity, intent.notional_size, intent.leverage
            ));
            if let (Some(signal), false) = (&report.signal, intent.is_flat()) {
                if let Some(loss) = worst_case_loss(signal, intent.notional_size) {
                    lines.push(format!("loss to stop: {loss:.2}"));
                }
            }
            lines.push(format!(
                "orders: {}/{} accepted",
                execution.accepted_count(),
                execution.plan.len()
            ));
        }
    }

    if let Some(error) = &report.error {
        lines.push(format!("error: {}", escape_html(error)));
    }
    if report.state.needs_reconcile {
        lines.push("next run reconciles against the exchange position".into());
    }
    lines.push(format!("run: <code>{}</code>", escape_html(report.run_id.as_str())));

    (lines.join("\n"), severity)
}
