//! SwingTrader CLI: one scheduled trading run, plus inspection commands.
//!
//! Commands:
//! - `run`: one invocation of the pipeline; exits with the outcome's status
//! - `check-config`: validate and print the effective configuration
//! - `state`: print the persisted risk state and the last journal entry
//! - `swings`: print swing structure and signal for current data, no account access

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use swingtrader_core::domain::SwingLevel;
use swingtrader_core::exchange::CandleSource;
use swingtrader_core::signals::SignalEngine;
use swingtrader_core::swing::SwingDetector;
use swingtrader_runner::notify;
use swingtrader_runner::sources::{self, SourceKind};
use swingtrader_runner::{
    AgentConfig, FileStateStore, RunCoordinator, RunError, RunJournal, RunOutcome, RunReport,
    StateStore,
};

#[derive(Parser)]
#[command(
    name = "swingtrader",
    about = "SwingTrader: swing-structure trading agent, one run per invocation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone)]
struct SourceArgs {
    /// Read candles from a CSV file instead of the exchange.
    #[arg(long)]
    candles_csv: Option<PathBuf>,

    /// Use a seeded synthetic candle series instead of the exchange.
    #[arg(long)]
    synthetic: Option<u64>,
}

impl SourceArgs {
    fn kind(&self) -> SourceKind {
        SourceKind::from_flags(self.candles_csv.clone(), self.synthetic)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one run: candles → swings → signal → risk → size → execute → persist → notify.
    Run {
        /// Path to a TOML config file. Environment variables override it.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Force dry-run (paper exchange) regardless of configuration.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        #[command(flatten)]
        source: SourceArgs,
    },
    /// Validate configuration and print the effective values (secrets masked).
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the persisted risk state.
    State {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print detected swings and the resulting signal without touching the account.
    Swings {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the configured swing level (intermediate | longterm).
        #[arg(long)]
        level: Option<SwingLevel>,

        #[command(flatten)]
        source: SourceArgs,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            dry_run,
            source,
        } => {
            let outcome = run_once(config, dry_run, &source)?;
            std::process::exit(outcome.exit_code());
        }
        Commands::CheckConfig { config } => check_config(config),
        Commands::State { config } => show_state(config),
        Commands::Swings {
            config,
            level,
            source,
        } => show_swings(config, level, &source),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<AgentConfig> {
    AgentConfig::load(path.as_deref()).context("invalid configuration")
}

fn run_once(config: Option<PathBuf>, force_dry_run: bool, source: &SourceArgs) -> Result<RunOutcome> {
    let mut config = load_config(config)?;
    if force_dry_run {
        config.runtime.dry_run = true;
    }
    let kind = source.kind();
    if kind.is_synthetic() {
        warn!("running on SYNTHETIC candles");
    }

    let exchange = sources::exchange(&kind, &config)?;
    let notifier = notify::from_config(&config.notify, config.http_timeout());
    let store = FileStateStore::new(config.state_path());
    let mut coordinator = RunCoordinator::new(config, exchange, Box::new(store), notifier);

    match coordinator.run(Utc::now()) {
        Ok(report) => {
            print_summary(&report);
            Ok(report.outcome)
        }
        Err(RunError::Lease(e)) => {
            eprintln!("Run skipped: {e}");
            Ok(RunOutcome::Fatal)
        }
        Err(e) => Err(e.into()),
    }
}

fn check_config(path: Option<PathBuf>) -> Result<()> {
    let config = load_config(path)?;
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    println!();
    println!("Fingerprint: {}", config.fingerprint());
    println!("State dir:   {}", config.runtime.state_dir.display());
    if !config.runtime.dry_run {
        println!("WARNING: dry_run is off, live orders will be routed to the exchange");
    }
    Ok(())
}

fn show_state(path: Option<PathBuf>) -> Result<()> {
    let config = load_config(path)?;
    let store = FileStateStore::new(config.state_path());
    let state = store.load()?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    println!();
    println!("Mode:     {}", state.mode());
    println!("Drawdown: {:.2}%", state.drawdown() * 100.0);

    let journal = RunJournal::new(config.journal_path());
    match journal.last() {
        Ok(Some(entry)) => println!(
            "Last run: {} at {} → {} (exit {})",
            entry.run_id,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            entry.outcome,
            entry.outcome.exit_code()
        ),
        Ok(None) => println!("Last run: none journaled"),
        Err(e) => warn!(error = %e, "journal unreadable"),
    }
    Ok(())
}

fn show_swings(path: Option<PathBuf>, level: Option<SwingLevel>, source: &SourceArgs) -> Result<()> {
    let config = load_config(path)?;
    let level = level.unwrap_or(config.strategy.swing_level);
    let lookback = config.strategy.lookback_candles;

    let candles = sources::candle_source(&source.kind(), &config)?;
    let series = candles
        .get_candles(&config.market.pair, config.market.candle_interval, lookback)
        .with_context(|| format!("fetching {} candles", config.market.pair))?
        .tail(lookback);
    let structure = SwingDetector::new(level, lookback).detect(&series)?;

    println!(
        "{} {} · {} candles · {} swings ({level})",
        config.market.pair,
        config.market.candle_interval,
        series.len(),
        structure.len()
    );
    println!("{:<22} {:<6} {:>12}", "Time", "Kind", "Price");
    println!("{}", "-".repeat(42));
    for point in structure.points() {
        println!(
            "{:<22} {:<6} {:>12.4}",
            point.time.format("%Y-%m-%d %H:%M"),
            format!("{:?}", point.kind),
            point.price
        );
    }

    if let Some(close) = series.latest_close() {
        let signal = SignalEngine::new(config.strategy.exit_on_stop_breach).evaluate(&structure, close);
        println!();
        println!("Close:  {close:.4}");
        println!("Signal: {} ({:?})", signal.direction, signal.reason);
        if let Some(stop) = signal.stop_price {
            println!("Stop:   {stop:.4}");
        }
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!();
    println!("=== Run {} ===", report.run_id);
    println!("Market:   {}", report.market);
    if report.dry_run {
        println!("Mode:     DRY RUN (paper exchange)");
    }
    println!("Candles:  {}", report.candle_count);
    if let Some(signal) = &report.signal {
        println!("Signal:   {} ({:?})", signal.direction, signal.reason);
    }
    if let Some(decision) = &report.decision {
        println!(
            "Risk:     {} · drawdown {:.2}%",
            decision.mode,
            decision.drawdown * 100.0
        );
        if let Some(reason) = decision.veto_reason() {
            println!("Vetoed:   {reason}");
        }
    }
    if let Some(intent) = &report.intent {
        println!(
            "Target:   {} {:.4} (notional {:.2}, x{})",
            intent.direction, intent.quantity, intent.notional_size, intent.leverage
        );
    }
    if let Some(execution) = &report.execution {
        println!(
            "Orders:   {}/{} accepted ({:?})",
            execution.accepted_count(),
            execution.plan.len(),
            execution.status
        );
    }
    if let Some(error) = &report.error {
        println!("Error:    {error}");
    }
    println!(
        "Outcome:  {} (exit {})",
        report.outcome,
        report.outcome.exit_code()
    );
}
