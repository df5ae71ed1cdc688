//! SwingTrader Runner: one scheduled invocation, end to end.
//!
//! This crate builds on `swingtrader-core` to provide:
//! - Configuration loading (TOML file + environment overrides) and validation
//! - File-backed risk state persistence and the run lease
//! - Candle source and exchange selection (Kraken, CSV, synthetic, paper)
//! - The run coordinator and its outcome / exit-status mapping
//! - Notifications (log, Telegram) and the JSONL run journal

pub mod config;
pub mod coordinator;
pub mod journal;
pub mod lease;
pub mod notify;
pub mod outcome;
pub mod sources;
pub mod store;

pub use config::{AgentConfig, ConfigError};
pub use coordinator::{render_message, slot_start, RunCoordinator, RunError, RunReport};
pub use journal::{JournalEntry, RunJournal};
pub use lease::{LeaseError, LeaseRecord, RunLease};
pub use notify::{LogNotifier, Notifier, Severity, TelegramNotifier};
pub use outcome::RunOutcome;
pub use sources::{SourceError, SourceKind};
pub use store::{FileStateStore, StateStore, StoreError};
