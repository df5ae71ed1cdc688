//! Agent configuration: TOML file, environment overrides, validation.
//!
//! Loading order is defaults → file → environment. Validation runs once on
//! the merged result, before any candle is fetched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use swingtrader_core::domain::{CandleInterval, SwingLevel};
use swingtrader_core::exchange::PaperSettings;
use swingtrader_core::execution::RetryPolicy;
use swingtrader_core::risk::RiskLimits;
use swingtrader_core::sizers::SizingParams;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("environment variable {var}={value:?}: {reason}")]
    Env {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarketConfig {
    pub pair: String,
    pub candle_interval: CandleInterval,
    /// Quantity granularity of the pair.
    pub lot_step: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            pair: "ADAUSD".into(),
            candle_interval: CandleInterval::H1,
            lot_step: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyConfig {
    pub swing_level: SwingLevel,
    /// Candles fetched per run; also the minimum required for detection.
    pub lookback_candles: usize,
    pub exit_on_stop_breach: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            swing_level: SwingLevel::Intermediate,
            lookback_candles: 500,
            exit_on_stop_breach: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SizingConfig {
    pub position_size_pct: f64,
    pub leverage: u8,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            position_size_pct: 0.25,
            leverage: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskConfig {
    pub max_drawdown_pct: f64,
    pub drawdown_recovery_pct: f64,
    pub max_loss_per_trade_pct: f64,
    pub min_balance_usd: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_drawdown_pct: 20.0,
            drawdown_recovery_pct: 10.0,
            max_loss_per_trade_pct: 5.0,
            min_balance_usd: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Relative size difference (percent) treated as "already at target".
    pub size_tolerance_pct: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            size_tolerance_pct: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Holds risk state, run lease, journal and the paper book.
    pub state_dir: PathBuf,
    /// Route orders to the paper exchange instead of a live one.
    pub dry_run: bool,
    pub http_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("state"),
            dry_run: true,
            http_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaperConfig {
    pub starting_balance: f64,
    pub fee_bps: f64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        let settings = PaperSettings::default();
        Self {
            starting_balance: settings.starting_balance,
            fee_bps: settings.fee_bps,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    /// Also send a message when a run ends without trading.
    pub notify_no_action: bool,
}

/// Everything one invocation needs, loaded once at start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub market: MarketConfig,
    pub strategy: StrategyConfig,
    pub sizing: SizingConfig,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub runtime: RuntimeConfig,
    pub paper: PaperConfig,
    pub notify: NotifyConfig,
}

pub const MIN_LOOKBACK_CANDLES: usize = 100;
pub const MAX_LEVERAGE: u8 = 5;

impl AgentConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Defaults, then the file if given, then the process environment; validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TRADING_PAIR`, `LEVERAGE`, `DRY_RUN` and friends on top of the current values.
    ///
    /// Empty values are ignored. Unparseable values are an error, not a silent default.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let get = |var: &'static str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (var, v))
        };

        if let Some((_, v)) = get("TRADING_PAIR") {
            self.market.pair = v;
        }
        if let Some((var, v)) = get("CANDLE_INTERVAL") {
            let minutes: u32 = parse_env(var, &v)?;
            self.market.candle_interval =
                CandleInterval::try_from(minutes).map_err(|e| ConfigError::Env {
                    var,
                    value: v,
                    reason: e.to_string(),
                })?;
        }
        if let Some((var, v)) = get("SWING_LEVEL") {
            self.strategy.swing_level = v.parse().map_err(|reason| ConfigError::Env {
                var,
                value: v.clone(),
                reason,
            })?;
        }
        if let Some((var, v)) = get("LOOKBACK_CANDLES") {
            self.strategy.lookback_candles = parse_env(var, &v)?;
        }
        if let Some((var, v)) = get("POSITION_SIZE_PCT") {
            self.sizing.position_size_pct = parse_env(var, &v)?;
        }
        if let Some((var, v)) = get("LEVERAGE") {
            self.sizing.leverage = parse_env(var, &v)?;
        }
        if let Some((var, v)) = get("MAX_DRAWDOWN_PCT") {
            self.risk.max_drawdown_pct = parse_env(var, &v)?;
        }
        if let Some((var, v)) = get("DRAWDOWN_RECOVERY_PCT") {
            self.risk.drawdown_recovery_pct = parse_env(var, &v)?;
        }
        if let Some((var, v)) = get("MAX_LOSS_PER_TRADE_PCT") {
            self.risk.max_loss_per_trade_pct = parse_env(var, &v)?;
        }
        if let Some((var, v)) = get("MIN_BALANCE_USD") {
            self.risk.min_balance_usd = parse_env(var, &v)?;
        }
        if let Some((var, v)) = get("DRY_RUN") {
            self.runtime.dry_run = parse_bool(var, &v)?;
        }
        if let Some((_, v)) = get("STATE_DIR") {
            self.runtime.state_dir = PathBuf::from(v);
        }
        if let Some((_, v)) = get("TELEGRAM_BOT_TOKEN") {
            self.notify.telegram_bot_token = Some(v);
        }
        if let Some((_, v)) = get("TELEGRAM_CHAT_ID") {
            self.notify.telegram_chat_id = Some(v);
        }
        Ok(())
    }

    /// Range checks. Any failure is fatal before the run touches data or exchange.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.market.pair.trim().is_empty() {
            return Err(invalid("market.pair", "must not be empty"));
        }
        if !(self.market.lot_step > 0.0 && self.market.lot_step.is_finite()) {
            return Err(invalid("market.lot_step", "must be > 0"));
        }
        if self.strategy.lookback_candles < MIN_LOOKBACK_CANDLES {
            return Err(invalid(
                "strategy.lookback_candles",
                format!("{} < {MIN_LOOKBACK_CANDLES}", self.strategy.lookback_candles),
            ));
        }
        let pct = self.sizing.position_size_pct;
        if !(0.0..=1.0).contains(&pct) {
            return Err(invalid("sizing.position_size_pct", format!("{pct} not in [0, 1]")));
        }
        if !(1..=MAX_LEVERAGE).contains(&self.sizing.leverage) {
            return Err(invalid(
                "sizing.leverage",
                format!("{} not in [1, {MAX_LEVERAGE}]", self.sizing.leverage),
            ));
        }
        let risk = &self.risk;
        if !(risk.max_drawdown_pct > 0.0 && risk.max_drawdown_pct <= 100.0) {
            return Err(invalid("risk.max_drawdown_pct", format!("{} not in (0, 100]", risk.max_drawdown_pct)));
        }
        if !(risk.drawdown_recovery_pct >= 0.0 && risk.drawdown_recovery_pct < risk.max_drawdown_pct) {
            return Err(invalid(
                "risk.drawdown_recovery_pct",
                format!(
                    "{} must be in [0, max_drawdown_pct={})",
                    risk.drawdown_recovery_pct, risk.max_drawdown_pct
                ),
            ));
        }
        if !(risk.max_loss_per_trade_pct > 0.0 && risk.max_loss_per_trade_pct <= 100.0) {
            return Err(invalid(
                "risk.max_loss_per_trade_pct",
                format!("{} not in (0, 100]", risk.max_loss_per_trade_pct),
            ));
        }
        if !(risk.min_balance_usd > 0.0 && risk.min_balance_usd.is_finite()) {
            return Err(invalid("risk.min_balance_usd", "must be > 0"));
        }
        if self.execution.max_attempts < 1 {
            return Err(invalid("execution.max_attempts", "must be >= 1"));
        }
        let tol = self.execution.size_tolerance_pct;
        if !(0.0..100.0).contains(&tol) {
            return Err(invalid("execution.size_tolerance_pct", format!("{tol} not in [0, 100)")));
        }
        if self.runtime.http_timeout_secs == 0 {
            return Err(invalid("runtime.http_timeout_secs", "must be > 0"));
        }
        if !(self.paper.starting_balance > 0.0) {
            return Err(invalid("paper.starting_balance", "must be > 0"));
        }
        if !(self.paper.fee_bps >= 0.0) {
            return Err(invalid("paper.fee_bps", "must be >= 0"));
        }
        Ok(())
    }

    /// Copy with secrets masked, for display and fingerprinting.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.notify.telegram_bot_token.is_some() {
            copy.notify.telegram_bot_token = Some("***".into());
        }
        copy
    }

    /// Deterministic identity of the trading-relevant configuration.
    ///
    /// blake3 over canonical JSON (keys sorted), secrets masked; 16 hex chars.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_value(self.redacted())
            .map(|v| v.to_string())
            .unwrap_or_default();
        let hash = blake3::hash(canonical.as_bytes());
        hash.to_hex().as_str()[..16].to_string()
    }

    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            max_drawdown_pct: self.risk.max_drawdown_pct,
            drawdown_recovery_pct: self.risk.drawdown_recovery_pct,
            max_loss_per_trade_pct: self.risk.max_loss_per_trade_pct,
            min_balance_usd: self.risk.min_balance_usd,
        }
    }

    pub fn sizing_params(&self) -> SizingParams {
        SizingParams {
            position_size_pct: self.sizing.position_size_pct,
            leverage: self.sizing.leverage,
            lot_step: self.market.lot_step,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.execution.max_attempts,
            Duration::from_millis(self.execution.base_delay_ms),
            Duration::from_millis(self.execution.max_delay_ms),
        )
    }

    pub fn paper_settings(&self) -> PaperSettings {
        PaperSettings {
            starting_balance: self.paper.starting_balance,
            fee_bps: self.paper.fee_bps,
            ..PaperSettings::default()
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime.http_timeout_secs)
    }

    pub fn state_path(&self) -> PathBuf {
        self.runtime.state_dir.join("risk_state.json")
    }

    pub fn lease_path(&self) -> PathBuf {
        self.runtime.state_dir.join("run.lock")
    }

    pub fn journal_path(&self) -> PathBuf {
        self.runtime.state_dir.join("journal.jsonl")
    }

    pub fn paper_book_path(&self) -> PathBuf {
        self.runtime.state_dir.join("paper_book.json")
    }
}

fn parse_env<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::Env {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            var,
            value: value.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}
