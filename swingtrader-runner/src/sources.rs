//! Candle source and exchange resolution for one invocation.
//!
//! Source selection:
//! 1. `--candles-csv PATH` → CSV import
//! 2. `--synthetic SEED` → seeded random walk (tagged as synthetic in the journal)
//! 3. Otherwise → Kraken public OHLC
//!
//! Dry runs route orders to the paper exchange, backed by a JSON book in the
//! state directory. Live order routing needs an [`Exchange`] implementation
//! supplied by the embedding application.

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use swingtrader_core::data::{CsvCandles, KrakenCandles, SyntheticCandles};
use swingtrader_core::exchange::{CandleSource, Exchange, ExchangeError, PaperExchange};

use crate::config::AgentConfig;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(
        "live trading needs an exchange transport; none is bundled (set DRY_RUN=true or runtime.dry_run = true)"
    )]
    NoLiveExchange,

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceKind {
    #[default]
    Kraken,
    Csv(PathBuf),
    Synthetic(u64),
}

impl SourceKind {
    pub fn from_flags(csv: Option<PathBuf>, synthetic: Option<u64>) -> Self {
        match (csv, synthetic) {
            (Some(path), _) => Self::Csv(path),
            (None, Some(seed)) => Self::Synthetic(seed),
            (None, None) => Self::Kraken,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::Synthetic(_))
    }
}

pub fn candle_source(
    kind: &SourceKind,
    config: &AgentConfig,
) -> Result<Box<dyn CandleSource>, SourceError> {
    let source: Box<dyn CandleSource> = match kind {
        SourceKind::Kraken => Box::new(KrakenCandles::new(config.http_timeout())?),
        SourceKind::Csv(path) => Box::new(CsvCandles::new(path.clone())),
        SourceKind::Synthetic(seed) => Box::new(SyntheticCandles::new(*seed)),
    };
    info!(source = source.name(), "candle source selected");
    Ok(source)
}

/// The exchange this invocation trades against.
pub fn exchange(kind: &SourceKind, config: &AgentConfig) -> Result<Box<dyn Exchange>, SourceError> {
    if !config.runtime.dry_run {
        return Err(SourceError::NoLiveExchange);
    }
    let source = candle_source(kind, config)?;
    let paper = PaperExchange::open(source, config.paper_settings(), config.paper_book_path())?;
    Ok(Box::new(paper))
}

#[cfg(test)]
mod tests {
    use super::*;
    use swingtrader_core::domain::CandleInterval;

    #[test]
    fn flag_precedence() {
        assert_eq!(
            SourceKind::from_flags(Some("a.csv".into()), Some(3)),
            SourceKind::Csv("a.csv".into())
        );
        assert_eq!(SourceKind::from_flags(None, Some(3)), SourceKind::Synthetic(3));
        assert_eq!(SourceKind::from_flags(None, None), SourceKind::Kraken);
    }

    #[test]
    fn live_mode_without_transport_is_refused() {
        let mut config = AgentConfig::default();
        config.runtime.dry_run = false;
        assert!(matches!(
            exchange(&SourceKind::Synthetic(1), &config),
            Err(SourceError::NoLiveExchange)
        ));
    }

    #[test]
    fn dry_run_uses_paper_book_in_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AgentConfig::default();
        config.runtime.state_dir = dir.path().to_path_buf();
        let ex = exchange(&SourceKind::Synthetic(1), &config).unwrap();
        let series = ex.get_candles("ADAUSD", CandleInterval::H1, 150).unwrap();
        assert_eq!(series.len(), 150);
        let account = ex.get_account_state("ADAUSD").unwrap();
        assert_eq!(account.equity, config.paper.starting_balance);
    }
}
