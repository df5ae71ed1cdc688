//! Risk-state persistence: one JSON document, read once and written once per run.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use swingtrader_core::atomic::write_json_atomic;
use swingtrader_core::domain::RiskState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot read risk state {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A damaged state file is never silently reset.
    #[error("risk state {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot write risk state {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Persistence collaborator for [`RiskState`].
pub trait StateStore {
    /// Missing state yields a fresh default.
    fn load(&self) -> Result<RiskState, StoreError>;

    /// Atomic replace.
    fn save(&self, state: &RiskState) -> Result<(), StoreError>;
}

pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<RiskState, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no risk state yet, starting fresh");
                return Ok(RiskState::default());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, state: &RiskState) -> Result<(), StoreError> {
        write_json_atomic(&self.path, state).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), mode = %state.mode(), "risk state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swingtrader_core::domain::RunId;

    #[test]
    fn missing_file_is_fresh_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("risk_state.json"));
        assert_eq!(store.load().unwrap(), RiskState::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("sub").join("risk_state.json"));
        let state = RiskState {
            peak_equity: 1200.0,
            current_equity: 1100.0,
            realized_pnl_since_peak: -100.0,
            trade_count: 4,
            circuit_breaker_tripped: true,
            halt_reason: Some("max drawdown reached".into()),
            last_run_id: Some(RunId::new("ADAUSD-20240102T1300")),
            ..RiskState::default()
        };
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("risk_state.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = FileStateStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn older_state_without_extension_fields_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("risk_state.json");
        std::fs::write(
            &path,
            r#"{"peak_equity":1000.0,"current_equity":900.0,"realized_pnl_since_peak":-100.0,
                "trade_count":2,"last_run_time":null,"circuit_breaker_tripped":false}"#,
        )
        .unwrap();
        let state = FileStateStore::new(&path).load().unwrap();
        assert_eq!(state.peak_equity, 1000.0);
        assert!(!state.needs_reconcile);
    }
}
