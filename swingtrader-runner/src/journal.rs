//! Run journal: JSONL append-only record of every invocation.
//!
//! One JSON object per line, so a torn final write only loses that line.
//! Malformed lines are skipped on read.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use swingtrader_core::domain::{PositionIntent, RunId, SwingPoint};
use swingtrader_core::execution::ExecutionReport;
use swingtrader_core::risk::RiskDecision;
use swingtrader_core::signals::Signal;

use crate::outcome::RunOutcome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    pub config_fingerprint: String,
    pub dry_run: bool,
    pub market: String,
    pub candle_count: usize,
    pub equity: Option<f64>,
    /// Most recent swing points, newest last.
    #[serde(default)]
    pub recent_swings: Vec<SwingPoint>,
    pub signal: Option<Signal>,
    pub decision: Option<RiskDecision>,
    pub intent: Option<PositionIntent>,
    pub execution: Option<ExecutionReport>,
    pub outcome: RunOutcome,
    pub error: Option<String>,
}

pub struct RunJournal {
    path: PathBuf,
}

impl RunJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, entry: &JournalEntry) -> io::Result<()> {
        let json = serde_json::to_string(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(file, "{json}")?;
        file.flush()
    }

    pub fn read_all(&self) -> io::Result<Vec<JournalEntry>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for line in io::BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(entry) = serde_json::from_str::<JournalEntry>(&line) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    pub fn last(&self) -> io::Result<Option<JournalEntry>> {
        Ok(self.read_all()?.pop())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, outcome: RunOutcome) -> JournalEntry {
        JournalEntry {
            run_id: RunId::new(id),
            timestamp: Utc::now(),
            config_fingerprint: "abc".into(),
            dry_run: true,
            market: "ADAUSD".into(),
            candle_count: 500,
            equity: Some(1000.0),
            recent_swings: Vec::new(),
            signal: None,
            decision: None,
            intent: None,
            execution: None,
            outcome,
            error: None,
        }
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let journal = RunJournal::new(dir.path().join("journal.jsonl"));
        journal.append(&entry("r1", RunOutcome::NoAction)).unwrap();
        journal.append(&entry("r2", RunOutcome::TradeExecuted)).unwrap();

        let all = journal.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(journal.last().unwrap().unwrap().run_id.as_str(), "r2");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let journal = RunJournal::new(dir.path().join("journal.jsonl"));
        journal.append(&entry("r1", RunOutcome::NoAction)).unwrap();
        let mut file = OpenOptions::new().append(true).open(journal.path()).unwrap();
        writeln!(file, "{{\"truncated\":").unwrap();
        journal.append(&entry("r2", RunOutcome::RiskHalted)).unwrap();

        let all = journal.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].outcome, RunOutcome::RiskHalted);
    }

    #[test]
    fn missing_journal_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RunJournal::new(dir.path().join("none.jsonl")).read_all().unwrap().is_empty());
    }
}
