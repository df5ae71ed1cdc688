//! Run lease: keeps two overlapping invocations from both trading.
//!
//! The lease file is published atomically: the record is written to a
//! private temp file and hard-linked into place, which fails if a lease
//! already exists. A lease older than the staleness window (one scheduling
//! interval) belongs to a run that died without cleaning up.
//!
//! Reclaiming is serialised by a second marker file taken the same way.
//! Under the marker the reclaimer re-reads the lease and only removes it if
//! it still holds the exact bytes that were judged stale. Ownership is
//! tracked by a per-invocation token, never by run id alone: retriggers of
//! one slot share a run id.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use swingtrader_core::domain::RunId;

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("another run holds the lease: {holder} since {acquired_at}")]
    Held {
        holder: RunId,
        acquired_at: DateTime<Utc>,
    },

    #[error("lease file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub run_id: RunId,
    pub acquired_at: DateTime<Utc>,
    pub pid: u32,
    /// Unique per invocation.
    #[serde(default)]
    pub token: String,
}

impl LeaseRecord {
    fn new(run_id: &RunId, now: DateTime<Utc>) -> Self {
        let pid = std::process::id();
        Self {
            run_id: run_id.clone(),
            acquired_at: now,
            pid,
            token: format!(
                "{pid:x}-{:x}-{:016x}",
                now.timestamp_millis(),
                rand::random::<u64>()
            ),
        }
    }

    fn held(&self) -> LeaseError {
        LeaseError::Held {
            holder: self.run_id.clone(),
            acquired_at: self.acquired_at,
        }
    }
}

/// RAII guard: the lease file is removed when the guard drops, if still ours.
#[derive(Debug)]
pub struct RunLease {
    path: PathBuf,
    record: LeaseRecord,
}

impl RunLease {
    pub fn acquire(
        path: impl Into<PathBuf>,
        run_id: &RunId,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<Self, LeaseError> {
        let path = path.into();
        let record = LeaseRecord::new(run_id, now);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| LeaseError::Io {
                path: path.clone(),
                source,
            })?;
        }

        match publish(&path, &record) {
            Ok(()) => return Ok(Self { path, record }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(source) => return Err(LeaseError::Io { path, source }),
        }

        let observed = fs::read_to_string(&path).ok();
        let existing = observed.as_deref().and_then(parse_record);
        match &existing {
            Some(holder) if now - holder.acquired_at < stale_after => return Err(holder.held()),
            Some(holder) => {
                warn!(holder = %holder.run_id, acquired_at = %holder.acquired_at, "reclaiming stale lease");
            }
            None => warn!(path = %path.display(), "reclaiming unreadable lease"),
        }

        let marker = Marker::take(reclaim_path(&path), &record, now, stale_after)?;
        let current = fs::read_to_string(&path).ok();
        if current != observed {
            drop(marker);
            return Err(match current.as_deref().and_then(parse_record) {
                Some(holder) => holder.held(),
                None => LeaseError::Held {
                    holder: RunId::new("unknown"),
                    acquired_at: now,
                },
            });
        }

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(LeaseError::Io { path, source }),
        }
        let result = match publish(&path, &record) {
            Ok(()) => Ok(Self { path, record }),
            // A plain acquire slipped in while the stale file was gone.
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(read_record(&path)
                .map(|r| r.held())
                .unwrap_or_else(|| LeaseError::Held {
                    holder: RunId::new("unknown"),
                    acquired_at: now,
                })),
            Err(source) => Err(LeaseError::Io { path, source }),
        };
        drop(marker);
        result
    }

    pub fn record(&self) -> &LeaseRecord {
        &self.record
    }

    /// Per-invocation token, distinct even between runs of the same slot.
    pub fn token(&self) -> &str {
        &self.record.token
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        if release(&self.path, &self.record.token) {
            debug!(run_id = %self.record.run_id, "lease released");
        }
    }
}

/// Exclusive marker held while a stale lease is replaced.
struct Marker {
    path: PathBuf,
    token: String,
}

impl Marker {
    fn take(
        path: PathBuf,
        record: &LeaseRecord,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<Self, LeaseError> {
        for _ in 0..2 {
            match publish(&path, record) {
                Ok(()) => {
                    return Ok(Self {
                        path,
                        token: record.token.clone(),
                    })
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(source) => return Err(LeaseError::Io { path, source }),
            }
            match read_record(&path) {
                Some(other) if now - other.acquired_at < stale_after => return Err(other.held()),
                // Left behind by a reclaimer that died mid-way.
                _ => match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(source) => return Err(LeaseError::Io { path, source }),
                },
            }
        }
        Err(read_record(&path)
            .map(|r| r.held())
            .unwrap_or_else(|| LeaseError::Held {
                holder: RunId::new("unknown"),
                acquired_at: now,
            }))
    }
}

impl Drop for Marker {
    fn drop(&mut self) {
        release(&self.path, &self.token);
    }
}

/// Remove `path` if it still carries `token`. Returns whether it was removed.
fn release(path: &Path, token: &str) -> bool {
    match read_record(path) {
        Some(current) if current.token == token => match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to release lease");
                false
            }
        },
        _ => {
            warn!(path = %path.display(), "lease no longer ours, leaving it");
            false
        }
    }
}

fn reclaim_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".reclaim");
    path.with_file_name(name)
}

/// Write `record` to a private temp file and hard-link it to `path`.
///
/// Fails with `AlreadyExists` if `path` exists. Readers never see a partial record.
fn publish(path: &Path, record: &LeaseRecord) -> io::Result<()> {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", record.token));
    let tmp = path.with_file_name(name);

    let json = serde_json::to_vec(record).map_err(io::Error::other)?;
    {
        let mut file = OpenOptions::new().write(true).create_new(true).open(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    let linked = fs::hard_link(&tmp, path);
    let _ = fs::remove_file(&tmp);
    linked
}

fn parse_record(text: &str) -> Option<LeaseRecord> {
    serde_json::from_str(text).ok()
}

fn read_record(path: &Path) -> Option<LeaseRecord> {
    fs::read_to_string(path).ok().as_deref().and_then(parse_record)
}
