//! Swing points and the alternating structure built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a swing point is a local top or bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingKind {
    High,
    Low,
}

impl SwingKind {
    pub fn opposite(self) -> Self {
        match self {
            Self::High => Self::Low,
            Self::Low => Self::High,
        }
    }
}

/// Structural granularity of swing detection.
///
/// Intermediate swings are local extrema over raw candles; long-term swings
/// are extrema over the intermediate swing points themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingLevel {
    #[default]
    Intermediate,
    #[serde(alias = "long_term")]
    Longterm,
}

impl fmt::Display for SwingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intermediate => write!(f, "intermediate"),
            Self::Longterm => write!(f, "longterm"),
        }
    }
}

impl FromStr for SwingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intermediate" => Ok(Self::Intermediate),
            "longterm" | "long_term" => Ok(Self::Longterm),
            other => Err(format!(
                "unknown swing level '{other}' (expected intermediate or longterm)"
            )),
        }
    }
}

/// A confirmed swing pivot. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub time: DateTime<Utc>,
    /// Index of the candle that forms the pivot within the analysed series.
    pub candle_index: usize,
    pub price: f64,
    pub kind: SwingKind,
    pub level: SwingLevel,
}

/// Time-ordered swing points at one level with strictly alternating kinds.
///
/// An empty structure means "indeterminate": fewer than three points could be
/// confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingStructure {
    level: SwingLevel,
    points: Vec<SwingPoint>,
}

impl SwingStructure {
    pub fn empty(level: SwingLevel) -> Self {
        Self {
            level,
            points: Vec::new(),
        }
    }

    /// Build from points that are already time-ordered and alternating.
    ///
    /// Returns `None` if the ordering or alternation invariant is violated.
    pub fn from_points(level: SwingLevel, points: Vec<SwingPoint>) -> Option<Self> {
        let valid = points.windows(2).all(|w| {
            w[0].kind != w[1].kind
                && (w[0].time < w[1].time
                    || (w[0].time == w[1].time && w[0].candle_index == w[1].candle_index))
        });
        valid.then_some(Self { level, points })
    }

    pub fn level(&self) -> SwingLevel {
        self.level
    }

    pub fn points(&self) -> &[SwingPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Most recent points of one kind, newest first.
    pub fn latest(&self, kind: SwingKind) -> impl Iterator<Item = &SwingPoint> {
        self.points.iter().rev().filter(move |p| p.kind == kind)
    }

    /// Most recent point of either kind.
    pub fn last(&self) -> Option<&SwingPoint> {
        self.points.last()
    }
}
