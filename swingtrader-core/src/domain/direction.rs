//! Closed directional variant shared by signals, intents, and positions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Desired or actual market exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
    #[default]
    Flat,
}

impl Direction {
    pub fn is_flat(self) -> bool {
        matches!(self, Self::Flat)
    }

    /// +1 for long, -1 for short, 0 for flat.
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
            Self::Flat => 0.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
            Self::Flat => write!(f, "flat"),
        }
    }
}

/// Parses the canonical names plus the legacy "buy"/"sell"/"none" spellings.
impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(Self::Long),
            "short" | "sell" => Ok(Self::Short),
            "flat" | "none" => Ok(Self::Flat),
            other => Err(format!("invalid direction '{other}'")),
        }
    }
}
