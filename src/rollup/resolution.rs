use std::fmt;

use serde::{Deserialize, Serialize};

/// Kline granularities, finest first. Each one is built from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1w")]
    Week1,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Min1 => "1m",
            Resolution::Min5 => "5m",
            Resolution::Min15 => "15m",
            Resolution::Min30 => "30m",
            Resolution::Hour1 => "1h",
            Resolution::Hour4 => "4h",
            Resolution::Day1 => "1d",
            Resolution::Week1 => "1w",
        }
    }

    pub fn duration_secs(&self) -> i64 {
        match self {
            Resolution::Min1 => 60,
            Resolution::Min5 => 5 * 60,
            Resolution::Min15 => 15 * 60,
            Resolution::Min30 => 30 * 60,
            Resolution::Hour1 => 60 * 60,
            Resolution::Hour4 => 4 * 60 * 60,
            Resolution::Day1 => 24 * 60 * 60,
            Resolution::Week1 => 7 * 24 * 60 * 60,
        }
    }

    pub fn parent(&self) -> Option<Resolution> {
        match self {
            Resolution::Min1 => None,
            Resolution::Min5 => Some(Resolution::Min1),
            Resolution::Min15 => Some(Resolution::Min5),
            Resolution::Min30 => Some(Resolution::Min15),
            Resolution::Hour1 => Some(Resolution::Min30),
            Resolution::Hour4 => Some(Resolution::Hour1),
            Resolution::Day1 => Some(Resolution::Hour4),
            Resolution::Week1 => Some(Resolution::Day1),
        }
    }

    /// Number of parent buckets spanned by one bucket of this resolution.
    pub fn backfill_window(&self) -> i64 {
        match self.parent() {
            Some(parent) => self.duration_secs() / parent.duration_secs(),
            None => 1,
        }
    }

    /// Start of the bucket containing `timestamp`. Weeks align to the unix epoch.
    pub fn bucket_start(&self, timestamp: i64) -> i64 {
        timestamp - timestamp.rem_euclid(self.duration_secs())
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|r| r.as_str() == s)
    }

    pub fn all() -> [Resolution; 8] {
        [
            Resolution::Min1,
            Resolution::Min5,
            Resolution::Min15,
            Resolution::Min30,
            Resolution::Hour1,
            Resolution::Hour4,
            Resolution::Day1,
            Resolution::Week1,
        ]
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
