//! # models::position
//!
//! One entry of `holdings.json`.
//!
//! `Position` mirrors the file layout field for field so the registry can
//! rewrite the file without losing anything a human put there. The status
//! string is kept verbatim when it is neither `owned` nor `watch`; such
//! entries are skipped by the scan but survive a save.

use serde::{Deserialize, Serialize};

// ─── PositionStatus ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PositionStatus {
    /// Held stock; alerts on a rise above `entry_price`.
    Owned,
    /// Watched stock; alerts on a drop below `baseline`.
    Watch,
    /// Anything else found in the file.
    Other(String),
}

impl From<String> for PositionStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "owned" => PositionStatus::Owned,
            "watch" => PositionStatus::Watch,
            _ => PositionStatus::Other(raw),
        }
    }
}

impl From<PositionStatus> for String {
    fn from(status: PositionStatus) -> Self {
        match status {
            PositionStatus::Owned => "owned".to_string(),
            PositionStatus::Watch => "watch".to_string(),
            PositionStatus::Other(raw) => raw,
        }
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionStatus::Owned => write!(f, "owned"),
            PositionStatus::Watch => write!(f, "watch"),
            PositionStatus::Other(raw) => write!(f, "{raw}"),
        }
    }
}

// ─── Position ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub status: PositionStatus,
    /// Purchase price (owned only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<f64>,
    /// Fixed reference price (watch only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rise_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<f64>,
}

impl Position {
    pub fn owned(symbol: &str, entry_price: f64, shares: Option<f64>) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            status: PositionStatus::Owned,
            entry_price: Some(entry_price),
            baseline: None,
            rise_pct: None,
            drop_pct: None,
            shares,
        }
    }

    pub fn watch(symbol: &str, baseline: f64, drop_pct: Option<f64>) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            status: PositionStatus::Watch,
            entry_price: None,
            baseline: Some(baseline),
            rise_pct: None,
            drop_pct,
            shares: None,
        }
    }

    /// Case-insensitive symbol comparison, ignoring surrounding whitespace.
    pub fn matches_symbol(&self, symbol: &str) -> bool {
        self.symbol.trim().eq_ignore_ascii_case(symbol.trim())
    }

    /// One human-readable line for the `list` command.
    pub fn summary(&self) -> String {
        match self.status {
            PositionStatus::Owned => {
                let mut line = format!(
                    "📈 {} owned @ {}",
                    self.symbol,
                    self.entry_price.map(fmt_number).unwrap_or_else(|| "?".into())
                );
                if let Some(pct) = self.rise_pct {
                    line.push_str(&format!(" (+{}%)", fmt_number(pct)));
                }
                if let Some(shares) = self.shares {
                    line.push_str(&format!(" × {}", fmt_number(shares)));
                }
                line
            }
            PositionStatus::Watch => {
                let mut line = format!(
                    "👀 {} watch @ {}",
                    self.symbol,
                    self.baseline.map(fmt_number).unwrap_or_else(|| "?".into())
                );
                if let Some(pct) = self.drop_pct {
                    line.push_str(&format!(" (-{}%)", fmt_number(pct)));
                }
                line
            }
            PositionStatus::Other(ref raw) => format!("❔ {} ({raw})", self.symbol),
        }
    }
}

pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Shortest readable form: `10` rather than `10.0`, `7.5` rather than `7.50`.
pub fn fmt_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        let s = format!("{value:.4}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
