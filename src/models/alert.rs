//! # models::alert
//!
//! Alert vocabulary: which way a threshold is crossed, which category an item
//! belongs to, the key its cooldown is tracked under, and the fired [`Alert`]
//! that becomes a Telegram message.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::models::position::fmt_number;

// ─── Direction ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Fire when the price climbs at least `threshold_pct` above reference.
    Rise,
    /// Fire when the price falls at least `threshold_pct` below reference.
    Drop,
}

// ─── Category ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    Owned,
    Watch,
    /// Member of the named universe.
    Universe(String),
}

impl Category {
    pub fn direction(&self) -> Direction {
        match self {
            Category::Owned => Direction::Rise,
            Category::Watch | Category::Universe(_) => Direction::Drop,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Owned => write!(f, "owned"),
            Category::Watch => write!(f, "watch"),
            Category::Universe(name) => write!(f, "universe:{name}"),
        }
    }
}

// ─── AlertKey ─────────────────────────────────────────────────────────────────

/// Cooldown key for one monitored item.
///
/// The rendered strings match the layout already present in existing
/// `state.json` files, so upgrading keeps every running cooldown.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertKey(String);

impl AlertKey {
    pub fn owned(symbol: &str) -> Self {
        AlertKey(format!("{symbol}::owned_rise"))
    }

    pub fn watch(symbol: &str) -> Self {
        AlertKey(format!("{symbol}::watch_drop_fixed"))
    }

    /// The drop threshold is part of the key: retuning a universe starts a
    /// fresh cooldown.
    pub fn universe(name: &str, symbol: &str, drop_pct: f64) -> Self {
        AlertKey(format!("universe::{name}::{symbol}::drop{}", drop_pct.trunc() as i64))
    }

    pub fn for_item(category: &Category, symbol: &str, threshold_pct: f64) -> Self {
        match category {
            Category::Owned => AlertKey::owned(symbol),
            Category::Watch => AlertKey::watch(symbol),
            Category::Universe(name) => AlertKey::universe(name, symbol, threshold_pct),
        }
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AlertKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Alert ────────────────────────────────────────────────────────────────────

/// A threshold crossing that passed the cooldown check.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub key:             AlertKey,
    pub category:        Category,
    pub symbol:          String,
    pub reference_price: f64,
    pub current_price:   f64,
    pub pct_change:      f64,
    pub threshold_pct:   f64,
    pub shares:          Option<f64>,
    pub fired_at:        DateTime<Utc>,
}

impl Alert {
    /// Price at which the threshold is exactly met.
    pub fn target_price(&self) -> f64 {
        match self.category.direction() {
            Direction::Rise => self.reference_price * (1.0 + self.threshold_pct / 100.0),
            Direction::Drop => self.reference_price * (1.0 - self.threshold_pct / 100.0),
        }
    }

    /// Telegram HTML message.
    pub fn render(&self, tz: Tz) -> String {
        let symbol = escape_html(&self.symbol);
        let threshold = fmt_number(self.threshold_pct);
        let stamp = format!(
            "⏰ {} ({})",
            self.fired_at.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
            tz.name()
        );
        let prices = |cmp: &str, sign: &str| {
            format!(
                "Current price: {}  |  Target ({cmp} {sign}{threshold}%): {}",
                fmt_price(self.current_price),
                fmt_price(self.target_price()),
            )
        };

        let mut lines: Vec<String> = Vec::with_capacity(6);
        match &self.category {
            Category::Owned => {
                lines.push(format!(
                    "📈 <b>{symbol}</b> (owned) is {:+.2}% vs your entry ({}).",
                    self.pct_change,
                    fmt_price(self.reference_price)
                ));
                lines.push(prices("≥", "+"));
                if let Some(shares) = self.shares {
                    lines.push(format!("Shares: {}", fmt_number(shares)));
                }
                lines.push(stamp);
                lines.push(String::new());
                lines.push("👉 Alert: take-profit threshold reached.".to_string());
            }
            Category::Watch => {
                lines.push(format!(
                    "🔻 <b>{symbol}</b> (watch) is {:+.2}% vs your baseline ({}).",
                    self.pct_change,
                    fmt_price(self.reference_price)
                ));
                lines.push(prices("≤", "-"));
                lines.push(stamp);
                lines.push(String::new());
                lines.push(format!("👉 Alert: price fell ≥{threshold}% from baseline."));
            }
            Category::Universe(name) => {
                lines.push(format!(
                    "🔻 <b>{symbol}</b> ({}) is {:+.2}% vs previous close ({}).",
                    escape_html(name),
                    self.pct_change,
                    fmt_price(self.reference_price)
                ));
                lines.push(prices("≤", "-"));
                lines.push(stamp);
                lines.push(String::new());
                lines.push(format!("👉 Universe scan: drop ≥{threshold}% vs previous close."));
            }
        }
        lines.join("\n")
    }
}

/// Two decimals with thousands separators: `12,345.60`.
pub fn fmt_price(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}{grouped}.{frac_part}")
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
