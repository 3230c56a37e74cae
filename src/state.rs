//! # state
//!
//! **Cooldown Store** — the persisted record of which alerts already fired.
//!
//! `state.json` maps an [`AlertKey`] to the moment its alert last fired:
//!
//! ```json
//! {
//!   "AAPL::owned_rise": { "last_alert_iso": "2026-10-16T14:05:00+00:00" },
//!   "universe::AEX::ASML.AS::drop10": { "last_alert_iso": "2026-10-16T09:00:00+00:00" }
//! }
//! ```
//!
//! The state is an explicit value: loaded once at the start of a scan, passed
//! by `&mut` into the planner, saved once at the end. Nothing else reads or
//! writes the file.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::AppError;
use crate::models::AlertKey;
use crate::storage::{load_json, save_json};

// ─── AlertRecord ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// When the alert for this key last fired.
    #[serde(deserialize_with = "lenient_timestamp")]
    pub last_alert_iso: DateTime<Utc>,
}

/// RFC 3339 with any offset; timestamps without an offset are taken as UTC.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("bad timestamp '{raw}': {e}")))
}

// ─── CooldownState ────────────────────────────────────────────────────────────

/// Longest accepted cooldown: one year.
pub const MAX_COOLDOWN_MINUTES: i64 = 366 * 24 * 60;

/// Cooldowns must be positive and at most [`MAX_COOLDOWN_MINUTES`].
pub fn cooldown_in_range(minutes: i64) -> bool {
    (1..=MAX_COOLDOWN_MINUTES).contains(&minutes)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CooldownState {
    records: BTreeMap<AlertKey, AlertRecord>,
}

impl CooldownState {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Missing file → empty state. Unparseable file → empty state (logged).
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let state: CooldownState = load_json(path, CooldownState::default())?;
        debug!(path = %path.display(), records = state.len(), "Cooldown state loaded");
        Ok(state)
    }

    /// Rewrites the whole file atomically.
    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        save_json(path, self)?;
        debug!(path = %path.display(), records = self.len(), "Cooldown state saved");
        Ok(())
    }

    /// `true` iff `key` fired less than `cooldown_minutes` before `now`.
    pub fn should_suppress(&self, key: &AlertKey, now: DateTime<Utc>, cooldown_minutes: i64) -> bool {
        let Some(record) = self.records.get(key) else {
            return false;
        };
        match TimeDelta::try_minutes(cooldown_minutes) {
            Some(window) => now.signed_duration_since(record.last_alert_iso) < window,
            // beyond chrono's range: the window never closes
            None => true,
        }
    }

    /// Insert or overwrite the record for `key` with `now`.
    pub fn record_fired(&mut self, key: AlertKey, now: DateTime<Utc>) {
        self.records.insert(key, AlertRecord { last_alert_iso: now });
    }

    /// Drop records older than `max_age_minutes`; they can no longer suppress
    /// anything. Returns how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>, max_age_minutes: i64) -> usize {
        let Some(max_age) = TimeDelta::try_minutes(max_age_minutes) else {
            return 0;
        };
        let before = self.records.len();
        self.records
            .retain(|_, record| now.signed_duration_since(record.last_alert_iso) < max_age);
        before - self.records.len()
    }

    #[cfg(test)]
    pub fn get(&self, key: &AlertKey) -> Option<&AlertRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
