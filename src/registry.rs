//! # registry — Position Registry
//!
//! The owned/watch positions from `holdings.json`. Commands mutate it and the
//! caller saves right after each mutation; the scan only reads it.
//!
//! A symbol is unique within its category: `buy AAPL` and `watch AAPL` may
//! coexist, but two owned AAPL entries never do.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::AppError;
use crate::models::position::normalize_symbol;
use crate::models::{Position, PositionStatus};
use crate::storage::{load_json, load_json_strict, save_json};

#[derive(Debug, Clone)]
pub struct PositionRegistry {
    path:      PathBuf,
    positions: Vec<Position>,
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Added,
    Updated,
}

impl PositionRegistry {
    /// Load for editing. A file that exists but does not parse is an error,
    /// so a later `save()` can never overwrite positions it failed to read.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let positions: Vec<Position> = load_json_strict(path, Vec::new())?;
        Ok(Self {
            path: path.to_path_buf(),
            positions,
        })
    }

    /// Load for reading only: an unparseable file counts as empty (logged).
    pub fn load_or_empty(path: &Path) -> Result<Self, AppError> {
        let positions: Vec<Position> = load_json(path, Vec::new())?;
        Ok(Self {
            path: path.to_path_buf(),
            positions,
        })
    }

    /// Registry not yet backed by anything on disk.
    #[cfg(test)]
    pub fn in_memory(path: &Path, positions: Vec<Position>) -> Self {
        Self {
            path: path.to_path_buf(),
            positions,
        }
    }

    pub fn save(&self) -> Result<(), AppError> {
        save_json(&self.path, &self.positions)?;
        info!(path = %self.path.display(), positions = self.positions.len(), "💾 Registry saved");
        Ok(())
    }

    pub fn list(&self) -> &[Position] {
        &self.positions
    }

    /// Add or update an owned position. An update replaces the entry price
    /// and, when given, the share count; a custom `rise_pct` is kept.
    pub fn upsert_owned(&mut self, symbol: &str, entry_price: f64, shares: Option<f64>) -> Upsert {
        let symbol = normalize_symbol(symbol);
        match self.find_mut(&symbol, &PositionStatus::Owned) {
            Some(existing) => {
                existing.entry_price = Some(entry_price);
                if shares.is_some() {
                    existing.shares = shares;
                }
                Upsert::Updated
            }
            None => {
                self.positions.push(Position::owned(&symbol, entry_price, shares));
                Upsert::Added
            }
        }
    }

    /// Add or update a watch position. `drop_pct = None` keeps whatever
    /// threshold an existing entry had.
    pub fn upsert_watch(&mut self, symbol: &str, baseline: f64, drop_pct: Option<f64>) -> Upsert {
        let symbol = normalize_symbol(symbol);
        match self.find_mut(&symbol, &PositionStatus::Watch) {
            Some(existing) => {
                existing.baseline = Some(baseline);
                if drop_pct.is_some() {
                    existing.drop_pct = drop_pct;
                }
                Upsert::Updated
            }
            None => {
                self.positions.push(Position::watch(&symbol, baseline, drop_pct));
                Upsert::Added
            }
        }
    }

    /// Remove every entry for `symbol`, whatever its category. Returns the
    /// number of entries removed.
    pub fn remove(&mut self, symbol: &str) -> usize {
        let before = self.positions.len();
        self.positions.retain(|p| !p.matches_symbol(symbol));
        before - self.positions.len()
    }

    fn find_mut(&mut self, symbol: &str, status: &PositionStatus) -> Option<&mut Position> {
        self.positions
            .iter_mut()
            .find(|p| &p.status == status && p.matches_symbol(symbol))
    }
}
