//! # models::universe
//!
//! Named ticker lists scanned for drops against the previous close.
//!
//! `config.json`:
//! ```json
//! { "universes": [
//!     { "name": "AEX", "file": "universes/aex.json", "drop_pct": 8,
//!       "baseline_mode": "prev_close", "cooldown_minutes": 720 }
//! ] }
//! ```
//! The member file is a plain JSON array of tickers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AppError;
use crate::storage::load_json;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BaselineMode {
    /// Previous trading day's close, fetched fresh on every run.
    #[default]
    PrevClose,
    Unsupported(String),
}

impl From<String> for BaselineMode {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "prev_close" => BaselineMode::PrevClose,
            _ => BaselineMode::Unsupported(raw),
        }
    }
}

impl From<BaselineMode> for String {
    fn from(mode: BaselineMode) -> Self {
        match mode {
            BaselineMode::PrevClose => "prev_close".to_string(),
            BaselineMode::Unsupported(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseDefinition {
    #[serde(default = "default_name")]
    pub name: String,
    /// Path of the member list; relative paths resolve against the config file.
    pub file: PathBuf,
    #[serde(default = "default_drop_pct")]
    pub drop_pct: f64,
    #[serde(default)]
    pub baseline_mode: BaselineMode,
    #[serde(default = "default_cooldown")]
    pub cooldown_minutes: i64,
}

fn default_name() -> String {
    "UNIVERSE".to_string()
}
fn default_drop_pct() -> f64 {
    10.0
}
fn default_cooldown() -> i64 {
    720
}

impl UniverseDefinition {
    /// Load the member tickers. Blank entries are dropped, duplicates
    /// collapse to their first occurrence.
    pub fn load_members(&self, base_dir: &Path) -> Result<Vec<String>, AppError> {
        let path = if self.file.is_absolute() {
            self.file.clone()
        } else {
            base_dir.join(&self.file)
        };

        let raw: Vec<String> = load_json(&path, Vec::new())?;
        let mut members: Vec<String> = Vec::with_capacity(raw.len());
        for symbol in raw {
            let symbol = symbol.trim().to_string();
            if !symbol.is_empty() && !members.contains(&symbol) {
                members.push(symbol);
            }
        }

        if members.is_empty() {
            warn!(universe = %self.name, file = %path.display(), "Universe empty or not found");
        }
        Ok(members)
    }
}

// ─── UniverseConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UniverseConfig {
    #[serde(default)]
    pub universes: Vec<UniverseDefinition>,
}

/// A universe together with its resolved member list.
#[derive(Debug, Clone)]
pub struct LoadedUniverse {
    pub definition: UniverseDefinition,
    pub members:    Vec<String>,
}

impl UniverseConfig {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        load_json(path, UniverseConfig::default())
    }

    /// Resolve every universe's member file. Member files resolve relative to
    /// the directory holding `config_path`.
    pub fn load_universes(&self, config_path: &Path) -> Result<Vec<LoadedUniverse>, AppError> {
        let base_dir = config_path.parent().unwrap_or_else(|| Path::new(""));
        self.universes
            .iter()
            .map(|definition| {
                Ok(LoadedUniverse {
                    members: definition.load_members(base_dir)?,
                    definition: definition.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::scratch_dir;

    #[test]
    fn test_defaults_applied() {
        let cfg: UniverseConfig = serde_json::from_str(r#"{"universes":[{"file":"aex.json"}]}"#).unwrap();
        let u = &cfg.universes[0];
        assert_eq!(u.name, "UNIVERSE");
        assert_eq!(u.drop_pct, 10.0);
        assert_eq!(u.baseline_mode, BaselineMode::PrevClose);
        assert_eq!(u.cooldown_minutes, 720);
    }

    #[test]
    fn test_unsupported_baseline_mode_kept() {
        let cfg: UniverseConfig =
            serde_json::from_str(r#"{"universes":[{"file":"a.json","baseline_mode":"vwap"}]}"#).unwrap();
        assert_eq!(cfg.universes[0].baseline_mode, BaselineMode::Unsupported("vwap".into()));
    }

    #[test]
    fn test_members_resolve_relative_to_config() {
        let dir = scratch_dir();
        std::fs::create_dir_all(dir.join("universes")).unwrap();
        std::fs::write(dir.join("universes/aex.json"), r#"[" ASML.AS", "INGA.AS", "", "ASML.AS"]"#).unwrap();
        std::fs::write(
            dir.join("config.json"),
            r#"{"universes":[{"name":"AEX","file":"universes/aex.json","drop_pct":8}]}"#,
        )
        .unwrap();

        let config_path = dir.join("config.json");
        let cfg = UniverseConfig::load(&config_path).unwrap();
        let loaded = cfg.load_universes(&config_path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].members, vec!["ASML.AS".to_string(), "INGA.AS".to_string()]);
    }

    #[test]
    fn test_missing_member_file_is_empty() {
        let dir = scratch_dir();
        let u = UniverseDefinition {
            name: "X".into(),
            file: "missing.json".into(),
            drop_pct: 10.0,
            baseline_mode: BaselineMode::PrevClose,
            cooldown_minutes: 720,
        };
        assert!(u.load_members(&dir).unwrap().is_empty());
    }
}
