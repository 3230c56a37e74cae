//! # config — read Config from Environment Variables
//!
//! Everything the watcher needs comes from the environment (optionally seeded
//! from a `.env` file by `dotenvy`). Only the Telegram credentials are
//! required; every other value has a default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono_tz::Tz;

use crate::state::{cooldown_in_range, MAX_COOLDOWN_MINUTES};

/// Which phases a single invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Process pending Telegram commands, then scan prices.
    All,
    /// Only process pending Telegram commands.
    Commands,
    /// Only scan prices.
    Scan,
}

impl RunMode {
    pub fn runs_commands(self) -> bool {
        matches!(self, RunMode::All | RunMode::Commands)
    }

    pub fn runs_scan(self) -> bool {
        matches!(self, RunMode::All | RunMode::Scan)
    }
}

impl std::str::FromStr for RunMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(RunMode::All),
            "commands" => Ok(RunMode::Commands),
            "scan" => Ok(RunMode::Scan),
            other => bail!("Unknown RUN_MODE: '{other}'. Use 'all', 'commands' or 'scan'"),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::All => write!(f, "all"),
            RunMode::Commands => write!(f, "commands"),
            RunMode::Scan => write!(f, "scan"),
        }
    }
}

/// All settings for one run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bot token from @BotFather
    pub telegram_token:     String,
    /// Chat that receives price alerts
    pub telegram_chat_id:   String,
    /// The only sender whose commands are accepted
    pub allowed_user_id:    i64,
    pub telegram_api_base:  String,
    pub quote_base_url:     String,

    pub holdings_path:      PathBuf,
    pub config_path:        PathBuf,
    pub state_path:         PathBuf,
    pub offset_path:        PathBuf,

    /// Watch threshold when a position carries no `drop_pct`
    pub default_drop_pct:   f64,
    /// Owned threshold when a position carries no `rise_pct`
    pub default_rise_pct:   f64,
    pub cooldown_watch_min: i64,
    pub cooldown_owned_min: i64,

    pub fetch_timeout:      Duration,
    pub fetch_concurrency:  usize,
    /// Timezone used for timestamps inside notification text
    pub display_tz:         Tz,
    pub run_mode:           RunMode,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let telegram_token = required("TELEGRAM_TOKEN")?;
        let telegram_chat_id = required("TELEGRAM_CHAT_ID")?;

        let allowed_raw = std::env::var("TELEGRAM_ALLOWED_USER_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| telegram_chat_id.clone());
        let allowed_user_id: i64 = allowed_raw
            .trim()
            .parse()
            .with_context(|| format!("TELEGRAM_ALLOWED_USER_ID must be a numeric id, got '{allowed_raw}'"))?;

        let default_drop_pct = env_f64("DEFAULT_DROP_PCT", 10.0)?;
        let default_rise_pct = env_f64("DEFAULT_RISE_PCT", 5.0)?;
        if default_drop_pct <= 0.0 || default_rise_pct <= 0.0 {
            bail!("DEFAULT_DROP_PCT and DEFAULT_RISE_PCT must be positive");
        }

        let fetch_concurrency = env_parse::<usize>("FETCH_CONCURRENCY", 4)?;
        if fetch_concurrency == 0 {
            bail!("FETCH_CONCURRENCY must be at least 1");
        }

        let tz_name = env_or("DISPLAY_TZ", "Europe/Amsterdam");
        let display_tz: Tz = tz_name
            .parse()
            .map_err(|e| anyhow::anyhow!("DISPLAY_TZ '{tz_name}' is not a known timezone: {e}"))?;

        Ok(Self {
            telegram_token,
            telegram_chat_id,
            allowed_user_id,
            telegram_api_base:  env_or("TELEGRAM_API_BASE", "https://api.telegram.org"),
            quote_base_url:     env_or("QUOTE_BASE_URL", "https://query1.finance.yahoo.com"),
            holdings_path:      env_or("HOLDINGS_PATH", "holdings.json").into(),
            config_path:        env_or("CONFIG_PATH", "config.json").into(),
            state_path:         env_or("STATE_PATH", "state.json").into(),
            offset_path:        env_or("TELEGRAM_OFFSET_PATH", "telegram_offset.json").into(),
            default_drop_pct,
            default_rise_pct,
            cooldown_watch_min: checked_cooldown("COOLDOWN_MINUTES_WATCH", env_parse("COOLDOWN_MINUTES_WATCH", 720)?)?,
            cooldown_owned_min: checked_cooldown("COOLDOWN_MINUTES_OWNED", env_parse("COOLDOWN_MINUTES_OWNED", 1440)?)?,
            fetch_timeout:      Duration::from_secs(env_parse("FETCH_TIMEOUT_SECS", 20)?),
            fetch_concurrency,
            display_tz,
            run_mode:           env_or("RUN_MODE", "all").parse()?,
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    let value = std::env::var(key).with_context(|| format!("{key} environment variable is required"))?;
    if value.trim().is_empty() {
        bail!("{key} environment variable is empty");
    }
    Ok(value.trim().to_string())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} must be a number, got '{raw}': {e}")),
        _ => Ok(default),
    }
}

fn checked_cooldown(key: &str, minutes: i64) -> anyhow::Result<i64> {
    if !cooldown_in_range(minutes) {
        bail!("{key} must be between 1 and {MAX_COOLDOWN_MINUTES} minutes, got {minutes}");
    }
    Ok(minutes)
}

fn env_f64(key: &str, default: f64) -> anyhow::Result<f64> {
    let value: f64 = env_parse(key, default)?;
    if !value.is_finite() {
        bail!("{key} must be a finite number");
    }
    Ok(value)
}

#[cfg(test)]
impl Config {
    /// Defaults with every file under `dir`.
    pub(crate) fn for_tests(dir: &std::path::Path) -> Self {
        Self {
            telegram_token:     "TOKEN".into(),
            telegram_chat_id:   "1000".into(),
            allowed_user_id:    1000,
            telegram_api_base:  "http://127.0.0.1:9".into(),
            quote_base_url:     "http://127.0.0.1:9".into(),
            holdings_path:      dir.join("holdings.json"),
            config_path:        dir.join("config.json"),
            state_path:         dir.join("state.json"),
            offset_path:        dir.join("telegram_offset.json"),
            default_drop_pct:   10.0,
            default_rise_pct:   5.0,
            cooldown_watch_min: 720,
            cooldown_owned_min: 1440,
            fetch_timeout:      Duration::from_secs(5),
            fetch_concurrency:  4,
            display_tz:         chrono_tz::Europe::Amsterdam,
            run_mode:           RunMode::All,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_mode_parse() {
        assert_eq!("all".parse::<RunMode>().unwrap(), RunMode::All);
        assert_eq!(" Scan ".parse::<RunMode>().unwrap(), RunMode::Scan);
        assert_eq!("COMMANDS".parse::<RunMode>().unwrap(), RunMode::Commands);
        assert!("loop".parse::<RunMode>().is_err());
    }

    #[test]
    fn test_cooldown_bounds() {
        assert_eq!(checked_cooldown("COOLDOWN_MINUTES_WATCH", 720).unwrap(), 720);
        assert!(checked_cooldown("COOLDOWN_MINUTES_WATCH", 0).is_err());
        assert!(checked_cooldown("COOLDOWN_MINUTES_WATCH", -5).is_err());
        let err = checked_cooldown("COOLDOWN_MINUTES_OWNED", 1_000_000_000_000_000).unwrap_err();
        assert!(err.to_string().contains("COOLDOWN_MINUTES_OWNED"));
    }

    #[test]
    fn test_run_mode_phases() {
        assert!(RunMode::All.runs_commands() && RunMode::All.runs_scan());
        assert!(!RunMode::Scan.runs_commands());
        assert!(!RunMode::Commands.runs_scan());
    }
}
