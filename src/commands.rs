//! # commands — Telegram text commands
//!
//! Parse step: text → [`Command`]. Dispatch step: one exhaustive `match` in
//! [`execute`] that mutates the registry and produces the reply.
//!
//! | Command                              | Alias       |
//! |--------------------------------------|-------------|
//! | `buy SYMBOL PRICE [SHARES]`          | `owned`     |
//! | `watch SYMBOL BASELINE [DROP_PCT]`   |             |
//! | `sell SYMBOL`                        | `remove`    |
//! | `list`                               | `positions` |
//! | `help`                               | `start`     |
//!
//! A leading `/` and a `@botname` suffix on the verb are accepted, so the
//! same text works typed plainly or picked from Telegram's command menu.

use thiserror::Error;
use tracing::info;

use crate::error::AppError;
use crate::models::alert::escape_html;
use crate::models::position::{fmt_number, normalize_symbol};
use crate::registry::{PositionRegistry, Upsert};

const USAGE_BUY: &str = "buy SYMBOL PRICE [SHARES]";
const USAGE_WATCH: &str = "watch SYMBOL BASELINE [DROP_PCT]";
const USAGE_SELL: &str = "sell SYMBOL";

pub const HELP_TEXT: &str = "🤖 <b>Stock watcher</b>\n\n\
    <b>Commands:</b>\n\
    buy SYMBOL PRICE [SHARES] — track an owned position (alias: owned)\n\
    watch SYMBOL BASELINE [DROP_PCT] — alert on a drop below baseline\n\
    sell SYMBOL — stop tracking a symbol (alias: remove)\n\
    list — show tracked positions\n\
    help — this message\n\n\
    <i>Example: buy AAPL 180.00 10</i>";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Buy { symbol: String, price: f64, shares: Option<f64> },
    Watch { symbol: String, baseline: f64, drop_pct: Option<f64> },
    Sell { symbol: String },
    List,
    Help,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandParseError {
    #[error("missing {what}")]
    Missing { what: &'static str, usage: &'static str },

    #[error("'{value}' is not a valid {what}")]
    InvalidNumber { what: &'static str, value: String, usage: &'static str },

    #[error("{what} must be greater than zero")]
    NotPositive { what: &'static str, usage: &'static str },

    #[error("'{value}' is not a valid ticker symbol")]
    InvalidSymbol { value: String, usage: &'static str },

    #[error("too many arguments")]
    TooManyArguments { usage: &'static str },
}

impl CommandParseError {
    pub fn usage(&self) -> &'static str {
        match self {
            CommandParseError::Missing { usage, .. }
            | CommandParseError::InvalidNumber { usage, .. }
            | CommandParseError::NotPositive { usage, .. }
            | CommandParseError::InvalidSymbol { usage, .. }
            | CommandParseError::TooManyArguments { usage } => *usage,
        }
    }

    /// Reply shown to the user.
    pub fn reply(&self) -> String {
        format!("⚠️ {}\nUsage: <code>{}</code>", escape_html(&self.to_string()), self.usage())
    }
}

// ─── Parse ────────────────────────────────────────────────────────────────────

impl Command {
    pub fn parse(text: &str) -> Result<Command, CommandParseError> {
        let mut parts = text.split_whitespace();
        let Some(raw_verb) = parts.next() else {
            return Ok(Command::Unknown(String::new()));
        };

        let verb = raw_verb.trim_start_matches('/');
        let verb = verb.split('@').next().unwrap_or(verb).to_lowercase();
        let args: Vec<&str> = parts.collect();

        match verb.as_str() {
            "buy" | "owned" => {
                let usage = USAGE_BUY;
                max_args(&args, 3, usage)?;
                Ok(Command::Buy {
                    symbol: symbol_arg(args.first().copied(), usage)?,
                    price:  number_arg(args.get(1).copied(), "price", usage)?,
                    shares: optional_number_arg(args.get(2).copied(), "share count", usage)?,
                })
            }
            "watch" => {
                let usage = USAGE_WATCH;
                max_args(&args, 3, usage)?;
                Ok(Command::Watch {
                    symbol:   symbol_arg(args.first().copied(), usage)?,
                    baseline: number_arg(args.get(1).copied(), "baseline", usage)?,
                    drop_pct: optional_number_arg(args.get(2).copied(), "drop percentage", usage)?,
                })
            }
            "sell" | "remove" => {
                max_args(&args, 1, USAGE_SELL)?;
                Ok(Command::Sell {
                    symbol: symbol_arg(args.first().copied(), USAGE_SELL)?,
                })
            }
            "list" | "positions" => Ok(Command::List),
            "help" | "start" => Ok(Command::Help),
            _ => Ok(Command::Unknown(raw_verb.to_string())),
        }
    }
}

fn max_args(args: &[&str], max: usize, usage: &'static str) -> Result<(), CommandParseError> {
    if args.len() > max {
        return Err(CommandParseError::TooManyArguments { usage });
    }
    Ok(())
}

fn symbol_arg(raw: Option<&str>, usage: &'static str) -> Result<String, CommandParseError> {
    let raw = raw.ok_or(CommandParseError::Missing { what: "symbol", usage })?;
    let symbol = normalize_symbol(raw);
    let valid = symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    if !valid {
        return Err(CommandParseError::InvalidSymbol { value: raw.to_string(), usage });
    }
    Ok(symbol)
}

fn number_arg(raw: Option<&str>, what: &'static str, usage: &'static str) -> Result<f64, CommandParseError> {
    let raw = raw.ok_or(CommandParseError::Missing { what, usage })?;
    // "180,50" is how half of Europe writes 180.50
    let value: f64 = raw
        .replace(',', ".")
        .parse()
        .map_err(|_| CommandParseError::InvalidNumber { what, value: raw.to_string(), usage })?;
    if !value.is_finite() {
        return Err(CommandParseError::InvalidNumber { what, value: raw.to_string(), usage });
    }
    if value <= 0.0 {
        return Err(CommandParseError::NotPositive { what, usage });
    }
    Ok(value)
}

fn optional_number_arg(
    raw: Option<&str>,
    what: &'static str,
    usage: &'static str,
) -> Result<Option<f64>, CommandParseError> {
    raw.map(|r| number_arg(Some(r), what, usage)).transpose()
}

// ─── Dispatch ─────────────────────────────────────────────────────────────────

/// Apply `command` to the registry, saving after any mutation, and return
/// the reply text (Telegram HTML).
pub fn execute(registry: &mut PositionRegistry, command: Command) -> Result<String, AppError> {
    match command {
        Command::Buy { symbol, price, shares } => {
            let outcome = registry.upsert_owned(&symbol, price, shares);
            registry.save()?;
            info!(%symbol, price, ?shares, ?outcome, "Owned position stored");

            let mut reply = format!(
                "✅ {} owned <b>{}</b> @ {}",
                verb(outcome),
                escape_html(&symbol),
                fmt_number(price)
            );
            if let Some(shares) = shares {
                reply.push_str(&format!(" × {}", fmt_number(shares)));
            }
            Ok(reply)
        }

        Command::Watch { symbol, baseline, drop_pct } => {
            let outcome = registry.upsert_watch(&symbol, baseline, drop_pct);
            registry.save()?;
            info!(%symbol, baseline, ?drop_pct, ?outcome, "Watch position stored");

            let mut reply = format!(
                "👀 {} watch <b>{}</b> @ {}",
                verb(outcome),
                escape_html(&symbol),
                fmt_number(baseline)
            );
            if let Some(pct) = drop_pct {
                reply.push_str(&format!(" (alert at -{}%)", fmt_number(pct)));
            }
            Ok(reply)
        }

        Command::Sell { symbol } => {
            let removed = registry.remove(&symbol);
            if removed == 0 {
                return Ok(format!("ℹ️ <b>{}</b> is not tracked", escape_html(&symbol)));
            }
            registry.save()?;
            info!(%symbol, removed, "Position removed");
            Ok(format!("🗑️ Removed <b>{}</b>", escape_html(&symbol)))
        }

        Command::List => {
            if registry.list().is_empty() {
                return Ok("📭 No positions tracked".to_string());
            }
            let lines: Vec<String> = registry
                .list()
                .iter()
                .map(|p| escape_html(&p.summary()))
                .collect();
            Ok(format!("<b>Positions</b>\n{}", lines.join("\n")))
        }

        Command::Help => Ok(HELP_TEXT.to_string()),

        Command::Unknown(text) => Ok(format!(
            "❓ Unknown command <code>{}</code>\nSend <code>help</code> for the list of commands.",
            escape_html(&text)
        )),
    }
}

fn verb(outcome: Upsert) -> &'static str {
    match outcome {
        Upsert::Added => "Added",
        Upsert::Updated => "Updated",
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
