//! # error
//!
//! Centralised application error type.
//!
//! Per-item failures (`Fetch`, `InvalidReference`, `InvalidThreshold`) are
//! recovered by the scan loop: the item is logged and skipped, the rest of the
//! run continues. `Configuration` only ever surfaces at startup and aborts the
//! process with a non-zero exit code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or malformed setting (env var, config file). Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The quote provider could not deliver a usable price for this symbol.
    #[error("Fetch failed for {symbol}: {reason}")]
    Fetch { symbol: String, reason: String },

    /// Reference price is zero, negative or not a number.
    #[error("Invalid reference price for {symbol}: {reference}")]
    InvalidReference { symbol: String, reference: f64 },

    /// Threshold percentage must be a positive finite number.
    #[error("Invalid threshold for {symbol}: {threshold}%")]
    InvalidThreshold { symbol: String, threshold: f64 },

    /// Telegram refused or never received the message.
    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Storage error at {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn fetch(symbol: &str, reason: impl std::fmt::Display) -> Self {
        AppError::Fetch {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn storage(path: &std::path::Path, source: std::io::Error) -> Self {
        AppError::Storage {
            path: path.display().to_string(),
            source,
        }
    }
}
