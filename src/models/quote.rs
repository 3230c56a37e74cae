//! # models::quote

use serde::{Deserialize, Serialize};

/// Latest price data for one ticker, as delivered by a `QuoteProvider`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol:     String,
    /// Most recent traded price.
    pub last_price: f64,
    /// Close of the previous trading day, when the provider knows it.
    pub prev_close: Option<f64>,
}

impl Quote {
    pub fn new(symbol: &str, last_price: f64, prev_close: Option<f64>) -> Self {
        Self {
            symbol: symbol.to_string(),
            last_price,
            prev_close,
        }
    }
}
