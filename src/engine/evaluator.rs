//! # engine::evaluator
//!
//! **Alert Evaluator** — decides whether a price crossed its threshold.
//!
//! ```text
//! pct_change = (current - reference) / reference * 100
//!
//! Rise → fire when pct_change >=  threshold_pct
//! Drop → fire when pct_change <= -threshold_pct
//! ```
//!
//! The same function serves owned positions (Rise vs. entry price), watch
//! positions (Drop vs. baseline) and universe members (Drop vs. previous
//! close). Nothing here touches state; the caller owns cooldown handling.

use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::Direction;

/// Percentage move from `reference_price` to `current_price`.
///
/// Fails with `InvalidReference` instead of dividing by a zero, negative or
/// non-finite reference.
pub fn pct_change(symbol: &str, current_price: f64, reference_price: f64) -> Result<f64, AppError> {
    if !reference_price.is_finite() || reference_price <= 0.0 {
        return Err(AppError::InvalidReference {
            symbol: symbol.to_string(),
            reference: reference_price,
        });
    }
    Ok((current_price - reference_price) / reference_price * 100.0)
}

/// `true` when the alert condition holds.
///
/// A missing or nonsensical `current_price` (NaN, infinite, zero or below)
/// never fires; it is logged and treated as "no data".
pub fn evaluate(
    symbol: &str,
    current_price: f64,
    reference_price: f64,
    threshold_pct: f64,
    direction: Direction,
) -> Result<bool, AppError> {
    if !threshold_pct.is_finite() || threshold_pct <= 0.0 {
        return Err(AppError::InvalidThreshold {
            symbol: symbol.to_string(),
            threshold: threshold_pct,
        });
    }

    if !current_price.is_finite() || current_price <= 0.0 {
        warn!(symbol, current_price, "Unusable current price — skipping");
        return Ok(false);
    }

    let pct = pct_change(symbol, current_price, reference_price)?;
    let hit = match direction {
        Direction::Rise => pct >= threshold_pct,
        Direction::Drop => pct <= -threshold_pct,
    };

    debug!(
        symbol,
        current_price,
        reference_price,
        pct_change = pct,
        threshold_pct,
        ?direction,
        hit,
        "Evaluated"
    );
    Ok(hit)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
