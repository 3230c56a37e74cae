//! # quotes — Quote Provider
//!
//! Fetches the last price and previous close for a ticker.
//!
//! ## Data Source
//! Yahoo Finance chart API, one request per symbol:
//! `GET {base}/v8/finance/chart/{symbol}?range=5d&interval=1d`
//!
//! - last price     = `meta.regularMarketPrice` (else the last daily close)
//! - previous close = second-to-last daily close (the only close when there is
//!   just one), else `meta.chartPreviousClose`

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::AppError;
use crate::models::Quote;

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn fetch(&self, symbol: &str) -> Result<Quote, AppError>;
}

// ─── Yahoo response ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error:  Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code:        Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta:       ChartMeta,
    #[serde(default)]
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

// ─── YahooQuoteProvider ───────────────────────────────────────────────────────

pub struct YahooQuoteProvider {
    client:   reqwest::Client,
    base_url: reqwest::Url,
}

impl YahooQuoteProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("HTTP client: {e}")))?;

        let base_url = reqwest::Url::parse(base_url)
            .map_err(|e| AppError::Configuration(format!("quote base URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Configuration(format!("quote base URL '{base_url}' cannot carry a path")));
        }

        Ok(Self { client, base_url })
    }

    /// `{base}/v8/finance/chart/{symbol}` with the symbol as one
    /// percent-encoded path segment.
    fn chart_url(&self, symbol: &str) -> Result<reqwest::Url, AppError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::fetch(symbol, "quote base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart"])
            .push(symbol);
        Ok(url)
    }
}

#[async_trait]
impl QuoteProvider for YahooQuoteProvider {
    async fn fetch(&self, symbol: &str) -> Result<Quote, AppError> {
        let url = self.chart_url(symbol)?;
        debug!(symbol, url = %url, "Fetching quote");

        let response = self
            .client
            .get(url)
            .query(&[("range", "5d"), ("interval", "1d")])
            .send()
            .await
            .map_err(|e| AppError::fetch(symbol, format!("quote API unreachable: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::fetch(symbol, format!("reading body: {e}")))?;

        // Yahoo reports unknown symbols as 404 with a JSON error body; prefer
        // that description over the bare status code.
        let parsed: Result<ChartResponse, _> = serde_json::from_str(&body);
        match parsed {
            Ok(chart) => parse_chart(symbol, chart),
            Err(_) if !status.is_success() => Err(AppError::fetch(symbol, format!("HTTP {status}"))),
            Err(e) => Err(AppError::fetch(symbol, format!("unexpected payload: {e}"))),
        }
    }
}

fn parse_chart(symbol: &str, response: ChartResponse) -> Result<Quote, AppError> {
    if let Some(err) = response.chart.error {
        return Err(AppError::fetch(
            symbol,
            format!(
                "{}: {}",
                err.code.as_deref().unwrap_or("error"),
                err.description.as_deref().unwrap_or("no description")
            ),
        ));
    }

    let result = response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| AppError::fetch(symbol, "no chart data returned"))?;

    let closes: Vec<f64> = result
        .indicators
        .and_then(|ind| ind.quote.into_iter().next())
        .map(|series| {
            series
                .close
                .into_iter()
                .flatten()
                .filter(|c| c.is_finite() && *c > 0.0)
                .collect()
        })
        .unwrap_or_default();

    let last_price = result
        .meta
        .regular_market_price
        .filter(|p| p.is_finite() && *p > 0.0)
        .or_else(|| closes.last().copied())
        .ok_or_else(|| AppError::fetch(symbol, "no last price"))?;

    let prev_close = match closes.len() {
        0 => result.meta.chart_previous_close,
        1 => Some(closes[0]),
        n => Some(closes[n - 2]),
    };

    Ok(Quote::new(symbol, last_price, prev_close))
}
