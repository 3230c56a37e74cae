//! # engine::scan
//!
//! **Scan run** — one pass over everything being monitored.
//!
//! ```text
//! holdings.json ─┐
//!                ├─► monitored_items ─► fetch_quotes ─► plan_alerts ─► save state ─► dispatch_alerts
//! config.json  ──┘                                          ▲   │
//!                                          state.json ──────┘   └─► record fired keys
//! ```
//!
//! Fired alerts are recorded and the state file is written *before* any
//! message goes out. A crash mid-delivery can therefore lose a notification
//! but never sends one twice inside its cooldown window.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::evaluator::{evaluate, pct_change};
use crate::error::AppError;
use crate::models::{
    Alert, AlertKey, BaselineMode, Category, Direction, LoadedUniverse, Position, PositionStatus, Quote,
    UniverseConfig,
};
use crate::quotes::QuoteProvider;
use crate::registry::PositionRegistry;
use crate::state::{cooldown_in_range, CooldownState, MAX_COOLDOWN_MINUTES};
use crate::telegram::Notifier;

// ─── MonitoredItem ────────────────────────────────────────────────────────────

/// Where the reference price of an item comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceSource {
    /// Entry price or baseline from `holdings.json`.
    Fixed(f64),
    /// Previous daily close from the quote.
    PrevClose,
}

/// One (category, symbol) pair evaluated this run.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItem {
    pub category:         Category,
    pub symbol:           String,
    pub reference:        ReferenceSource,
    pub threshold_pct:    f64,
    pub cooldown_minutes: i64,
    pub shares:           Option<f64>,
}

impl MonitoredItem {
    pub fn direction(&self) -> Direction {
        self.category.direction()
    }

    pub fn key(&self) -> AlertKey {
        AlertKey::for_item(&self.category, &self.symbol, self.threshold_pct)
    }
}

/// Outcome counts of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub items:      usize,
    /// Items with a price and a valid reference.
    pub evaluated:  usize,
    pub fired:      usize,
    /// Threshold crossed but still inside the cooldown window.
    pub suppressed: usize,
    /// No quote, no reference or invalid numbers.
    pub skipped:    usize,
    pub delivered:  usize,
}

// ─── Build ────────────────────────────────────────────────────────────────────

/// Everything to evaluate this run: owned and watch positions first, then
/// universe members in config order.
pub fn monitored_items(positions: &[Position], universes: &[LoadedUniverse], config: &Config) -> Vec<MonitoredItem> {
    let mut items = Vec::with_capacity(positions.len());

    for position in positions {
        match &position.status {
            PositionStatus::Owned => {
                let Some(entry_price) = position.entry_price else {
                    warn!(symbol = %position.symbol, "Owned position without entry_price — skipping");
                    continue;
                };
                items.push(MonitoredItem {
                    category:         Category::Owned,
                    symbol:           position.symbol.clone(),
                    reference:        ReferenceSource::Fixed(entry_price),
                    threshold_pct:    position.rise_pct.unwrap_or(config.default_rise_pct),
                    cooldown_minutes: config.cooldown_owned_min,
                    shares:           position.shares,
                });
            }
            PositionStatus::Watch => {
                let Some(baseline) = position.baseline else {
                    debug!(symbol = %position.symbol, "Watch position without baseline — skipping");
                    continue;
                };
                items.push(MonitoredItem {
                    category:         Category::Watch,
                    symbol:           position.symbol.clone(),
                    reference:        ReferenceSource::Fixed(baseline),
                    threshold_pct:    position.drop_pct.unwrap_or(config.default_drop_pct),
                    cooldown_minutes: config.cooldown_watch_min,
                    shares:           position.shares,
                });
            }
            PositionStatus::Other(raw) => {
                debug!(symbol = %position.symbol, status = %raw, "Unmonitored status — skipping");
            }
        }
    }

    for universe in universes {
        let definition = &universe.definition;
        if let BaselineMode::Unsupported(mode) = &definition.baseline_mode {
            warn!(universe = %definition.name, mode = %mode, "Unsupported baseline_mode — universe skipped");
            continue;
        }
        if !cooldown_in_range(definition.cooldown_minutes) {
            warn!(
                universe = %definition.name,
                cooldown_minutes = definition.cooldown_minutes,
                max = MAX_COOLDOWN_MINUTES,
                "cooldown_minutes out of range — universe skipped"
            );
            continue;
        }
        items.extend(universe.members.iter().map(|symbol| MonitoredItem {
            category:         Category::Universe(definition.name.clone()),
            symbol:           symbol.clone(),
            reference:        ReferenceSource::PrevClose,
            threshold_pct:    definition.drop_pct,
            cooldown_minutes: definition.cooldown_minutes,
            shares:           None,
        }));
    }

    items
}

// ─── Fetch ────────────────────────────────────────────────────────────────────

/// Fetch every distinct symbol once, at most `concurrency` requests in
/// flight. A failure stays in the map as that symbol's `Err`.
pub async fn fetch_quotes<I>(
    provider: &dyn QuoteProvider,
    symbols: I,
    concurrency: usize,
) -> HashMap<String, Result<Quote, AppError>>
where
    I: IntoIterator<Item = String>,
{
    let distinct: BTreeSet<String> = symbols.into_iter().collect();
    debug!(symbols = distinct.len(), concurrency, "Fetching quotes");

    stream::iter(distinct)
        .map(|symbol| async move {
            let result = provider.fetch(&symbol).await;
            if let Err(e) = &result {
                warn!(symbol = %symbol, error = %e, "Quote unavailable");
            }
            (symbol, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

// ─── Plan ─────────────────────────────────────────────────────────────────────

/// Decide which items fire. Fired keys are recorded in `state` as `now`, so
/// a second item sharing a key in the same run is suppressed.
pub fn plan_alerts(
    items: &[MonitoredItem],
    quotes: &HashMap<String, Result<Quote, AppError>>,
    state: &mut CooldownState,
    now: DateTime<Utc>,
) -> (Vec<Alert>, ScanReport) {
    let mut alerts = Vec::new();
    let mut report = ScanReport {
        items: items.len(),
        ..ScanReport::default()
    };

    for item in items {
        let Some(Ok(quote)) = quotes.get(&item.symbol) else {
            debug!(symbol = %item.symbol, category = %item.category, "No quote — skipping");
            report.skipped += 1;
            continue;
        };

        let reference = match item.reference {
            ReferenceSource::Fixed(price) => price,
            ReferenceSource::PrevClose => match quote.prev_close {
                Some(price) => price,
                None => {
                    warn!(symbol = %item.symbol, category = %item.category, "No previous close — skipping");
                    report.skipped += 1;
                    continue;
                }
            },
        };

        let checked = pct_change(&item.symbol, quote.last_price, reference).and_then(|pct| {
            evaluate(&item.symbol, quote.last_price, reference, item.threshold_pct, item.direction())
                .map(|hit| (pct, hit))
        });
        let (pct, hit) = match checked {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(category = %item.category, error = %e, "Item skipped");
                report.skipped += 1;
                continue;
            }
        };
        report.evaluated += 1;
        if !hit {
            continue;
        }

        let key = item.key();
        if state.should_suppress(&key, now, item.cooldown_minutes) {
            debug!(key = %key, cooldown_minutes = item.cooldown_minutes, "Alert suppressed by cooldown");
            report.suppressed += 1;
            continue;
        }

        info!(
            symbol = %item.symbol,
            category = %item.category,
            pct_change = pct,
            threshold_pct = item.threshold_pct,
            "🚨 Alert fired"
        );
        state.record_fired(key.clone(), now);
        report.fired += 1;
        alerts.push(Alert {
            key,
            category:        item.category.clone(),
            symbol:          item.symbol.clone(),
            reference_price: reference,
            current_price:   quote.last_price,
            pct_change:      pct,
            threshold_pct:   item.threshold_pct,
            shares:          item.shares,
            fired_at:        now,
        });
    }

    (alerts, report)
}

// ─── Dispatch ─────────────────────────────────────────────────────────────────

/// Send each alert; returns how many were delivered. Failures are logged and
/// stay recorded in the cooldown state.
pub async fn dispatch_alerts(notifier: &dyn Notifier, chat_id: &str, alerts: &[Alert], tz: Tz) -> usize {
    let mut delivered = 0;
    for alert in alerts {
        match notifier.send(chat_id, &alert.render(tz)).await {
            Ok(()) => delivered += 1,
            Err(e) => error!(key = %alert.key, error = %e, "❌ Alert not delivered"),
        }
    }
    delivered
}

// ─── Run ──────────────────────────────────────────────────────────────────────

/// Full scan: load → fetch → plan → prune → save → dispatch.
pub async fn run_scan(
    config: &Config,
    provider: &dyn QuoteProvider,
    notifier: &dyn Notifier,
) -> Result<ScanReport, AppError> {
    // ── 1. Inputs ─────────────────────────────────────────────────────────────
    let registry = PositionRegistry::load_or_empty(&config.holdings_path)?;
    let universes = UniverseConfig::load(&config.config_path)?.load_universes(&config.config_path)?;
    let items = monitored_items(registry.list(), &universes, config);

    // ── 2. Quotes ─────────────────────────────────────────────────────────────
    let quotes = fetch_quotes(
        provider,
        items.iter().map(|item| item.symbol.clone()),
        config.fetch_concurrency,
    )
    .await;

    // ── 3. Decide ─────────────────────────────────────────────────────────────
    let mut state = CooldownState::load(&config.state_path)?;
    let now = Utc::now();
    let (alerts, mut report) = plan_alerts(&items, &quotes, &mut state, now);

    // ── 4. Persist before anything leaves the process ────────────────────────
    let pruned = state.prune(now, longest_cooldown(config, &universes));
    if let Err(e) = state.save(&config.state_path) {
        // Alerts still go out; the next run may repeat them.
        error!(error = %e, "Cooldown state not saved");
    }

    // ── 5. Notify ─────────────────────────────────────────────────────────────
    report.delivered = dispatch_alerts(notifier, &config.telegram_chat_id, &alerts, config.display_tz).await;

    info!(
        items = report.items,
        evaluated = report.evaluated,
        fired = report.fired,
        suppressed = report.suppressed,
        skipped = report.skipped,
        delivered = report.delivered,
        pruned,
        "📊 Scan complete"
    );
    Ok(report)
}

/// Records older than every configured cooldown can no longer suppress.
fn longest_cooldown(config: &Config, universes: &[LoadedUniverse]) -> i64 {
    universes
        .iter()
        .map(|u| u.definition.cooldown_minutes)
        .filter(|minutes| cooldown_in_range(*minutes))
        .chain([config.cooldown_watch_min, config.cooldown_owned_min])
        .max()
        .unwrap_or(config.cooldown_owned_min)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{execute, Command};
    use crate::models::universe::UniverseDefinition;
    use crate::storage::tests::scratch_dir;
    use crate::telegram::tests::RecordingNotifier;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves fixed quotes; unknown symbols fail.
    #[derive(Default)]
    struct FakeProvider {
        quotes: Mutex<HashMap<String, Quote>>,
        calls:  AtomicUsize,
    }

    impl FakeProvider {
        fn with(quotes: &[(&str, f64, Option<f64>)]) -> Self {
            let provider = FakeProvider::default();
            for (symbol, last, prev) in quotes {
                provider.set(symbol, *last, *prev);
            }
            provider
        }

        fn set(&self, symbol: &str, last: f64, prev: Option<f64>) {
            self.quotes
                .lock()
                .unwrap()
                .insert(symbol.to_string(), Quote::new(symbol, last, prev));
        }
    }

    #[async_trait]
    impl QuoteProvider for FakeProvider {
        async fn fetch(&self, symbol: &str) -> Result<Quote, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.quotes
                .lock()
                .unwrap()
                .get(symbol)
                .cloned()
                .ok_or_else(|| AppError::fetch(symbol, "no such symbol"))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()
    }

    fn quotes(entries: &[(&str, f64, Option<f64>)]) -> HashMap<String, Result<Quote, AppError>> {
        entries
            .iter()
            .map(|(s, last, prev)| (s.to_string(), Ok(Quote::new(s, *last, *prev))))
            .collect()
    }

    fn universe(name: &str, members: &[&str], mode: BaselineMode) -> LoadedUniverse {
        LoadedUniverse {
            definition: UniverseDefinition {
                name: name.into(),
                file: "unused.json".into(),
                drop_pct: 10.0,
                baseline_mode: mode,
                cooldown_minutes: 720,
            },
            members: members.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_monitored_items_applies_defaults_and_skips() {
        let config = Config::for_tests(&scratch_dir());
        let mut no_baseline = Position::watch("TSLA", 1.0, None);
        no_baseline.baseline = None;
        let mut sold = Position::owned("META", 300.0, None);
        sold.status = PositionStatus::Other("sold".into());

        let positions = vec![
            Position::owned("AAPL", 180.0, Some(10.0)),
            Position::watch("NVDA", 900.0, Some(12.0)),
            no_baseline,
            sold,
        ];
        let universes = vec![
            universe("AEX", &["ASML.AS"], BaselineMode::PrevClose),
            universe("ODD", &["X"], BaselineMode::Unsupported("vwap".into())),
        ];

        let items = monitored_items(&positions, &universes, &config);
        assert_eq!(items.len(), 3);

        assert_eq!(items[0].category, Category::Owned);
        assert_eq!(items[0].threshold_pct, 5.0);
        assert_eq!(items[0].cooldown_minutes, 1440);
        assert_eq!(items[0].shares, Some(10.0));

        assert_eq!(items[1].reference, ReferenceSource::Fixed(900.0));
        assert_eq!(items[1].threshold_pct, 12.0);
        assert_eq!(items[1].cooldown_minutes, 720);

        assert_eq!(items[2].category, Category::Universe("AEX".into()));
        assert_eq!(items[2].reference, ReferenceSource::PrevClose);
        assert_eq!(items[2].key().as_str(), "universe::AEX::ASML.AS::drop10");
    }

    #[test]
    fn test_universe_with_out_of_range_cooldown_is_skipped() {
        let config = Config::for_tests(&scratch_dir());
        let mut huge = universe("HUGE", &["ASML.AS"], BaselineMode::PrevClose);
        huge.definition.cooldown_minutes = 1_000_000_000_000_000;
        let mut negative = universe("NEG", &["INGA.AS"], BaselineMode::PrevClose);
        negative.definition.cooldown_minutes = -1;
        let universes = vec![huge, negative, universe("AEX", &["ADYEN.AS"], BaselineMode::PrevClose)];

        let items = monitored_items(&[], &universes, &config);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].symbol, "ADYEN.AS");
        assert_eq!(longest_cooldown(&config, &universes), 1440);

        // a scan over the same universes completes without panicking
        let mut state = CooldownState::new();
        let (alerts, report) = plan_alerts(&items, &quotes(&[("ADYEN.AS", 900.0, Some(1000.0))]), &mut state, t0());
        assert_eq!(alerts.len(), 1);
        assert_eq!(report.fired, 1);
    }

    #[tokio::test]
    async fn test_fetch_quotes_dedupes_and_keeps_failures() {
        let provider = FakeProvider::with(&[("AAPL", 189.5, Some(180.0))]);
        let symbols = vec!["AAPL".to_string(), "AAPL".to_string(), "GONE".to_string()];

        let fetched = fetch_quotes(&provider, symbols, 2).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(fetched["AAPL"].is_ok());
        assert!(matches!(fetched["GONE"], Err(AppError::Fetch { .. })));
    }

    #[test]
    fn test_plan_fires_then_cooldown_suppresses() {
        let config = Config::for_tests(&scratch_dir());
        let items = monitored_items(&[Position::owned("AAPL", 180.0, Some(10.0))], &[], &config);
        let quotes = quotes(&[("AAPL", 189.5, Some(188.0))]);
        let mut state = CooldownState::new();

        let (alerts, report) = plan_alerts(&items, &quotes, &mut state, t0());
        assert_eq!(alerts.len(), 1);
        assert_eq!(report.fired, 1);
        assert_eq!(alerts[0].key.as_str(), "AAPL::owned_rise");
        assert!((alerts[0].pct_change - 5.2777).abs() < 1e-3);
        assert_eq!(state.get(&alerts[0].key).unwrap().last_alert_iso, t0());

        // same data, one minute later
        let (alerts, report) = plan_alerts(&items, &quotes, &mut state, t0() + Duration::minutes(1));
        assert!(alerts.is_empty());
        assert_eq!(report.suppressed, 1);

        // owned cooldown is a day
        let (alerts, _) = plan_alerts(&items, &quotes, &mut state, t0() + Duration::minutes(1440));
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn test_plan_below_threshold_does_not_fire() {
        let config = Config::for_tests(&scratch_dir());
        let items = monitored_items(&[Position::owned("AAPL", 180.0, None)], &[], &config);
        let mut state = CooldownState::new();

        let (alerts, report) = plan_alerts(&items, &quotes(&[("AAPL", 188.0, None)]), &mut state, t0());
        assert!(alerts.is_empty());
        assert_eq!(report.evaluated, 1);
        assert!(state.is_empty());
    }

    #[test]
    fn test_plan_isolates_bad_items() {
        let config = Config::for_tests(&scratch_dir());
        let positions = vec![
            Position::watch("ZERO", 0.0, None),
            Position::watch("NVDA", 900.0, None),
            Position::watch("GONE", 50.0, None),
        ];
        let universes = vec![universe("AEX", &["NEWIPO.AS"], BaselineMode::PrevClose)];
        let items = monitored_items(&positions, &universes, &config);

        let mut quotes = quotes(&[("ZERO", 5.0, None), ("NVDA", 805.0, None), ("NEWIPO.AS", 20.0, None)]);
        quotes.insert("GONE".into(), Err(AppError::fetch("GONE", "timeout")));
        let mut state = CooldownState::new();

        let (alerts, report) = plan_alerts(&items, &quotes, &mut state, t0());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].symbol, "NVDA");
        assert_eq!(report, ScanReport { items: 4, evaluated: 1, fired: 1, suppressed: 0, skipped: 3, delivered: 0 });
    }

    #[test]
    fn test_plan_universe_uses_prev_close() {
        let config = Config::for_tests(&scratch_dir());
        let items = monitored_items(&[], &[universe("AEX", &["ASML.AS"], BaselineMode::PrevClose)], &config);
        let mut state = CooldownState::new();

        let (alerts, _) = plan_alerts(&items, &quotes(&[("ASML.AS", 540.0, Some(600.0))]), &mut state, t0());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].reference_price, 600.0);
        assert_eq!(alerts[0].category, Category::Universe("AEX".into()));
    }

    #[test]
    fn test_longest_cooldown_includes_universes() {
        let config = Config::for_tests(&scratch_dir());
        let mut long = universe("SLOW", &[], BaselineMode::PrevClose);
        long.definition.cooldown_minutes = 10_080;
        assert_eq!(longest_cooldown(&config, &[]), 1440);
        assert_eq!(longest_cooldown(&config, &[long]), 10_080);
    }

    #[tokio::test]
    async fn test_run_scan_is_idempotent() {
        let config = Config::for_tests(&scratch_dir());
        let mut registry = PositionRegistry::load(&config.holdings_path).unwrap();
        registry.upsert_watch("NVDA", 900.0, Some(10.0));
        registry.save().unwrap();

        let provider = FakeProvider::with(&[("NVDA", 805.0, Some(810.0))]);
        let notifier = RecordingNotifier::default();

        let first = run_scan(&config, &provider, &notifier).await.unwrap();
        let second = run_scan(&config, &provider, &notifier).await.unwrap();

        assert_eq!(first.delivered, 1);
        assert_eq!(second.fired, 0);
        assert_eq!(second.suppressed, 1);

        let sent = notifier.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, config.telegram_chat_id);
        assert!(sent[0].1.contains("<b>NVDA</b> (watch) is -10.56%"));

        let state = CooldownState::load(&config.state_path).unwrap();
        assert!(state.get(&AlertKey::watch("NVDA")).is_some());
    }

    #[tokio::test]
    async fn test_buy_then_sell_stops_alerts() {
        let config = Config::for_tests(&scratch_dir());
        let provider = FakeProvider::with(&[("AAPL", 189.5, Some(188.0))]);
        let notifier = RecordingNotifier::default();

        let mut registry = PositionRegistry::load(&config.holdings_path).unwrap();
        execute(&mut registry, Command::parse("buy AAPL 180.00 10").unwrap()).unwrap();

        let report = run_scan(&config, &provider, &notifier).await.unwrap();
        assert_eq!(report.fired, 1);
        assert!(notifier.messages()[0].1.contains("Shares: 10"));

        execute(&mut registry, Command::parse("sell AAPL").unwrap()).unwrap();
        provider.set("AAPL", 250.0, Some(240.0));

        let report = run_scan(&config, &provider, &notifier).await.unwrap();
        assert_eq!(report.items, 0);
        assert_eq!(notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_stays_recorded() {
        let config = Config::for_tests(&scratch_dir());
        let mut registry = PositionRegistry::load(&config.holdings_path).unwrap();
        registry.upsert_owned("AAPL", 180.0, None);
        registry.save().unwrap();

        let provider = FakeProvider::with(&[("AAPL", 200.0, None)]);
        let notifier = RecordingNotifier::failing_for(&config.telegram_chat_id);

        let report = run_scan(&config, &provider, &notifier).await.unwrap();
        assert_eq!(report.fired, 1);
        assert_eq!(report.delivered, 0);

        let state = CooldownState::load(&config.state_path).unwrap();
        assert!(state.get(&AlertKey::owned("AAPL")).is_some());
    }

    #[tokio::test]
    async fn test_run_scan_reads_universe_files() {
        let config = Config::for_tests(&scratch_dir());
        std::fs::write(config.config_path.parent().unwrap().join("aex.json"), r#"["ASML.AS", "INGA.AS"]"#).unwrap();
        std::fs::write(
            &config.config_path,
            r#"{"universes":[{"name":"AEX","file":"aex.json","drop_pct":8}]}"#,
        )
        .unwrap();

        let provider = FakeProvider::with(&[("ASML.AS", 550.0, Some(600.0)), ("INGA.AS", 14.9, Some(15.0))]);
        let notifier = RecordingNotifier::default();

        let report = run_scan(&config, &provider, &notifier).await.unwrap();
        assert_eq!(report.items, 2);
        assert_eq!(report.fired, 1);

        let state = CooldownState::load(&config.state_path).unwrap();
        assert!(state.get(&AlertKey::universe("AEX", "ASML.AS", 8.0)).is_some());
    }
}
