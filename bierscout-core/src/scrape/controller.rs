use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{BrowserConfig, Store, TargetProduct};

use super::adapters::{adapter_for, LoadContext, SiteAdapter};
use super::aggregate::MatchAggregator;
use super::error::{categorize, ErrorCategory, ScrapeResult};
use super::humanize::{DelayPolicy, Humanizer};
use super::matching::MatchEngine;
use super::metrics::SessionMetrics;
use super::page::LiveStorePage;
use super::records::{CatalogRecord, MatchedResult};
use super::session::{LaunchOverrides, SessionLauncher, StoreSession};

/// Lifecycle of one store's browsing session. Purely observational; the
/// transitions are logged so a run's reset history can be reconstructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active,
    ResetPending,
    Closed,
}

fn transition(store: &str, state: &mut SessionState, next: SessionState) {
    debug!(store, from = ?*state, to = ?next, "session state transition");
    *state = next;
}

/// Per-store run summary returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub store: String,
    pub products_processed: usize,
    pub matches_found: usize,
    pub catalog_records: usize,
    pub context_resets: u64,
    pub errors: usize,
    pub duration_ms: u64,
    pub metrics: SessionMetrics,
}

#[derive(Debug, Default)]
struct RunStats {
    products_processed: usize,
    matches_found: usize,
    catalog_records: usize,
    errors: usize,
}

/// Matches one target product against the cached catalog. Overrides for the
/// store are resolved here, so every product sees its store-specific rules.
pub fn collect_matches(
    engine: &MatchEngine,
    catalog: &[CatalogRecord],
    store_name: &str,
    product: &TargetProduct,
) -> Vec<MatchedResult> {
    let resolved = product.resolve_for(store_name);
    catalog
        .iter()
        .filter(|record| engine.matches(record, &resolved))
        .map(|record| MatchedResult::from_record(record, store_name, &product.name))
        .collect()
}

/// Drives one store end to end: session launch, single catalog load,
/// per-product matching with incremental emission, context resets and
/// inter-product pacing, and unconditional browser teardown.
pub struct StoreRunner {
    launcher: SessionLauncher,
    delays: DelayPolicy,
    humanizer: Humanizer,
}

impl StoreRunner {
    pub fn new(config: BrowserConfig) -> ScrapeResult<Self> {
        let delays = DelayPolicy::new(config.delays.clone());
        let humanizer = Humanizer::new(config.delays.clone(), config.consent.clone());
        let launcher = SessionLauncher::new(config)?;
        Ok(Self {
            launcher,
            delays,
            humanizer,
        })
    }

    pub fn config(&self) -> &BrowserConfig {
        self.launcher.config()
    }

    /// Runs one store. Launch failure is fatal for the store and surfaces
    /// as `Err`; later per-product problems are absorbed into the report's
    /// error count. The browser is closed on every exit path.
    pub async fn run_store(
        &self,
        store: &Store,
        products: &[TargetProduct],
        aggregator: &mut MatchAggregator,
        overrides: LaunchOverrides,
    ) -> ScrapeResult<RunReport> {
        let started = Instant::now();
        let adapter = adapter_for(&store.name)?;
        info!(store = %store.name, defensive = adapter.defensive(), products = products.len(), "starting store run");

        let session = self.launcher.launch_with_overrides(overrides).await?;
        let outcome = self
            .run_inner(&session, adapter.as_ref(), store, products, aggregator)
            .await;
        let metrics = session.metrics();
        if let Err(err) = session.shutdown().await {
            warn!(store = %store.name, error = %err, "browser shutdown reported an error");
        }

        let stats = outcome?;
        let report = RunReport {
            store: store.name.clone(),
            products_processed: stats.products_processed,
            matches_found: stats.matches_found,
            catalog_records: stats.catalog_records,
            context_resets: metrics.context_resets,
            errors: stats.errors,
            duration_ms: started.elapsed().as_millis() as u64,
            metrics,
        };
        info!(
            store = %store.name,
            matches = report.matches_found,
            records = report.catalog_records,
            resets = report.context_resets,
            match_rate = format!("{:.1}%", report.metrics.match_rate()),
            duration_ms = report.duration_ms,
            "store run finished"
        );
        Ok(report)
    }

    async fn run_inner(
        &self,
        session: &StoreSession,
        adapter: &dyn SiteAdapter,
        store: &Store,
        products: &[TargetProduct],
        aggregator: &mut MatchAggregator,
    ) -> ScrapeResult<RunStats> {
        let config = session.config();
        let nav_timeout = Duration::from_secs(config.chromium.navigation_timeout_seconds);
        let metrics = session.metrics_handle();
        let engine = MatchEngine::new(config.behavior.exclude_alcohol_free);

        let mut state = SessionState::Uninitialized;
        let mut context = session.new_context().await?;
        transition(&store.name, &mut state, SessionState::Active);

        let mut stats = RunStats::default();
        let mut strikes: u32 = 0;

        // The catalog is loaded at most once per run. A suspected block gets
        // one reset-and-retry with elevated backoff before giving up.
        let mut catalog: Option<Vec<CatalogRecord>> = None;
        for attempt in 0..2 {
            let ctx = LoadContext {
                store,
                page_cap: config.behavior.page_cap,
                post_load_wait: Duration::from_millis(config.chromium.post_load_wait_ms),
                selector_timeout: nav_timeout,
                humanizer: &self.humanizer,
            };
            let mut page = LiveStorePage::new(context.page().clone(), nav_timeout);
            match adapter.load_catalog(&mut page, &ctx, products).await {
                Ok(records) => {
                    metrics.lock().unwrap().record_catalog_load(records.len() as u64);
                    catalog = Some(records);
                    break;
                }
                Err(err) if categorize(&err) == ErrorCategory::BotDetection && attempt == 0 => {
                    warn!(store = %store.name, error = %err, "block suspected during catalog load, resetting context");
                    metrics.lock().unwrap().record_bot_detection();
                    stats.errors += 1;
                    strikes += 1;
                    transition(&store.name, &mut state, SessionState::ResetPending);
                    context = session.reset_context(context).await?;
                    transition(&store.name, &mut state, SessionState::Active);
                    self.delays.between_products(true, strikes).await;
                }
                Err(err) => {
                    match categorize(&err) {
                        ErrorCategory::BotDetection => {
                            metrics.lock().unwrap().record_bot_detection()
                        }
                        ErrorCategory::SoftTimeout => {
                            metrics.lock().unwrap().record_soft_timeout()
                        }
                        _ => {}
                    }
                    return Err(err);
                }
            }
        }
        let catalog = catalog.unwrap_or_default();
        stats.catalog_records = catalog.len();
        info!(store = %store.name, records = catalog.len(), "catalog cached for matching");

        let total = products.len();
        for (index, product) in products.iter().enumerate() {
            let results = collect_matches(&engine, &catalog, &store.name, product);
            let found = results.len();
            let accepted = aggregator.push_batch(results);
            metrics.lock().unwrap().record_product(accepted as u64);
            stats.products_processed += 1;
            stats.matches_found += accepted;
            debug!(store = %store.name, product = %product.name, found, accepted, "product matched against cached catalog");

            if index + 1 == total {
                break;
            }
            if adapter.defensive() {
                transition(&store.name, &mut state, SessionState::ResetPending);
                match session.reset_context(context).await {
                    Ok(fresh) => context = fresh,
                    Err(err) => {
                        warn!(store = %store.name, error = %err, "context reset failed, opening a fresh one");
                        stats.errors += 1;
                        context = session.new_context().await?;
                    }
                }
                transition(&store.name, &mut state, SessionState::Active);
            }
            self.delays
                .between_products(adapter.defensive(), strikes)
                .await;
        }

        drop(context);
        transition(&store.name, &mut state, SessionState::Closed);
        Ok(stats)
    }
}
