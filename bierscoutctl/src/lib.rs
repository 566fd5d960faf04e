use std::fmt;
use std::path::PathBuf;

use bierscout_core::config::CatalogConfig;
use bierscout_core::persist::{JsonFileSink, RunDocument, RunSink};
use bierscout_core::scrape::{adapter_for, LaunchOverrides, MatchGroup, RunReport};
use bierscout_core::{ConfigBundle, MatchAggregator, ScrapeError, Store, StoreRunner};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] bierscout_core::ConfigError),
    #[error("scrape error: {0}")]
    Scrape(#[from] ScrapeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Beverage price comparison scraper", long_about = None)]
pub struct Cli {
    /// Directory holding browser.toml and catalog.toml
    #[arg(long, default_value = "configs")]
    pub config_dir: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a comparison pass across the configured stores
    Run(RunArgs),
    /// List configured stores and their adapter status
    Stores,
    /// List configured target products and their filter rules
    Products,
    /// Check the configuration files for semantic problems
    ValidateConfig,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Restrict the run to these store names (repeatable)
    #[arg(long = "store")]
    pub stores: Vec<String>,
    /// Identifier for the persisted run document; random when omitted
    #[arg(long)]
    pub run_id: Option<String>,
    /// Directory where run documents are written
    #[arg(long, default_value = "runs")]
    pub out_dir: PathBuf,
    /// Launch the browser with a visible window
    #[arg(long, default_value_t = false)]
    pub headed: bool,
    /// Match and report without writing the run document
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

pub async fn run(cli: Cli) -> Result<()> {
    let bundle = ConfigBundle::from_directory(&cli.config_dir)?;

    match &cli.command {
        Commands::Run(args) => {
            let summary = run_comparison(&bundle, args, cli.format).await?;
            render(&summary, cli.format)?;
        }
        Commands::Stores => {
            let list = store_list(&bundle.catalog);
            render(&list, cli.format)?;
        }
        Commands::Products => {
            let list = product_list(&bundle.catalog);
            render(&list, cli.format)?;
        }
        Commands::ValidateConfig => {
            let report = validate(&bundle);
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::MissingResource(
                    "one or more configuration checks failed".to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Runs the selected stores strictly sequentially, printing live match
/// batches in text mode, and persists the merged results unless dry-run.
async fn run_comparison(
    bundle: &ConfigBundle,
    args: &RunArgs,
    format: OutputFormat,
) -> Result<RunSummary> {
    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let stores = select_stores(&bundle.catalog, &args.stores)?;
    let runner = StoreRunner::new(bundle.browser.clone())?;

    let mut aggregator = MatchAggregator::new();
    let mut printer = None;
    if matches!(format, OutputFormat::Text) {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<bierscout_core::BatchEvent>();
        aggregator = aggregator.with_events(tx);
        printer = Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for result in &event.new_matches {
                    println!(
                        "  + [{store}] {name} — {price} ({target}, total {total})",
                        store = result.store,
                        name = result.product_name,
                        price = result.price_text,
                        target = event.target_product,
                        total = event.total_matches,
                    );
                }
            }
        }));
    }

    let overrides = LaunchOverrides {
        headless: if args.headed { Some(false) } else { None },
    };

    let mut reports = Vec::new();
    let mut failed_stores = Vec::new();
    for store in &stores {
        match runner
            .run_store(
                store,
                &bundle.catalog.products,
                &mut aggregator,
                overrides.clone(),
            )
            .await
        {
            Ok(report) => reports.push(report),
            Err(err) => {
                error!(store = %store.name, error = %err, "store run failed, continuing with next store");
                failed_stores.push(store.name.clone());
            }
        }
    }

    let groups = aggregator.grouped();
    let results = aggregator.into_final();
    if let Some(task) = printer {
        let _ = task.await;
    }

    let mut output_path = None;
    if args.dry_run {
        warn!(run_id = %run_id, "dry run, skipping persistence");
    } else {
        let sink = JsonFileSink::new(&args.out_dir);
        let document = RunDocument::new(&run_id, &results);
        match sink.store_run(&document).await {
            Ok(path) => output_path = Some(path.display().to_string()),
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "failed to persist run output, results only reported");
            }
        }
    }

    Ok(RunSummary {
        run_id,
        stores_run: reports.len(),
        failed_stores,
        total_matches: results.len(),
        groups,
        reports,
        output_path,
    })
}

fn select_stores(catalog: &CatalogConfig, filter: &[String]) -> Result<Vec<Store>> {
    if filter.is_empty() {
        return Ok(catalog
            .stores
            .iter()
            .filter(|store| store.enabled)
            .cloned()
            .collect());
    }
    let mut selected = Vec::new();
    for wanted in filter {
        let needle = wanted.to_lowercase();
        let found = catalog
            .stores
            .iter()
            .find(|store| store.name.to_lowercase() == needle)
            .ok_or_else(|| {
                AppError::MissingResource(format!("store '{wanted}' is not configured"))
            })?;
        selected.push(found.clone());
    }
    Ok(selected)
}

fn store_list(catalog: &CatalogConfig) -> StoreList {
    let rows = catalog
        .stores
        .iter()
        .map(|store| StoreEntry {
            name: store.name.clone(),
            base_url: store.base_url.clone(),
            enabled: store.enabled,
            adapter: adapter_for(&store.name).is_ok(),
        })
        .collect();
    StoreList { rows }
}

fn product_list(catalog: &CatalogConfig) -> ProductList {
    let rows = catalog
        .products
        .iter()
        .map(|product| ProductEntry {
            name: product.name.clone(),
            search_terms: product.search_terms.clone(),
            required_keywords: product.required_keywords.clone(),
            must_contain: product.must_contain.clone(),
            overridden_stores: product.store_overrides.keys().cloned().collect(),
        })
        .collect();
    ProductList { rows }
}

fn validate(bundle: &ConfigBundle) -> Vec<CheckEntry> {
    let mut entries = Vec::new();

    if bundle.browser.user_agents.pool.is_empty() {
        entries.push(CheckEntry::error("user_agents", "pool is empty"));
    } else {
        entries.push(CheckEntry::ok(
            "user_agents",
            format!("{} agents in pool", bundle.browser.user_agents.pool.len()),
        ));
    }

    if bundle.browser.delays.min_ms > bundle.browser.delays.max_ms {
        entries.push(CheckEntry::error("delays", "min_ms exceeds max_ms"));
    } else {
        entries.push(CheckEntry::ok("delays", "bounds are consistent"));
    }

    if bundle.catalog.stores.is_empty() {
        entries.push(CheckEntry::error("stores", "no stores configured"));
    }
    for store in &bundle.catalog.stores {
        match adapter_for(&store.name) {
            Ok(_) => entries.push(CheckEntry::ok(
                format!("store '{}'", store.name),
                store.base_url.clone(),
            )),
            Err(_) => entries.push(CheckEntry::error(
                format!("store '{}'", store.name),
                "no adapter for this store name",
            )),
        }
    }

    if bundle.catalog.products.is_empty() {
        entries.push(CheckEntry::error("products", "no target products configured"));
    }
    for product in &bundle.catalog.products {
        if product.search_terms.is_empty() {
            entries.push(CheckEntry::error(
                format!("product '{}'", product.name),
                "no search terms",
            ));
        } else if product.required_keywords.is_empty() && product.must_contain.is_empty() {
            entries.push(CheckEntry::warn(
                format!("product '{}'", product.name),
                "no keyword rules, every beverage record will match",
            ));
        } else {
            entries.push(CheckEntry::ok(
                format!("product '{}'", product.name),
                format!("{} search terms", product.search_terms.len()),
            ));
        }
    }

    entries
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub stores_run: usize,
    pub failed_stores: Vec<String>,
    pub total_matches: usize,
    pub groups: Vec<MatchGroup>,
    pub reports: Vec<RunReport>,
    pub output_path: Option<String>,
}

impl DisplayFallback for RunSummary {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Run {} finished: {} matches across {} stores",
            self.run_id, self.total_matches, self.stores_run
        )];
        if !self.failed_stores.is_empty() {
            lines.push(format!("Failed stores: {}", self.failed_stores.join(", ")));
        }
        for group in &self.groups {
            lines.push(format!("{}:", group.key));
            for result in &group.results {
                let promo = result
                    .promo
                    .as_deref()
                    .map(|p| format!(" [{p}]"))
                    .unwrap_or_default();
                let stock = if result.available { "" } else { " (out of stock)" };
                lines.push(format!(
                    "  {store:<14} {price:>12}  {name}{promo}{stock}",
                    store = result.store,
                    price = result.price_text,
                    name = result.product_name,
                ));
            }
        }
        for report in &self.reports {
            lines.push(format!(
                "store {}: {} records, {} matches, {} resets, {} errors, {} ms",
                report.store,
                report.catalog_records,
                report.matches_found,
                report.context_resets,
                report.errors,
                report.duration_ms
            ));
        }
        if let Some(path) = &self.output_path {
            lines.push(format!("Output written to {path}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct StoreList {
    pub rows: Vec<StoreEntry>,
}

#[derive(Debug, Serialize)]
pub struct StoreEntry {
    pub name: String,
    pub base_url: String,
    pub enabled: bool,
    pub adapter: bool,
}

impl DisplayFallback for StoreList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No stores configured".to_string();
        }
        self.rows
            .iter()
            .map(|entry| {
                format!(
                    "{name} | {url} | enabled={enabled} | adapter={adapter}",
                    name = entry.name,
                    url = entry.base_url,
                    enabled = entry.enabled,
                    adapter = if entry.adapter { "yes" } else { "MISSING" },
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ProductList {
    pub rows: Vec<ProductEntry>,
}

#[derive(Debug, Serialize)]
pub struct ProductEntry {
    pub name: String,
    pub search_terms: Vec<String>,
    pub required_keywords: Vec<String>,
    pub must_contain: Vec<String>,
    pub overridden_stores: Vec<String>,
}

impl DisplayFallback for ProductList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No products configured".to_string();
        }
        self.rows
            .iter()
            .map(|entry| {
                let overrides = if entry.overridden_stores.is_empty() {
                    String::new()
                } else {
                    format!(" | overrides: {}", entry.overridden_stores.join(", "))
                };
                format!(
                    "{name} | search: {search} | required: {required} | must: {must}{overrides}",
                    name = entry.name,
                    search = entry.search_terms.join(", "),
                    required = entry.required_keywords.join(", "),
                    must = entry.must_contain.join(", "),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct CheckEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl CheckEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for Vec<CheckEntry> {
    fn display(&self) -> String {
        self.iter()
            .map(|entry| {
                format!(
                    "[{status}] {name}: {detail}",
                    status = entry.status,
                    name = entry.name,
                    detail = entry.detail
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn fixture_bundle() -> ConfigBundle {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs");
        ConfigBundle::from_directory(dir).expect("fixture configs should parse")
    }

    #[test]
    fn select_stores_defaults_to_enabled() {
        let bundle = fixture_bundle();
        let stores = select_stores(&bundle.catalog, &[]).unwrap();
        assert_eq!(stores.len(), 5);
    }

    #[test]
    fn select_stores_filters_case_insensitively() {
        let bundle = fixture_bundle();
        let stores = select_stores(&bundle.catalog, &["Colruyt".to_string()]).unwrap();
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].name, "colruyt");
    }

    #[test]
    fn select_stores_rejects_unknown_name() {
        let bundle = fixture_bundle();
        let err = select_stores(&bundle.catalog, &["lidl".to_string()]).unwrap_err();
        assert!(matches!(err, AppError::MissingResource(_)));
    }

    #[test]
    fn fixture_configs_validate_cleanly() {
        let bundle = fixture_bundle();
        let report = validate(&bundle);
        assert!(!report
            .iter()
            .any(|entry| matches!(entry.status, CheckStatus::Error)));
    }

    #[test]
    fn every_fixture_store_has_an_adapter() {
        let bundle = fixture_bundle();
        let list = store_list(&bundle.catalog);
        assert!(list.rows.iter().all(|entry| entry.adapter));
    }

    #[test]
    fn product_listing_carries_filter_rules() {
        let bundle = fixture_bundle();
        let list = product_list(&bundle.catalog);
        assert!(!list.rows.is_empty());
        assert!(list
            .rows
            .iter()
            .any(|entry| !entry.required_keywords.is_empty()));
        let display = list.display();
        assert!(display.contains("search:"));
    }
}
