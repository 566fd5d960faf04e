//! Core library for the bierscout price comparison scraper.
//!
//! Drives headless Chromium sessions against a set of Belgian and Dutch
//! beverage storefronts, extracts their beer listings once per run, filters
//! them through per-product keyword rules and aggregates the matches into
//! grouped, price-sorted results with incremental delivery.

pub mod config;
pub mod error;
pub mod persist;
pub mod scrape;

pub use config::{CatalogConfig, ConfigBundle, ResolvedProduct, Store, TargetProduct};
pub use error::{ConfigError, Result};
pub use scrape::{
    BatchEvent, CatalogRecord, MatchAggregator, MatchEngine, MatchedResult, RunReport,
    ScrapeError, StoreRunner,
};
