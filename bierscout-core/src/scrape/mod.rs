pub mod adapters;
pub mod aggregate;
pub mod controller;
pub mod error;
pub mod humanize;
pub mod matching;
pub mod metrics;
pub mod page;
pub mod profile;
pub mod records;
pub mod session;
pub mod stealth;

pub use adapters::{adapter_for, SiteAdapter};
pub use aggregate::{BatchCallback, BatchEvent, MatchAggregator, MatchGroup};
pub use controller::{collect_matches, RunReport, SessionState, StoreRunner};
pub use error::{categorize, ErrorCategory, ScrapeError, ScrapeResult};
pub use matching::MatchEngine;
pub use metrics::SessionMetrics;
pub use records::{parse_price, CatalogRecord, MatchedResult};
pub use session::{LaunchOverrides, SessionLauncher, StoreSession};
