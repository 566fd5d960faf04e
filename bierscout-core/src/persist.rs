//! External storage boundary. The scraper itself never depends on a sink
//! succeeding; persistence failures degrade to a warning upstream.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::scrape::records::MatchedResult;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error writing run output: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize run output: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The stored shape of one match. Mirrors [`MatchedResult`] field for field;
/// kept separate so the wire format stays stable if the in-memory type
/// grows fields that have no business being persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedMatch {
    pub product_name: String,
    pub store: String,
    pub price_text: String,
    pub price: Option<f64>,
    pub target_product: String,
    pub link: String,
    pub captured_at: DateTime<Utc>,
    pub available: bool,
    pub image_url: Option<String>,
    pub promo: Option<String>,
}

impl From<&MatchedResult> for PersistedMatch {
    fn from(result: &MatchedResult) -> Self {
        Self {
            product_name: result.product_name.clone(),
            store: result.store.clone(),
            price_text: result.price_text.clone(),
            price: result.price,
            target_product: result.target_product.clone(),
            link: result.link.clone(),
            captured_at: result.captured_at,
            available: result.available,
            image_url: result.image_url.clone(),
            promo: result.promo.clone(),
        }
    }
}

/// One run's stored document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDocument {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub total_matches: usize,
    pub matches: Vec<PersistedMatch>,
}

impl RunDocument {
    pub fn new(run_id: &str, results: &[MatchedResult]) -> Self {
        Self {
            run_id: run_id.to_string(),
            generated_at: Utc::now(),
            total_matches: results.len(),
            matches: results.iter().map(PersistedMatch::from).collect(),
        }
    }
}

/// Where a finished run's matches go.
#[async_trait]
pub trait RunSink {
    async fn store_run(&self, document: &RunDocument) -> Result<PathBuf, SinkError>;
}

/// Writes one pretty-printed JSON document per run, keyed by run id.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    directory: PathBuf,
}

impl JsonFileSink {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl RunSink for JsonFileSink {
    async fn store_run(&self, document: &RunDocument) -> Result<PathBuf, SinkError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.directory.join(format!("{}.json", document.run_id));
        let payload = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&path, payload).await?;
        info!(path = %path.display(), matches = document.total_matches, "run output persisted");
        Ok(path)
    }
}
