use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub pages_opened: u64,
    pub catalogs_loaded: u64,
    pub records_extracted: u64,
    pub products_processed: u64,
    pub matches_found: u64,
    pub context_resets: u64,
    pub bot_detections: u64,
    pub soft_timeouts: u64,
}

impl SessionMetrics {
    pub fn record_page_open(&mut self) {
        self.pages_opened = self.pages_opened.saturating_add(1);
    }

    pub fn record_catalog_load(&mut self, records: u64) {
        self.catalogs_loaded = self.catalogs_loaded.saturating_add(1);
        self.records_extracted = self.records_extracted.saturating_add(records);
    }

    pub fn record_product(&mut self, matches: u64) {
        self.products_processed = self.products_processed.saturating_add(1);
        self.matches_found = self.matches_found.saturating_add(matches);
    }

    pub fn record_context_reset(&mut self) {
        self.context_resets = self.context_resets.saturating_add(1);
    }

    pub fn record_bot_detection(&mut self) {
        self.bot_detections = self.bot_detections.saturating_add(1);
    }

    pub fn record_soft_timeout(&mut self) {
        self.soft_timeouts = self.soft_timeouts.saturating_add(1);
    }

    pub fn match_rate(&self) -> f64 {
        if self.records_extracted == 0 {
            0.0
        } else {
            (self.matches_found as f64 / self.records_extracted as f64) * 100.0
        }
    }
}
