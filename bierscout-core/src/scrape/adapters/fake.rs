use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::scrape::error::ScrapeResult;
use crate::scrape::page::StorePage;

/// Scripted page for adapter tests. Every `evaluate_json` call pops the
/// next listing payload; an exhausted script returns an empty listing.
#[derive(Default)]
pub struct FakePage {
    pub visited: Vec<String>,
    pub clicked: Vec<String>,
    pub scroll_count: usize,
    pub listings: VecDeque<Value>,
    pub body: String,
    pub selector_present: bool,
    /// Remaining successful clicks per selector. Selectors not listed never
    /// match.
    pub clickable: HashMap<String, u32>,
}

impl FakePage {
    pub fn with_listings(listings: Vec<Value>) -> Self {
        Self {
            listings: listings.into(),
            selector_present: true,
            ..Self::default()
        }
    }
}

#[async_trait(?Send)]
impl StorePage for FakePage {
    async fn goto(&mut self, url: &str) -> ScrapeResult<()> {
        self.visited.push(url.to_string());
        Ok(())
    }

    async fn wait_for_selector(&mut self, _selector: &str, _timeout: Duration) -> ScrapeResult<bool> {
        Ok(self.selector_present)
    }

    async fn settle(&mut self, _wait: Duration) -> ScrapeResult<()> {
        Ok(())
    }

    async fn scroll_by(&mut self, _delta_y: f64) -> ScrapeResult<()> {
        self.scroll_count += 1;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> ScrapeResult<bool> {
        self.clicked.push(selector.to_string());
        match self.clickable.get_mut(selector) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn evaluate_json(&mut self, _script: &str) -> ScrapeResult<Value> {
        Ok(self.listings.pop_front().unwrap_or_else(|| json!([])))
    }

    async fn body_text(&mut self) -> ScrapeResult<String> {
        Ok(self.body.clone())
    }
}

/// One listing row in the shape the in-page script produces.
pub fn row(name: &str, price_text: &str, link: &str) -> Value {
    json!({
        "name": name,
        "price_text": price_text,
        "link": link,
        "image": "",
        "meta": "",
        "promo_badge": "",
        "promo_data": "",
        "price_texts": [],
    })
}
