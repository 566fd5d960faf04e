use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A raw listing extracted from a store's page, prior to matching.
///
/// Created once per store per run during the single catalog load and cached
/// for the remainder of the run. A record without any raw price text is
/// dropped at extraction time; a record whose price text failed numeric
/// parsing is kept with `price: None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogRecord {
    pub name: String,
    pub price_text: String,
    pub price: Option<f64>,
    pub link: String,
    pub image_url: Option<String>,
    /// Free-text brand/quantity/availability blob used for matching.
    pub metadata: String,
    pub available: bool,
    pub promo: Option<String>,
}

impl CatalogRecord {
    /// Combined haystack the matching rules run against.
    pub fn match_text(&self) -> String {
        let mut text = self.name.clone();
        if !self.metadata.is_empty() {
            text.push(' ');
            text.push_str(&self.metadata);
        }
        text
    }
}

/// A catalog record confirmed to satisfy a target product's filter rules.
/// Immutable once created; the unit emitted downstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchedResult {
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

impl MatchedResult {
    pub fn from_record(record: &CatalogRecord, store: &str, target_product: &str) -> Self {
        Self {
            product_name: record.name.clone(),
            store: store.to_string(),
            price_text: record.price_text.clone(),
            price: record.price,
            target_product: target_product.to_string(),
            link: record.link.clone(),
            captured_at: Utc::now(),
            available: record.available,
            image_url: record.image_url.clone(),
            promo: record.promo.clone(),
        }
    }
}

fn price_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid regex"))
}

/// Parses the first numeric token out of raw price text.
///
/// Currency symbols and whitespace are stripped and a decimal comma is
/// normalized to a dot before extraction. Text without a numeric token
/// yields `None`; the caller keeps the record with raw text only.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '€' | '$' | '£') && !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    let token = price_token_regex().find(&cleaned)?;
    token.as_str().parse::<f64>().ok()
}

/// Resolves a promotional tag from the extraction payload.
///
/// Order: dedicated badge text, then a JSON-decoded structured attribute,
/// then a synthesized before/after comparison when two differing price
/// nodes exist.
pub fn resolve_promo(
    badge: Option<&str>,
    structured: Option<&str>,
    price_texts: &[String],
) -> Option<String> {
    if let Some(badge) = badge {
        let badge = badge.trim();
        if !badge.is_empty() {
            return Some(badge.to_string());
        }
    }
    if let Some(raw) = structured {
        if let Some(label) = decode_promo_attribute(raw) {
            return Some(label);
        }
    }
    if price_texts.len() >= 2 {
        let old = price_texts[0].trim();
        let new = price_texts[1].trim();
        if !old.is_empty() && !new.is_empty() && parse_price(old) != parse_price(new) {
            return Some(format!("Promo: {old} → {new}"));
        }
    }
    None
}

fn decode_promo_attribute(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
    let label = match &value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => map
            .get("label")
            .or_else(|| map.get("text"))
            .or_else(|| map.get("description"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())?,
        _ => return None,
    };
    let label = label.trim().to_string();
    if label.is_empty() {
        None
    } else {
        Some(label)
    }
}

/// Availability markers seen across the store fronts. Anything else counts
/// as in stock.
pub fn availability_from_text(text: &str) -> bool {
    const OUT_OF_STOCK: [&str; 5] = [
        "niet leverbaar",
        "uitverkocht",
        "niet beschikbaar",
        "tijdelijk uitverkocht",
        "out of stock",
    ];
    let lowered = text.to_lowercase();
    !OUT_OF_STOCK.iter().any(|marker| lowered.contains(marker))
}
