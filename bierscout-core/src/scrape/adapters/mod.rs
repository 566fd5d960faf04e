mod albert_heijn;
mod carrefour;
mod colruyt;
mod delhaize;
mod drankgigant;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::{Store, TargetProduct};

use super::error::{ScrapeError, ScrapeResult};
use super::humanize::Humanizer;
use super::page::StorePage;
use super::records::{availability_from_text, parse_price, resolve_promo, CatalogRecord};

pub use albert_heijn::AlbertHeijn;
pub use carrefour::Carrefour;
pub use colruyt::Colruyt;
pub use delhaize::Delhaize;
pub use drankgigant::Drankgigant;

/// Shared knobs every adapter receives for one catalog load.
pub struct LoadContext<'a> {
    pub store: &'a Store,
    pub page_cap: u32,
    pub post_load_wait: Duration,
    pub selector_timeout: Duration,
    pub humanizer: &'a Humanizer,
}

/// Per-store catalog loading. One implementation per storefront; shared
/// default behavior lives in this module's helpers, which adapters delegate
/// to instead of inheriting from a base.
#[async_trait(?Send)]
pub trait SiteAdapter {
    fn store(&self) -> &'static str;

    /// Stores with aggressive bot defenses get proactive context resets and
    /// the elevated inter-product backoff.
    fn defensive(&self) -> bool {
        false
    }

    /// Produces the store's catalog records in a single pass. Memoization is
    /// the caller's concern; this is invoked at most once per run.
    async fn load_catalog(
        &self,
        page: &mut dyn StorePage,
        ctx: &LoadContext<'_>,
        products: &[TargetProduct],
    ) -> ScrapeResult<Vec<CatalogRecord>>;
}

impl std::fmt::Debug for dyn SiteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteAdapter")
            .field("store", &self.store())
            .finish()
    }
}

/// Maps a store's declared name to its adapter. Case-insensitive, with the
/// aliases seen in real configs. Pure lookup, no state.
pub fn adapter_for(store_name: &str) -> ScrapeResult<Box<dyn SiteAdapter>> {
    match store_name.trim().to_lowercase().as_str() {
        "colruyt" => Ok(Box::new(Colruyt)),
        "delhaize" | "ad delhaize" | "proxy delhaize" => Ok(Box::new(Delhaize)),
        "albert heijn" | "albertheijn" | "ah" => Ok(Box::new(AlbertHeijn)),
        "carrefour" | "carrefour drive" | "carrefour hyper" => Ok(Box::new(Carrefour)),
        "drankgigant" | "de drankgigant" => Ok(Box::new(Drankgigant)),
        other => Err(ScrapeError::UnsupportedStore(other.to_string())),
    }
}

/// Ordered selector candidates per record field. The first selector that
/// yields non-empty text wins; the chain absorbs markup drift without code
/// changes.
pub struct FieldSelectors {
    pub item: &'static [&'static str],
    pub name: &'static [&'static str],
    pub price: &'static [&'static str],
    pub link: &'static [&'static str],
    pub image: &'static [&'static str],
    pub meta: &'static [&'static str],
    pub promo_badge: &'static [&'static str],
    /// (selector, attribute) holding JSON-encoded promotion data.
    pub promo_attr: Option<(&'static str, &'static str)>,
    /// Before/after price nodes for synthesized promo comparison.
    pub price_pair: &'static [&'static str],
}

/// Row shape produced by the listing script.
#[derive(Debug, Clone, Deserialize)]
pub struct RawListing {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price_text: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub meta: String,
    #[serde(default)]
    pub promo_badge: String,
    #[serde(default)]
    pub promo_data: String,
    #[serde(default)]
    pub price_texts: Vec<String>,
}

fn selector_array(selectors: &[&str]) -> String {
    selectors
        .iter()
        .map(|s| format!("'{}'", escape_js(s)))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape_js(input: &str) -> String {
    input.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Builds the in-page extraction script for one listing view. Every field
/// is resolved through its ordered selector chain inside each item node.
pub fn listing_script(selectors: &FieldSelectors) -> String {
    let promo_attr = match selectors.promo_attr {
        Some((sel, attr)) => format!(
            "(() => {{ const el = item.querySelector('{}'); return el ? (el.getAttribute('{}') || '').trim() : ''; }})()",
            escape_js(sel),
            escape_js(attr)
        ),
        None => "''".to_string(),
    };
    format!(
        r#"
(() => {{
    const chainText = (root, selectors) => {{
        for (const sel of selectors) {{
            const el = root.querySelector(sel);
            if (el) {{
                const text = (el.textContent || '').trim();
                if (text) {{
                    return text;
                }}
            }}
        }}
        return '';
    }};
    const chainAttr = (root, selectors, attr) => {{
        for (const sel of selectors) {{
            const el = root.querySelector(sel);
            if (el) {{
                const value = (el.getAttribute(attr) || '').trim();
                if (value) {{
                    return value;
                }}
            }}
        }}
        return '';
    }};
    let items = [];
    for (const sel of [{item}]) {{
        items = Array.from(document.querySelectorAll(sel));
        if (items.length) {{
            break;
        }}
    }}
    return items.map(item => {{
        const meta = [{meta}]
            .flatMap(sel => Array.from(item.querySelectorAll(sel)).map(el => (el.textContent || '').trim()))
            .filter(Boolean)
            .join(' ');
        const pair = [{pair}]
            .flatMap(sel => Array.from(item.querySelectorAll(sel)).map(el => (el.textContent || '').trim()))
            .filter(Boolean)
            .slice(0, 2);
        return {{
            name: chainText(item, [{name}]),
            price_text: chainText(item, [{price}]),
            link: chainAttr(item, [{link}], 'href'),
            image: chainAttr(item, [{image}], 'src') || chainAttr(item, [{image}], 'data-src'),
            meta,
            promo_badge: chainText(item, [{promo}]),
            promo_data: {promo_attr},
            price_texts: pair,
        }};
    }}).filter(row => row.name);
}})()
"#,
        item = selector_array(selectors.item),
        meta = selector_array(selectors.meta),
        pair = selector_array(selectors.price_pair),
        name = selector_array(selectors.name),
        price = selector_array(selectors.price),
        link = selector_array(selectors.link),
        image = selector_array(selectors.image),
        promo = selector_array(selectors.promo_badge),
        promo_attr = promo_attr,
    )
}

/// Runs the listing script and decodes its rows. A malformed payload is an
/// extraction failure for this page only.
pub async fn extract_rows(
    page: &mut dyn StorePage,
    selectors: &FieldSelectors,
) -> ScrapeResult<Vec<RawListing>> {
    let value = page.evaluate_json(&listing_script(selectors)).await?;
    serde_json::from_value(value)
        .map_err(|err| ScrapeError::Extraction(format!("failed to decode listing rows: {err}")))
}

/// Converts decoded rows into catalog records. Rows without raw price text
/// are discarded; rows whose price fails numeric parsing are kept with the
/// raw text only. Relative links resolve against the store's base address.
pub fn rows_to_records(rows: Vec<RawListing>, base_url: &str) -> Vec<CatalogRecord> {
    let base = Url::parse(base_url).ok();
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        if row.name.trim().is_empty() || row.price_text.trim().is_empty() {
            continue;
        }
        let link = resolve_link(base.as_ref(), &row.link);
        let price = parse_price(&row.price_text);
        let promo = resolve_promo(
            Some(row.promo_badge.as_str()),
            if row.promo_data.is_empty() {
                None
            } else {
                Some(row.promo_data.as_str())
            },
            &row.price_texts,
        );
        let available = availability_from_text(&row.meta);
        records.push(CatalogRecord {
            name: row.name.trim().to_string(),
            price_text: row.price_text.trim().to_string(),
            price,
            link,
            image_url: if row.image.is_empty() {
                None
            } else {
                Some(row.image)
            },
            metadata: row.meta,
            available,
            promo,
        });
    }
    records
}

fn resolve_link(base: Option<&Url>, link: &str) -> String {
    if link.is_empty() {
        return String::new();
    }
    match base {
        Some(base) => base
            .join(link)
            .map(|joined| joined.to_string())
            .unwrap_or_else(|_| link.to_string()),
        None => link.to_string(),
    }
}

/// The unioned query set: every search term referenced by the target
/// products, de-duplicated case-insensitively and in first-seen order. One
/// request per term instead of one per product keeps the request count and
/// the detection surface down.
pub fn union_search_terms(products: &[TargetProduct], store_name: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut terms = Vec::new();
    for product in products {
        for term in product.resolve_for(store_name).search_terms {
            let key = term.to_lowercase();
            if !key.trim().is_empty() && seen.insert(key) {
                terms.push(term);
            }
        }
    }
    terms
}

/// Bot-block signals the storefronts surface in page content.
pub fn looks_blocked(body_text: &str) -> bool {
    const SIGNALS: [&str; 7] = [
        "access denied",
        "captcha",
        "are you a robot",
        "unusual traffic",
        "verdacht verkeer",
        "je bent geblokkeerd",
        "attention required",
    ];
    let lowered = body_text.to_lowercase();
    SIGNALS.iter().any(|signal| lowered.contains(signal))
}

pub fn encode_query(term: &str) -> String {
    url::form_urlencoded::byte_serialize(term.as_bytes()).collect()
}

/// Shared page preparation: navigate, clear the cookie banner, wait for the
/// listing selector (soft), settle, then trigger lazy loading with scroll
/// bursts. Returns whether the readiness selector ever appeared.
pub async fn prepare_listing(
    page: &mut dyn StorePage,
    ctx: &LoadContext<'_>,
    url: &str,
    ready_selector: &str,
) -> ScrapeResult<bool> {
    page.goto(url).await?;
    ctx.humanizer.dismiss_cookie_banner(page).await?;
    let ready = page
        .wait_for_selector(ready_selector, ctx.selector_timeout)
        .await?;
    if !ready {
        debug!(url, selector = ready_selector, "listing selector not seen before timeout");
    }
    page.settle(ctx.post_load_wait).await?;
    ctx.humanizer.browse_scroll(page, 2).await?;
    Ok(ready)
}

/// Checks the page body for a block interstitial. Logs when one is found.
pub async fn blocked(page: &mut dyn StorePage, store: &str) -> ScrapeResult<bool> {
    let body = page.body_text().await?;
    if looks_blocked(&body) {
        warn!(store, "bot-block signal detected in page content");
        return Ok(true);
    }
    Ok(false)
}

/// Appends records whose links were not collected yet. Returns how many
/// were new; pagination stops when a page contributes nothing.
pub fn merge_new_records(
    collected: &mut Vec<CatalogRecord>,
    seen_links: &mut HashSet<String>,
    batch: Vec<CatalogRecord>,
) -> usize {
    let mut added = 0;
    for record in batch {
        let key = if record.link.is_empty() {
            format!("{}|{}", record.name, record.price_text)
        } else {
            record.link.clone()
        };
        if seen_links.insert(key) {
            collected.push(record);
            added += 1;
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn product(name: &str, terms: &[&str]) -> TargetProduct {
        TargetProduct {
            name: name.to_string(),
            search_terms: terms.iter().map(|s| s.to_string()).collect(),
            required_keywords: vec![],
            must_contain: vec![],
            preferred_keywords: vec![],
            store_overrides: HashMap::new(),
        }
    }

    #[test]
    fn factory_resolves_aliases_case_insensitively() {
        assert_eq!(adapter_for("Colruyt").unwrap().store(), "colruyt");
        assert_eq!(adapter_for("AH").unwrap().store(), "albert heijn");
        assert_eq!(adapter_for("Albert Heijn").unwrap().store(), "albert heijn");
        assert_eq!(adapter_for("carrefour drive").unwrap().store(), "carrefour");
    }

    #[test]
    fn factory_rejects_unknown_store() {
        let err = adapter_for("lidl").unwrap_err();
        assert!(matches!(err, ScrapeError::UnsupportedStore(name) if name == "lidl"));
    }

    #[test]
    fn union_search_terms_dedups_across_products() {
        let products = vec![
            product("Jupiler krat", &["jupiler"]),
            product("Jupiler blik", &["Jupiler", "jupiler blik"]),
            product("Duvel", &["duvel"]),
        ];
        let terms = union_search_terms(&products, "colruyt");
        assert_eq!(terms, vec!["jupiler", "jupiler blik", "duvel"]);
    }

    #[test]
    fn union_search_terms_honors_store_overrides_case_insensitively() {
        let mut aliased = product("Jupiler krat", &["jupiler"]);
        aliased.store_overrides.insert(
            "AH".to_string(),
            crate::config::ProductOverride {
                search_terms: Some(vec!["jupiler krat".to_string()]),
                ..crate::config::ProductOverride::default()
            },
        );
        assert_eq!(union_search_terms(&[aliased.clone()], "ah"), vec!["jupiler krat"]);
        assert_eq!(union_search_terms(&[aliased], "colruyt"), vec!["jupiler"]);
    }

    #[test]
    fn rows_to_records_drops_priceless_rows_and_resolves_links() {
        let rows = vec![
            RawListing {
                name: "Jupiler Pils 6x33cl".into(),
                price_text: "€4,99".into(),
                link: "/p/jupiler-6x33".into(),
                image: String::new(),
                meta: "pils krat".into(),
                promo_badge: String::new(),
                promo_data: String::new(),
                price_texts: vec![],
            },
            RawListing {
                name: "Naamloos".into(),
                price_text: String::new(),
                link: "/p/naamloos".into(),
                image: String::new(),
                meta: String::new(),
                promo_badge: String::new(),
                promo_data: String::new(),
                price_texts: vec![],
            },
        ];
        let records = rows_to_records(rows, "https://www.colruyt.be");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].link, "https://www.colruyt.be/p/jupiler-6x33");
        assert_eq!(records[0].price, Some(4.99));
    }

    #[test]
    fn rows_to_records_keeps_unparsable_price_with_raw_text() {
        let rows = vec![RawListing {
            name: "Orval 33cl".into(),
            price_text: "Prijs onbekend".into(),
            link: "https://shop.test/orval".into(),
            image: String::new(),
            meta: String::new(),
            promo_badge: String::new(),
            promo_data: String::new(),
            price_texts: vec![],
        }];
        let records = rows_to_records(rows, "https://shop.test");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].price, None);
        assert_eq!(records[0].price_text, "Prijs onbekend");
    }

    #[test]
    fn looks_blocked_detects_interstitials() {
        assert!(looks_blocked("Attention Required! | Cloudflare"));
        assert!(looks_blocked("los deze captcha op om verder te gaan"));
        assert!(!looks_blocked("24 resultaten voor jupiler"));
    }

    #[test]
    fn merge_new_records_counts_only_fresh_links() {
        let mut collected = Vec::new();
        let mut seen = HashSet::new();
        let record = CatalogRecord {
            name: "Jupiler".into(),
            price_text: "€4,99".into(),
            price: Some(4.99),
            link: "https://shop.test/jupiler".into(),
            image_url: None,
            metadata: String::new(),
            available: true,
            promo: None,
        };
        assert_eq!(
            merge_new_records(&mut collected, &mut seen, vec![record.clone()]),
            1
        );
        assert_eq!(merge_new_records(&mut collected, &mut seen, vec![record]), 0);
        assert_eq!(collected.len(), 1);
    }
}
