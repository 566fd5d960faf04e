use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::TargetProduct;

use super::super::error::{ScrapeError, ScrapeResult};
use super::super::page::StorePage;
use super::super::records::CatalogRecord;
use super::{
    blocked, encode_query, extract_rows, merge_new_records, prepare_listing, union_search_terms,
    FieldSelectors, LoadContext, SiteAdapter,
};

const LOAD_MORE: &str = "button.pagination__load-more, [data-testid='load-more-button']";

const SELECTORS: FieldSelectors = FieldSelectors {
    item: &[
        "article.product-list-item",
        "[data-testid='product-item']",
        "li.product-grid__item article",
    ],
    name: &[
        ".product-list-item__title",
        "[data-testid='product-name']",
        "h3 a",
    ],
    price: &[
        ".product-price__main",
        "[data-testid='product-price']",
        ".price",
    ],
    link: &["a.product-list-item__link", "a[href*='/p/']", "a"],
    image: &["img.product-list-item__image", "img"],
    meta: &[".product-list-item__packaging", ".product-list-item__stock"],
    promo_badge: &[".promo-badge", "[data-testid='promotion-label']"],
    promo_attr: None,
    price_pair: &[".product-price__old", ".product-price__main"],
};

/// Results grow in place through a load-more button. Defensive store; the
/// click loop is bounded by the page cap and stops as soon as the button
/// disappears or a click stops adding rows.
pub struct Carrefour;

#[async_trait(?Send)]
impl SiteAdapter for Carrefour {
    fn store(&self) -> &'static str {
        "carrefour"
    }

    fn defensive(&self) -> bool {
        true
    }

    async fn load_catalog(
        &self,
        page: &mut dyn StorePage,
        ctx: &LoadContext<'_>,
        products: &[TargetProduct],
    ) -> ScrapeResult<Vec<CatalogRecord>> {
        let base = ctx.store.base_url.trim_end_matches('/');
        let mut collected = Vec::new();
        let mut seen_links = HashSet::new();

        'terms: for term in union_search_terms(products, &ctx.store.name) {
            let url = format!("{base}/nl/zoeken?q={}", encode_query(&term));
            prepare_listing(page, ctx, &url, SELECTORS.item[0]).await?;
            if blocked(page, self.store()).await? {
                if collected.is_empty() {
                    return Err(ScrapeError::BotDetected(
                        "carrefour interstitial before any extraction".into(),
                    ));
                }
                warn!(term = %term, "carrefour block mid-run, keeping partial catalog");
                break 'terms;
            }

            for expansion in 0..ctx.page_cap {
                let rows = extract_rows(page, &SELECTORS).await?;
                let batch = super::rows_to_records(rows, &ctx.store.base_url);
                let added = merge_new_records(&mut collected, &mut seen_links, batch);
                debug!(term = %term, expansion, added, "carrefour listing expansion extracted");
                if added == 0 && expansion > 0 {
                    break;
                }
                if !page.click(LOAD_MORE).await? {
                    break;
                }
                page.settle(ctx.post_load_wait).await?;
                ctx.humanizer.browse_scroll(page, 1).await?;
            }
        }

        info!(records = collected.len(), "carrefour catalog loaded");
        Ok(collected)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fake::{row, FakePage};
    use super::*;
    use crate::config::{ConsentSection, DelaySection, Store};
    use crate::scrape::humanize::Humanizer;
    use std::collections::HashMap;
    use std::time::Duration;

    fn store() -> Store {
        Store {
            name: "carrefour".into(),
            base_url: "https://www.carrefour.be".into(),
            enabled: true,
        }
    }

    fn humanizer() -> Humanizer {
        Humanizer::new(
            DelaySection {
                min_ms: 0,
                max_ms: 0,
                defensive_base_ms: 0,
                defensive_jitter_ms: 0,
                scroll_pause_ms: [0, 0],
                scroll_burst_px: [100, 200],
            },
            ConsentSection {
                banner_selectors: vec![],
                settle_ms: 0,
            },
        )
    }

    fn product(terms: &[&str]) -> TargetProduct {
        TargetProduct {
            name: "Leffe Blond".into(),
            search_terms: terms.iter().map(|s| s.to_string()).collect(),
            required_keywords: vec![],
            must_contain: vec![],
            preferred_keywords: vec![],
            store_overrides: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn marked_defensive() {
        assert!(Carrefour.defensive());
    }

    #[tokio::test]
    async fn clicks_load_more_until_button_disappears() {
        let store = store();
        let humanizer = humanizer();
        let ctx = LoadContext {
            store: &store,
            page_cap: 5,
            post_load_wait: Duration::from_millis(0),
            selector_timeout: Duration::from_millis(0),
            humanizer: &humanizer,
        };
        let mut page = FakePage::with_listings(vec![
            serde_json::json!([row("Leffe Blond 6x33cl", "€7,49", "/p/leffe-6")]),
            serde_json::json!([
                row("Leffe Blond 6x33cl", "€7,49", "/p/leffe-6"),
                row("Leffe Blond 75cl", "€3,99", "/p/leffe-75"),
            ]),
        ]);
        page.clickable.insert(LOAD_MORE.to_string(), 1);
        let records = Carrefour
            .load_catalog(&mut page, &ctx, &[product(&["leffe"])])
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        // One successful expansion, then the missing button ends the loop.
        assert_eq!(page.clicked.iter().filter(|s| *s == LOAD_MORE).count(), 2);
        assert_eq!(page.visited.len(), 1);
    }

    #[tokio::test]
    async fn stops_when_expansion_adds_nothing() {
        let store = store();
        let humanizer = humanizer();
        let ctx = LoadContext {
            store: &store,
            page_cap: 10,
            post_load_wait: Duration::from_millis(0),
            selector_timeout: Duration::from_millis(0),
            humanizer: &humanizer,
        };
        let mut page = FakePage::with_listings(vec![
            serde_json::json!([row("Leffe Blond 6x33cl", "€7,49", "/p/leffe-6")]),
            serde_json::json!([row("Leffe Blond 6x33cl", "€7,49", "/p/leffe-6")]),
        ]);
        page.clickable.insert(LOAD_MORE.to_string(), 10);
        let records = Carrefour
            .load_catalog(&mut page, &ctx, &[product(&["leffe"])])
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        // Second extraction adds nothing, loop ends well before the cap.
        assert!(page.clicked.iter().filter(|s| *s == LOAD_MORE).count() <= 2);
    }
}
