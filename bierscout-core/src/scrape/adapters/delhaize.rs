use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::TargetProduct;

use super::super::error::{ScrapeError, ScrapeResult};
use super::super::page::StorePage;
use super::super::records::CatalogRecord;
use super::{
    blocked, encode_query, extract_rows, merge_new_records, prepare_listing, union_search_terms,
    FieldSelectors, LoadContext, SiteAdapter,
};

const SELECTORS: FieldSelectors = FieldSelectors {
    item: &[
        "[data-testid='product-block']",
        "li.product-list__item",
        "article[class*='ProductCard']",
    ],
    name: &[
        "[data-testid='product-block-name']",
        ".product-block__name",
        "h3",
    ],
    price: &[
        "[data-testid='product-block-price']",
        ".product-block__price",
        ".price__value",
    ],
    link: &["a[data-testid='product-block-link']", "a[href*='/product/']", "a"],
    image: &["img[data-testid='product-block-image']", "img"],
    meta: &[".product-block__unit", ".product-block__availability"],
    promo_badge: &["[data-testid='promo-sticker']", ".promo-sticker"],
    promo_attr: None,
    price_pair: &[".price__strikethrough", ".price__value"],
};

/// The results grid fills in as the page scrolls, so one navigation per term
/// followed by scroll rounds until the listing stops growing.
pub struct Delhaize;

#[async_trait(?Send)]
impl SiteAdapter for Delhaize {
    fn store(&self) -> &'static str {
        "delhaize"
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
            let url = format!("{base}/nl/shop/search?text={}", encode_query(&term));
            prepare_listing(page, ctx, &url, SELECTORS.item[0]).await?;
            if blocked(page, self.store()).await? {
                if collected.is_empty() {
                    return Err(ScrapeError::BotDetected(
                        "delhaize interstitial before any extraction".into(),
                    ));
                }
                break 'terms;
            }

            for round in 0..ctx.page_cap {
                let rows = extract_rows(page, &SELECTORS).await?;
                let batch = super::rows_to_records(rows, &ctx.store.base_url);
                let added = merge_new_records(&mut collected, &mut seen_links, batch);
                debug!(term = %term, round, added, "delhaize scroll round extracted");
                if added == 0 {
                    break;
                }
                ctx.humanizer.browse_scroll(page, 3).await?;
                page.settle(ctx.post_load_wait).await?;
            }
        }

        info!(records = collected.len(), "delhaize catalog loaded");
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
            name: "delhaize".into(),
            base_url: "https://www.delhaize.be".into(),
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
            name: "Duvel".into(),
            search_terms: terms.iter().map(|s| s.to_string()).collect(),
            required_keywords: vec![],
            must_contain: vec![],
            preferred_keywords: vec![],
            store_overrides: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn scroll_rounds_accumulate_lazy_loaded_rows() {
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
            serde_json::json!([row("Duvel 4x33cl", "€9,49", "/product/duvel-4")]),
            serde_json::json!([
                row("Duvel 4x33cl", "€9,49", "/product/duvel-4"),
                row("Duvel 75cl", "€5,29", "/product/duvel-75"),
            ]),
            // No growth, scrolling stops.
            serde_json::json!([
                row("Duvel 4x33cl", "€9,49", "/product/duvel-4"),
                row("Duvel 75cl", "€5,29", "/product/duvel-75"),
            ]),
        ]);
        let records = Delhaize
            .load_catalog(&mut page, &ctx, &[product(&["duvel"])])
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        // One navigation per term; growth happens by scrolling.
        assert_eq!(page.visited.len(), 1);
        assert!(page.visited[0].contains("search?text=duvel"));
        assert!(page.scroll_count > 2);
    }

    #[tokio::test]
    async fn one_navigation_per_unioned_term() {
        let store = store();
        let humanizer = humanizer();
        let ctx = LoadContext {
            store: &store,
            page_cap: 2,
            post_load_wait: Duration::from_millis(0),
            selector_timeout: Duration::from_millis(0),
            humanizer: &humanizer,
        };
        let mut page = FakePage::with_listings(vec![]);
        let products = vec![product(&["duvel"]), product(&["duvel", "chouffe"])];
        Delhaize
            .load_catalog(&mut page, &ctx, &products)
            .await
            .unwrap();
        assert_eq!(page.visited.len(), 2);
        assert!(page.visited[1].contains("chouffe"));
    }
}
