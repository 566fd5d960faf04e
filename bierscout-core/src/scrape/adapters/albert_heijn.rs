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

const SELECTORS: FieldSelectors = FieldSelectors {
    item: &[
        "article[data-testhook='product-card']",
        "div[class*='product-card-portrait']",
        "article.product-card",
    ],
    name: &[
        "[data-testhook='product-title']",
        "strong[class*='title']",
        "h3",
    ],
    price: &[
        "[data-testhook='price-amount']",
        "div[class*='price-amount']",
        ".price",
    ],
    link: &["a[data-testhook='product-card-link']", "a[href*='/producten/product/']", "a"],
    image: &["img[data-testhook='product-image']", "img"],
    meta: &["[data-testhook='product-unit-size']", "[data-testhook='product-availability']"],
    promo_badge: &["[data-testhook='product-shield']", ".promotion-shield"],
    promo_attr: None,
    price_pair: &["[data-testhook='price-was']", "[data-testhook='price-amount']"],
};

/// Sits behind a cookie wall and watches traffic closely. Runs defensively:
/// zero-based page parameter, and any block signal ends the pass with
/// whatever was already extracted.
pub struct AlbertHeijn;

#[async_trait(?Send)]
impl SiteAdapter for AlbertHeijn {
    fn store(&self) -> &'static str {
        "albert heijn"
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
            for page_no in 0..ctx.page_cap {
                let url = format!(
                    "{base}/zoeken?query={}&page={page_no}",
                    encode_query(&term)
                );
                let ready = prepare_listing(page, ctx, &url, SELECTORS.item[0]).await?;
                if blocked(page, self.store()).await? {
                    if collected.is_empty() {
                        return Err(ScrapeError::BotDetected(
                            "albert heijn interstitial before any extraction".into(),
                        ));
                    }
                    warn!(term = %term, "albert heijn block mid-run, keeping partial catalog");
                    break 'terms;
                }
                if !ready && page_no == 0 {
                    // The cookie wall sometimes swallows the first render.
                    ctx.humanizer.dismiss_cookie_banner(page).await?;
                    page.settle(ctx.post_load_wait).await?;
                }
                let rows = extract_rows(page, &SELECTORS).await?;
                let batch = super::rows_to_records(rows, &ctx.store.base_url);
                let added = merge_new_records(&mut collected, &mut seen_links, batch);
                debug!(term = %term, page_no, added, "albert heijn listing page extracted");
                if added == 0 {
                    break;
                }
            }
        }

        info!(records = collected.len(), "albert heijn catalog loaded");
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
            name: "albert heijn".into(),
            base_url: "https://www.ah.be".into(),
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
                banner_selectors: vec!["#accept-cookies".into()],
                settle_ms: 0,
            },
        )
    }

    fn product(terms: &[&str]) -> TargetProduct {
        TargetProduct {
            name: "Hertog Jan".into(),
            search_terms: terms.iter().map(|s| s.to_string()).collect(),
            required_keywords: vec![],
            must_contain: vec![],
            preferred_keywords: vec![],
            store_overrides: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn marked_defensive() {
        assert!(AlbertHeijn.defensive());
    }

    #[tokio::test]
    async fn pagination_is_zero_based() {
        let store = store();
        let humanizer = humanizer();
        let ctx = LoadContext {
            store: &store,
            page_cap: 3,
            post_load_wait: Duration::from_millis(0),
            selector_timeout: Duration::from_millis(0),
            humanizer: &humanizer,
        };
        let mut page = FakePage::with_listings(vec![
            serde_json::json!([row("Hertog Jan 6x30cl", "€5,99", "/producten/product/hj-6")]),
            serde_json::json!([]),
        ]);
        AlbertHeijn
            .load_catalog(&mut page, &ctx, &[product(&["hertog jan"])])
            .await
            .unwrap();
        assert!(page.visited[0].contains("page=0"));
        assert!(page.visited[0].contains("query=hertog+jan"));
        assert_eq!(page.visited.len(), 2);
    }

    #[tokio::test]
    async fn queries_use_terms_resolved_for_the_configured_store_name() {
        // The config may name the store by an alias the factory accepts;
        // override lookup and query building must key off that same name.
        let store = Store {
            name: "AH".into(),
            base_url: "https://www.ah.be".into(),
            enabled: true,
        };
        let humanizer = humanizer();
        let ctx = LoadContext {
            store: &store,
            page_cap: 1,
            post_load_wait: Duration::from_millis(0),
            selector_timeout: Duration::from_millis(0),
            humanizer: &humanizer,
        };
        let mut product = product(&["hertog jan"]);
        product.store_overrides.insert(
            "ah".to_string(),
            crate::config::ProductOverride {
                search_terms: Some(vec!["hertog jan pilsener".to_string()]),
                ..crate::config::ProductOverride::default()
            },
        );
        let mut page = FakePage::with_listings(vec![]);
        AlbertHeijn
            .load_catalog(&mut page, &ctx, &[product])
            .await
            .unwrap();
        assert_eq!(page.visited.len(), 1);
        assert!(page.visited[0].contains("query=hertog+jan+pilsener"));
    }

    #[tokio::test]
    async fn block_before_extraction_is_an_error() {
        let store = store();
        let humanizer = humanizer();
        let ctx = LoadContext {
            store: &store,
            page_cap: 3,
            post_load_wait: Duration::from_millis(0),
            selector_timeout: Duration::from_millis(0),
            humanizer: &humanizer,
        };
        let mut page = FakePage::with_listings(vec![]);
        page.body = "los de captcha op voordat je verder gaat".into();
        let err = AlbertHeijn
            .load_catalog(&mut page, &ctx, &[product(&["hertog jan"])])
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::BotDetected(_)));
    }
}
