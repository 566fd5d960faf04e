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
        ".product-grid .product-tile",
        "[data-testid='product-card']",
        "article.product",
    ],
    name: &[
        ".product-tile__name",
        "[data-testid='product-title']",
        "h3 a",
    ],
    price: &[
        ".product-price__basic",
        "[data-testid='product-price']",
        ".price",
    ],
    link: &["a.product-tile__link", "a[href*='/producten/']", "a"],
    image: &["img.product-tile__image", "picture img", "img"],
    meta: &[".product-tile__volume", ".product-tile__description", ".availability"],
    promo_badge: &[".promo-flag", ".product-tile__promo", "[data-testid='promo-label']"],
    promo_attr: None,
    price_pair: &[".price--old", ".price--new"],
};

/// Search results paginate through a URL parameter, so each listing view is
/// its own navigation.
pub struct Colruyt;

#[async_trait(?Send)]
impl SiteAdapter for Colruyt {
    fn store(&self) -> &'static str {
        "colruyt"
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
            for page_no in 1..=ctx.page_cap {
                let url = format!(
                    "{base}/nl/zoeken?searchTerm={}&page={page_no}",
                    encode_query(&term)
                );
                prepare_listing(page, ctx, &url, SELECTORS.item[0]).await?;
                if blocked(page, self.store()).await? {
                    if collected.is_empty() {
                        return Err(ScrapeError::BotDetected(
                            "colruyt interstitial before any extraction".into(),
                        ));
                    }
                    // Keep what was already extracted.
                    break 'terms;
                }
                let rows = extract_rows(page, &SELECTORS).await?;
                let batch = super::rows_to_records(rows, &ctx.store.base_url);
                let added = merge_new_records(&mut collected, &mut seen_links, batch);
                debug!(term = %term, page_no, added, "colruyt listing page extracted");
                if added == 0 {
                    break;
                }
            }
        }

        info!(records = collected.len(), "colruyt catalog loaded");
        Ok(collected)
    }
}
