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
        "li.product-item",
        ".products-grid .product",
        "[data-role='product-card']",
    ],
    name: &[".product-item-name a", ".product-item-link", "h2 a"],
    price: &[".price-box .price", "[data-price-type='finalPrice']", ".price"],
    link: &["a.product-item-link", "a.product-item-photo", "a"],
    image: &["img.product-image-photo", "img"],
    meta: &[".product-item-description", ".stock-status"],
    promo_badge: &[".product-label--sale", ".discount-label"],
    promo_attr: Some(("[data-promo]", "data-promo")),
    price_pair: &[".old-price .price", ".special-price .price"],
};

/// Specialist shop with a deep catalog and no pagination hostility. One
/// large listing request per term; promotions arrive as a structured JSON
/// attribute on the item node.
pub struct Drankgigant;

#[async_trait(?Send)]
impl SiteAdapter for Drankgigant {
    fn store(&self) -> &'static str {
        "drankgigant"
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

        for term in union_search_terms(products, &ctx.store.name) {
            let url = format!(
                "{base}/catalogsearch/result/?q={}&product_list_limit=96",
                encode_query(&term)
            );
            prepare_listing(page, ctx, &url, SELECTORS.item[0]).await?;
            if blocked(page, self.store()).await? {
                if collected.is_empty() {
                    return Err(ScrapeError::BotDetected(
                        "drankgigant interstitial before any extraction".into(),
                    ));
                }
                break;
            }
            let rows = extract_rows(page, &SELECTORS).await?;
            let batch = super::rows_to_records(rows, &ctx.store.base_url);
            let added = merge_new_records(&mut collected, &mut seen_links, batch);
            debug!(term = %term, added, "drankgigant listing extracted");
        }

        info!(records = collected.len(), "drankgigant catalog loaded");
        Ok(collected)
    }
}
