use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use super::records::MatchedResult;

/// One per-product batch, emitted immediately after that product's match
/// set is computed. The delivery transport is a separate consumer reading
/// these off a channel.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEvent {
    pub store: String,
    pub target_product: String,
    pub new_matches: Vec<MatchedResult>,
    pub total_matches: usize,
}

/// Synchronous subscriber seam: `(new_matches, all_matches_so_far)`.
pub type BatchCallback = Box<dyn FnMut(&[MatchedResult], &[MatchedResult]) + Send>;

/// Turns the per-product match stream into a grouped, sorted, de-duplicated
/// view and notifies subscribers incrementally.
#[derive(Default)]
pub struct MatchAggregator {
    matches: Vec<MatchedResult>,
    seen: HashSet<(String, String, String)>,
    events: Option<UnboundedSender<BatchEvent>>,
    callback: Option<BatchCallback>,
}

impl MatchAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(mut self, sender: UnboundedSender<BatchEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn with_callback(mut self, callback: BatchCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Accepts one product's matches. Records already seen under the same
    /// (product name, store, link) triple are suppressed; subscribers are
    /// only notified for non-empty deduplicated batches. Returns the number
    /// of newly accepted matches.
    pub fn push_batch(&mut self, candidates: Vec<MatchedResult>) -> usize {
        let mut fresh = Vec::new();
        for candidate in candidates {
            let key = (
                candidate.product_name.clone(),
                candidate.store.clone(),
                candidate.link.clone(),
            );
            if self.seen.insert(key) {
                fresh.push(candidate);
            } else {
                trace!(product = %candidate.product_name, store = %candidate.store, "duplicate match suppressed");
            }
        }
        if fresh.is_empty() {
            return 0;
        }

        let accepted = fresh.len();
        self.matches.extend(fresh.iter().cloned());

        if let Some(callback) = self.callback.as_mut() {
            callback(&fresh, &self.matches);
        }
        if let Some(sender) = &self.events {
            let event = BatchEvent {
                store: fresh[0].store.clone(),
                target_product: fresh[0].target_product.clone(),
                new_matches: fresh,
                total_matches: self.matches.len(),
            };
            // A closed consumer must not abort the scraping run.
            let _ = sender.send(event);
        }
        accepted
    }

    pub fn all(&self) -> &[MatchedResult] {
        &self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// The grouped, price-sorted final view. Groups keep first-discovery
    /// order; within a group, priced records sort ascending and unpriced
    /// records follow in discovery order (stable sort).
    pub fn grouped(&self) -> Vec<MatchGroup> {
        let mut groups: Vec<MatchGroup> = Vec::new();
        for result in &self.matches {
            let key = group_key(result);
            match groups.iter_mut().find(|group| group.key == key) {
                Some(group) => group.results.push(result.clone()),
                None => groups.push(MatchGroup {
                    key,
                    results: vec![result.clone()],
                }),
            }
        }
        for group in &mut groups {
            group.results.sort_by(compare_by_price);
        }
        groups
    }

    /// The flat final set in grouped/sorted order, for persistence.
    pub fn into_final(self) -> Vec<MatchedResult> {
        self.grouped()
            .into_iter()
            .flat_map(|group| group.results)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchGroup {
    pub key: String,
    pub results: Vec<MatchedResult>,
}

fn group_key(result: &MatchedResult) -> String {
    if result.target_product.is_empty() {
        result.product_name.clone()
    } else {
        result.target_product.clone()
    }
}

fn compare_by_price(a: &MatchedResult, b: &MatchedResult) -> Ordering {
    match (a.price, b.price) {
        (Some(left), Some(right)) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn result(name: &str, store: &str, target: &str, price: Option<f64>) -> MatchedResult {
        MatchedResult {
            product_name: name.to_string(),
            store: store.to_string(),
            price_text: price
                .map(|p| format!("€{p:.2}"))
                .unwrap_or_else(|| "Prijs onbekend".to_string()),
            price,
            target_product: target.to_string(),
            link: format!("https://example.test/{name}"),
            captured_at: Utc::now(),
            available: true,
            image_url: None,
            promo: None,
        }
    }

    #[test]
    fn groups_sort_prices_ascending_with_unpriced_last() {
        let mut aggregator = MatchAggregator::new();
        aggregator.push_batch(vec![
            result("a", "colruyt", "Jupiler", Some(9.99)),
            result("b", "delhaize", "Jupiler", None),
            result("c", "carrefour", "Jupiler", Some(8.49)),
            result("d", "drankgigant", "Jupiler", Some(11.00)),
        ]);
        let groups = aggregator.grouped();
        assert_eq!(groups.len(), 1);
        let prices: Vec<Option<f64>> = groups[0].results.iter().map(|r| r.price).collect();
        assert_eq!(prices, vec![Some(8.49), Some(9.99), Some(11.00), None]);
    }

    #[test]
    fn unpriced_ties_keep_discovery_order() {
        let mut aggregator = MatchAggregator::new();
        aggregator.push_batch(vec![
            result("first-unpriced", "colruyt", "Duvel", None),
            result("second-unpriced", "delhaize", "Duvel", None),
            result("priced", "carrefour", "Duvel", Some(12.0)),
        ]);
        let groups = aggregator.grouped();
        let names: Vec<&str> = groups[0]
            .results
            .iter()
            .map(|r| r.product_name.as_str())
            .collect();
        assert_eq!(names, vec!["priced", "first-unpriced", "second-unpriced"]);
    }

    #[test]
    fn duplicate_triple_suppressed() {
        let mut aggregator = MatchAggregator::new();
        let a = result("Jupiler Pils 24x25cl", "colruyt", "Jupiler", Some(14.99));
        let first = aggregator.push_batch(vec![a.clone()]);
        let second = aggregator.push_batch(vec![a]);
        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(aggregator.len(), 1);
    }

    #[test]
    fn same_name_different_store_kept() {
        let mut aggregator = MatchAggregator::new();
        aggregator.push_batch(vec![
            result("Jupiler Pils", "colruyt", "Jupiler", Some(14.99)),
            result("Jupiler Pils", "delhaize", "Jupiler", Some(15.49)),
        ]);
        assert_eq!(aggregator.len(), 2);
    }

    #[test]
    fn callback_sees_new_and_accumulated() {
        use std::sync::{Arc, Mutex};
        let calls: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
        let calls_for_cb = Arc::clone(&calls);
        let mut aggregator =
            MatchAggregator::new().with_callback(Box::new(move |fresh, all| {
                calls_for_cb.lock().unwrap().push((fresh.len(), all.len()));
            }));
        aggregator.push_batch(vec![result("a", "colruyt", "Jupiler", Some(1.0))]);
        aggregator.push_batch(vec![
            result("b", "colruyt", "Duvel", Some(2.0)),
            result("c", "colruyt", "Duvel", Some(3.0)),
        ]);
        // Empty batches are silent.
        aggregator.push_batch(vec![]);
        assert_eq!(*calls.lock().unwrap(), vec![(1, 1), (2, 3)]);
    }

    #[test]
    fn events_flow_through_channel() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut aggregator = MatchAggregator::new().with_events(tx);
        aggregator.push_batch(vec![result("a", "colruyt", "Jupiler", Some(1.0))]);
        let event = rx.try_recv().expect("batch event expected");
        assert_eq!(event.store, "colruyt");
        assert_eq!(event.target_product, "Jupiler");
        assert_eq!(event.total_matches, 1);
    }

    #[test]
    fn groups_fall_back_to_product_name() {
        let mut aggregator = MatchAggregator::new();
        aggregator.push_batch(vec![result("Orval 33cl", "colruyt", "", Some(2.19))]);
        let groups = aggregator.grouped();
        assert_eq!(groups[0].key, "Orval 33cl");
    }
}
