use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::config::{ConsentSection, DelaySection};

use super::error::ScrapeResult;
use super::page::StorePage;

/// Inter-product delay policy. Regular stores get a short bounded-random
/// pause; defensive stores get a longer backoff whose base escalates with
/// consecutive error strikes, plus jitter.
#[derive(Debug, Clone)]
pub struct DelayPolicy {
    config: DelaySection,
}

impl DelayPolicy {
    pub fn new(config: DelaySection) -> Self {
        Self { config }
    }

    pub async fn between_products(&self, defensive: bool, strikes: u32) -> u64 {
        let millis = self.pick_delay(defensive, strikes);
        if millis > 0 {
            trace!(millis, defensive, strikes, "inter-product delay");
            sleep(Duration::from_millis(millis)).await;
        }
        millis
    }

    fn pick_delay(&self, defensive: bool, strikes: u32) -> u64 {
        let mut rng = rand::thread_rng();
        if defensive {
            let base = self.config.defensive_base_ms * u64::from(strikes.saturating_add(1));
            let jitter = if self.config.defensive_jitter_ms > 0 {
                rng.gen_range(0..=self.config.defensive_jitter_ms)
            } else {
                0
            };
            base + jitter
        } else {
            let lower = self.config.min_ms.min(self.config.max_ms);
            let upper = self.config.min_ms.max(self.config.max_ms);
            if upper == 0 {
                0
            } else {
                rng.gen_range(lower..=upper)
            }
        }
    }
}

/// Simulated browsing behavior on a live page: randomized scroll bursts
/// that double as the lazy-load trigger, and cookie banner dismissal.
#[derive(Debug, Clone)]
pub struct Humanizer {
    delays: DelaySection,
    consent: ConsentSection,
}

impl Humanizer {
    pub fn new(delays: DelaySection, consent: ConsentSection) -> Self {
        Self { delays, consent }
    }

    /// Scrolls down the listing in a few uneven bursts with pauses, the way
    /// a person skims a page. Triggers lazy-loaded content on the way.
    pub async fn browse_scroll(&self, page: &mut dyn StorePage, bursts: usize) -> ScrapeResult<()> {
        let burst_lo = self.delays.scroll_burst_px[0].min(self.delays.scroll_burst_px[1]);
        let burst_hi = self.delays.scroll_burst_px[0].max(self.delays.scroll_burst_px[1]);
        let pause_lo = self.delays.scroll_pause_ms[0].min(self.delays.scroll_pause_ms[1]);
        let pause_hi = self.delays.scroll_pause_ms[0].max(self.delays.scroll_pause_ms[1]);
        for _ in 0..bursts {
            let (delta, pause) = {
                let mut rng = rand::thread_rng();
                let delta = f64::from(rng.gen_range(burst_lo..=burst_hi));
                let pause = rng.gen_range(pause_lo..=pause_hi);
                (delta, pause)
            };
            page.scroll_by(delta).await?;
            sleep(Duration::from_millis(pause)).await;
        }
        Ok(())
    }

    /// Tries the configured consent button selectors in order and clicks the
    /// first one present. Absence of a banner is not an error.
    pub async fn dismiss_cookie_banner(&self, page: &mut dyn StorePage) -> ScrapeResult<bool> {
        for selector in &self.consent.banner_selectors {
            if page.click(selector).await? {
                debug!(selector = %selector, "dismissed cookie banner");
                page.settle(Duration::from_millis(self.consent.settle_ms))
                    .await?;
                return Ok(true);
            }
        }
        Ok(false)
    }
}
