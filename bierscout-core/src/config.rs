use std::collections::HashMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    pub chromium: ChromiumSection,
    pub flags: FlagsSection,
    pub user_agents: UserAgentSection,
    pub viewport: ViewportSection,
    pub stealth: StealthSection,
    pub delays: DelaySection,
    pub consent: ConsentSection,
    pub profiles: ProfileSection,
    pub behavior: BehaviorSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChromiumSection {
    pub executable_path: String,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub navigation_timeout_seconds: u64,
    pub post_load_wait_ms: u64,
    pub tab_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlagsSection {
    pub no_first_run: bool,
    pub disable_automation_controlled: bool,
    pub disable_blink_features: Vec<String>,
    pub mute_audio: bool,
    pub lang: Option<String>,
    pub accept_language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentSection {
    pub pool: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewportSection {
    pub resolutions: Vec<[u32; 2]>,
    pub jitter_pixels: u32,
    pub device_scale_factor: [f32; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct StealthSection {
    pub mask_webdriver: bool,
    pub mask_plugins: bool,
    pub mask_languages: bool,
    pub enable_canvas_noise: bool,
    pub canvas_noise_range: [i32; 2],
    pub webgl_vendor: Option<String>,
    pub webgl_renderer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelaySection {
    pub min_ms: u64,
    pub max_ms: u64,
    pub defensive_base_ms: u64,
    pub defensive_jitter_ms: u64,
    pub scroll_pause_ms: [u64; 2],
    pub scroll_burst_px: [u32; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsentSection {
    pub banner_selectors: Vec<String>,
    pub settle_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileSection {
    pub base_dir: String,
    pub ttl_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BehaviorSection {
    pub exclude_alcohol_free: bool,
    pub page_cap: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub stores: Vec<Store>,
    pub products: Vec<TargetProduct>,
}

/// One target retailer website. Immutable for a run.
#[derive(Debug, Clone, Deserialize)]
pub struct Store {
    pub name: String,
    pub base_url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A configured product searched for across stores. Read-only during
/// scraping; per-store overrides are resolved before any record is tested.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetProduct {
    pub name: String,
    pub search_terms: Vec<String>,
    #[serde(default)]
    pub required_keywords: Vec<String>,
    #[serde(default)]
    pub must_contain: Vec<String>,
    #[serde(default)]
    pub preferred_keywords: Vec<String>,
    #[serde(default)]
    pub store_overrides: HashMap<String, ProductOverride>,
}

/// Fields present here replace the base field wholesale for that store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductOverride {
    pub search_terms: Option<Vec<String>>,
    pub required_keywords: Option<Vec<String>>,
    pub must_contain: Option<Vec<String>>,
    pub preferred_keywords: Option<Vec<String>>,
}

/// A target product with any store override already applied.
#[derive(Debug, Clone)]
pub struct ResolvedProduct {
    pub name: String,
    pub search_terms: Vec<String>,
    pub required_keywords: Vec<String>,
    pub must_contain: Vec<String>,
    pub preferred_keywords: Vec<String>,
}

impl TargetProduct {
    /// Resolves the effective filter rules for a store. Override lookup is
    /// case-insensitive; absence of an entry leaves the base rules untouched.
    pub fn resolve_for(&self, store_name: &str) -> ResolvedProduct {
        let wanted = store_name.to_lowercase();
        let overrides = self
            .store_overrides
            .iter()
            .find(|(key, _)| key.to_lowercase() == wanted)
            .map(|(_, value)| value);

        let pick = |field: Option<&Vec<String>>, base: &Vec<String>| {
            field.cloned().unwrap_or_else(|| base.clone())
        };

        ResolvedProduct {
            name: self.name.clone(),
            search_terms: pick(
                overrides.and_then(|o| o.search_terms.as_ref()),
                &self.search_terms,
            ),
            required_keywords: pick(
                overrides.and_then(|o| o.required_keywords.as_ref()),
                &self.required_keywords,
            ),
            must_contain: pick(
                overrides.and_then(|o| o.must_contain.as_ref()),
                &self.must_contain,
            ),
            preferred_keywords: pick(
                overrides.and_then(|o| o.preferred_keywords.as_ref()),
                &self.preferred_keywords,
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigBundle {
    pub browser: BrowserConfig,
    pub catalog: CatalogConfig,
}

impl ConfigBundle {
    pub fn from_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let browser = load_browser_config(dir.join("browser.toml"))?;
        let catalog = load_catalog_config(dir.join("catalog.toml"))?;
        Ok(Self { browser, catalog })
    }
}

pub fn load_browser_config<P: AsRef<Path>>(path: P) -> Result<BrowserConfig> {
    load_toml(path)
}

pub fn load_catalog_config<P: AsRef<Path>>(path: P) -> Result<CatalogConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
