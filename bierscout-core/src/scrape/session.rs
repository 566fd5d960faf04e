use std::sync::{Arc, Mutex};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::{seq::SliceRandom, Rng};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;

use super::error::{ScrapeError, ScrapeResult};
use super::metrics::SessionMetrics;
use super::profile::{ProfileManager, SessionProfile};
use super::stealth::StealthScripts;

#[derive(Debug, Clone)]
pub struct ViewportSpec {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

#[derive(Debug, Clone, Default)]
pub struct LaunchOverrides {
    pub headless: Option<bool>,
}

/// Builds and launches store sessions. One launcher serves the whole run;
/// every launch draws a fresh profile, viewport and user agent.
#[derive(Debug, Clone)]
pub struct SessionLauncher {
    config: Arc<BrowserConfig>,
    profiles: ProfileManager,
    stealth: Arc<StealthScripts>,
}

impl SessionLauncher {
    pub fn new(config: BrowserConfig) -> ScrapeResult<Self> {
        let profiles = ProfileManager::from_config(&config.profiles)?;
        let stealth = Arc::new(StealthScripts::new(config.stealth.clone()));
        Ok(Self {
            config: Arc::new(config),
            profiles,
            stealth,
        })
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    pub async fn launch(&self) -> ScrapeResult<StoreSession> {
        self.launch_with_overrides(LaunchOverrides::default()).await
    }

    /// Launches a browser with anti-automation flags and a realistic
    /// fingerprint. Launch failure is fatal to the store's run.
    pub async fn launch_with_overrides(
        &self,
        overrides: LaunchOverrides,
    ) -> ScrapeResult<StoreSession> {
        self.profiles.cleanup_expired()?;
        let profile = self.profiles.allocate()?;
        let viewport = self.select_viewport();
        let user_agent = self.select_user_agent();
        let headless = overrides.headless.unwrap_or(self.config.chromium.headless);
        let chromium_config =
            self.build_chromium_config(&profile, &viewport, &user_agent, headless)?;
        info!(
            profile = %profile.id(),
            ua = %user_agent,
            width = viewport.width,
            height = viewport.height,
            headless,
            "launching chromium instance"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| ScrapeError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler reported error");
                }
            }
        });

        Ok(StoreSession {
            browser,
            profile,
            handler_task: Some(handler_task),
            config: Arc::clone(&self.config),
            metrics: Arc::new(Mutex::new(SessionMetrics::default())),
            viewport,
            user_agent,
            stealth: Arc::clone(&self.stealth),
        })
    }

    fn select_viewport(&self) -> ViewportSpec {
        let section = &self.config.viewport;
        let mut rng = rand::thread_rng();
        let base = section
            .resolutions
            .choose(&mut rng)
            .cloned()
            .unwrap_or([1366, 768]);
        let jitter = section.jitter_pixels as i32;
        let width = (base[0] as i32 + rng.gen_range(-jitter..=jitter)).clamp(640, 2560) as u32;
        let height = (base[1] as i32 + rng.gen_range(-jitter..=jitter)).clamp(480, 1600) as u32;
        let scale =
            rng.gen_range(section.device_scale_factor[0]..=section.device_scale_factor[1]) as f64;
        ViewportSpec {
            width,
            height,
            device_scale_factor: scale,
        }
    }

    fn select_user_agent(&self) -> String {
        let mut rng = rand::thread_rng();
        if self.config.user_agents.pool.is_empty() {
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_4) AppleWebKit/605.1.15 (KHTML, like Gecko)"
                .to_string()
        } else {
            self.config
                .user_agents
                .pool
                .choose(&mut rng)
                .cloned()
                .unwrap_or_else(|| self.config.user_agents.pool[0].clone())
        }
    }

    fn build_chromium_config(
        &self,
        profile: &SessionProfile,
        viewport: &ViewportSpec,
        user_agent: &str,
        headless: bool,
    ) -> ScrapeResult<ChromiumConfig> {
        let mut builder = ChromiumConfig::builder()
            .chrome_executable(&self.config.chromium.executable_path)
            .user_data_dir(profile.path())
            .viewport(ChromiumViewport {
                width: viewport.width,
                height: viewport.height,
                device_scale_factor: Some(viewport.device_scale_factor),
                emulating_mobile: false,
                is_landscape: viewport.width >= viewport.height,
                has_touch: false,
            });

        if !headless {
            builder = builder.with_head();
        }
        if !self.config.chromium.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.config.chromium.tab_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec![
            format!("--user-agent={user_agent}"),
            format!("--window-size={},{}", viewport.width, viewport.height),
        ];

        if self.config.chromium.disable_gpu {
            args.push("--disable-gpu".into());
        }
        if self.config.flags.mute_audio {
            args.push("--mute-audio".into());
        }
        if let Some(lang) = &self.config.flags.lang {
            args.push(format!("--lang={lang}"));
        }
        for feature in &self.config.flags.disable_blink_features {
            args.push(format!("--disable-blink-features={feature}"));
        }
        if self.config.flags.no_first_run {
            args.push("--no-first-run".into());
        }
        if self.config.flags.disable_automation_controlled {
            args.push("--disable-features=AutomationControlled".into());
        }
        if let Some(accept) = &self.config.flags.accept_language {
            args.push(format!("--accept-lang={accept}"));
        }
        args.push("--disable-background-timer-throttling".into());
        args.push("--password-store=basic".into());

        builder = builder.args(args);

        builder.build().map_err(ScrapeError::Configuration)
    }
}

/// The live browser state for one store's run: a browser process, its
/// profile, the CDP event pump and the session counters. Never shared
/// across stores.
#[derive(Debug)]
pub struct StoreSession {
    browser: Browser,
    profile: SessionProfile,
    handler_task: Option<JoinHandle<()>>,
    config: Arc<BrowserConfig>,
    metrics: Arc<Mutex<SessionMetrics>>,
    viewport: ViewportSpec,
    user_agent: String,
    stealth: Arc<StealthScripts>,
}

impl StoreSession {
    pub fn profile(&self) -> &SessionProfile {
        &self.profile
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.metrics.lock().unwrap().clone()
    }

    pub(crate) fn metrics_handle(&self) -> Arc<Mutex<SessionMetrics>> {
        Arc::clone(&self.metrics)
    }

    pub fn viewport(&self) -> &ViewportSpec {
        &self.viewport
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// Opens a fresh browsing context with the session's fingerprint.
    pub async fn new_context(&self) -> ScrapeResult<SessionContext> {
        {
            let mut metrics = self.metrics.lock().unwrap();
            metrics.record_page_open();
        }
        let params = CreateTargetParams::new("about:blank");
        let page = self.browser.new_page(params).await?;
        self.configure_page(&page).await?;
        Ok(SessionContext {
            page,
            user_agent: self.user_agent.clone(),
        })
    }

    /// Replaces a browsing context with a fresh one carrying identical
    /// fingerprint settings. The new context is confirmed usable before the
    /// old one is discarded, so the session never ends up without an active
    /// page.
    pub async fn reset_context(&self, old: SessionContext) -> ScrapeResult<SessionContext> {
        let fresh = self.new_context().await?;
        fresh
            .page
            .evaluate("1 + 1")
            .await
            .map_err(|err| ScrapeError::Unexpected(format!("replacement context unusable: {err}")))?;
        {
            let mut metrics = self.metrics.lock().unwrap();
            metrics.record_context_reset();
        }
        if let Err(err) = old.page.close().await {
            warn!(error = %err, "failed to close previous context");
        }
        Ok(fresh)
    }

    /// Closes the browser unconditionally. Called even after failures.
    pub async fn shutdown(mut self) -> ScrapeResult<()> {
        info!(profile = %self.profile.id(), "shutting down chromium instance");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "browser handler join error");
            }
        }
        Ok(())
    }

    async fn configure_page(&self, page: &Page) -> ScrapeResult<()> {
        page.enable_stealth_mode_with_agent(&self.user_agent)
            .await?;

        let mut params_builder =
            SetUserAgentOverrideParams::builder().user_agent(self.user_agent.clone());
        if let Some(accept) = &self.config.flags.accept_language {
            params_builder = params_builder.accept_language(accept.clone());
        }
        let params = params_builder.build().map_err(ScrapeError::Configuration)?;
        page.set_user_agent(params).await?;

        if let Some(lang) = &self.config.flags.lang {
            let languages_script = format!(
                "Object.defineProperty(navigator, 'language', {{ get: () => '{lang}' }});"
            );
            page.evaluate_on_new_document(
                AddScriptToEvaluateOnNewDocumentParams::builder()
                    .source(languages_script)
                    .build()
                    .map_err(ScrapeError::Configuration)?,
            )
            .await?;
        }

        self.stealth.apply(page).await?;
        Ok(())
    }
}

impl Drop for StoreSession {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!(
                    profile = %self.profile.id(),
                    "StoreSession dropped without explicit shutdown"
                );
            }
        }
    }
}

/// An active browsing context: one page plus the fingerprint it carries.
#[derive(Debug)]
pub struct SessionContext {
    page: Page,
    user_agent: String,
}

impl SessionContext {
    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}
