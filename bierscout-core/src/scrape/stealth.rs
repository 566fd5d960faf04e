use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::Page;

use crate::config::StealthSection;

use super::error::{ScrapeError, ScrapeResult};

/// Strips automation markers from the page's scripting environment and
/// masks fingerprint surfaces before any store script runs.
#[derive(Debug, Clone)]
pub struct StealthScripts {
    config: StealthSection,
}

impl StealthScripts {
    pub fn new(config: StealthSection) -> Self {
        Self { config }
    }

    pub async fn apply(&self, page: &Page) -> ScrapeResult<()> {
        if self.config.mask_webdriver {
            self.mask_webdriver(page).await?;
        }
        if self.config.mask_plugins {
            self.mask_plugins(page).await?;
        }
        if self.config.mask_languages {
            self.mask_languages(page).await?;
        }
        if self.config.enable_canvas_noise {
            self.inject_canvas_noise(page).await?;
        }
        if self.config.webgl_vendor.is_some() || self.config.webgl_renderer.is_some() {
            self.mask_webgl(page).await?;
        }
        Ok(())
    }

    async fn mask_webdriver(&self, page: &Page) -> ScrapeResult<()> {
        let script = r#"
            (() => {
                Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
                delete window.cdc_adoQpoasnfa76pfcZLmcfl_Array;
                delete window.cdc_adoQpoasnfa76pfcZLmcfl_Promise;
                delete window.cdc_adoQpoasnfa76pfcZLmcfl_Symbol;
                window.chrome = window.chrome || { runtime: {} };
            })();
        "#;
        inject(page, script).await
    }

    async fn mask_plugins(&self, page: &Page) -> ScrapeResult<()> {
        let script = r#"
            (() => {
                const fakePlugins = [
                    { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' },
                    { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai' },
                    { name: 'Native Client', filename: 'internal-nacl-plugin' },
                ];
                Object.defineProperty(navigator, 'plugins', {
                    get: () => fakePlugins,
                });
            })();
        "#;
        inject(page, script).await
    }

    async fn mask_languages(&self, page: &Page) -> ScrapeResult<()> {
        let script = r#"
            (() => {
                Object.defineProperty(navigator, 'languages', {
                    get: () => ['nl-BE', 'nl', 'en-US'],
                });
            })();
        "#;
        inject(page, script).await
    }

    async fn inject_canvas_noise(&self, page: &Page) -> ScrapeResult<()> {
        let min = self.config.canvas_noise_range[0];
        let max = self.config.canvas_noise_range[1];
        let script = format!(
            r#"
            (() => {{
                const randomInt = (min, max) => {{
                    return Math.floor(Math.random() * (max - min + 1)) + min;
                }};
                const originalToDataURL = HTMLCanvasElement.prototype.toDataURL;
                HTMLCanvasElement.prototype.toDataURL = function() {{
                    try {{
                        const ctx = this.getContext('2d');
                        if (ctx) {{
                            const imageData = ctx.getImageData(0, 0, this.width, this.height);
                            for (let i = 0; i < imageData.data.length; i += 4) {{
                                const delta = randomInt({min}, {max});
                                imageData.data[i] = Math.min(255, Math.max(0, imageData.data[i] + delta));
                            }}
                            ctx.putImageData(imageData, 0, 0);
                        }}
                    }} catch (_) {{}}
                    return originalToDataURL.apply(this, arguments);
                }};
            }})();
            "#
        );
        inject(page, &script).await
    }

    async fn mask_webgl(&self, page: &Page) -> ScrapeResult<()> {
        let vendor = self
            .config
            .webgl_vendor
            .clone()
            .unwrap_or_else(|| "Intel Inc.".to_string());
        let renderer = self
            .config
            .webgl_renderer
            .clone()
            .unwrap_or_else(|| "Intel Iris OpenGL Engine".to_string());
        let script = format!(
            r#"
            (() => {{
                const spoofParam = (proto) => {{
                    if (!proto || !proto.getParameter) {{
                        return;
                    }}
                    const original = proto.getParameter;
                    proto.getParameter = function(param) {{
                        if (param === 37445) {{
                            return '{vendor}';
                        }}
                        if (param === 37446) {{
                            return '{renderer}';
                        }}
                        return original.apply(this, arguments);
                    }};
                }};
                spoofParam(WebGLRenderingContext?.prototype);
                spoofParam(WebGL2RenderingContext?.prototype);
            }})();
            "#
        );
        inject(page, &script).await
    }
}

async fn inject(page: &Page, source: &str) -> ScrapeResult<()> {
    page.evaluate_on_new_document(
        AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(source)
            .build()
            .map_err(ScrapeError::Configuration)?,
    )
    .await?;
    Ok(())
}
