//! Chrome DevTools Protocol renderer
//!
//! Every call to [`CdpRenderer::render`] launches its own headless Chrome,
//! loads the page shell from a per-call temporary file, waits for the page to
//! settle, captures the full page and tears everything down again. Nothing is
//! shared between calls.

use crate::document::TempDocument;
use crate::wait::poll_until;
use crate::{Error, ImageFormat, RenderOptions, Renderer, RendererConfig, Result, Viewport};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::types::Bounds;
use headless_chrome::{Browser, LaunchOptions};
use log::debug;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Resolves to -1 while the document is still loading, otherwise the number of
// resources fetched so far.
const RESOURCE_COUNT_SCRIPT: &str = r#"
(function() {
    if (document.readyState !== 'complete') return -1;
    return performance.getEntriesByType('resource').length;
})()
"#;

// First element in document order has a computed display other than none.
const FIRST_ELEMENT_VISIBLE_SCRIPT: &str = r#"
(function() {
    const el = document.querySelector('*');
    return !!el && window.getComputedStyle(el).display !== 'none';
})()
"#;

const CONTENT_SIZE_SCRIPT: &str = r#"
(function() {
    const doc = document.documentElement;
    const body = document.body;
    const w = Math.max(doc.scrollWidth, body ? body.scrollWidth : 0);
    const h = Math.max(doc.scrollHeight, body ? body.scrollHeight : 0);
    return JSON.stringify([Math.ceil(w), Math.ceil(h)]);
})()
"#;

/// CDP-based renderer (uses the `headless_chrome` crate)
pub struct CdpRenderer {
    config: RendererConfig,
}

impl CdpRenderer {
    pub fn new(config: RendererConfig) -> Result<Self> {
        if config.poll_interval_ms == 0 {
            return Err(Error::ConfigError("poll interval must be greater than zero".into()));
        }
        if config.readiness_timeout_ms == 0 || config.navigation_timeout_ms == 0 {
            return Err(Error::ConfigError("timeouts must be greater than zero".into()));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    fn launch(&self, viewport: Viewport) -> Result<(Browser, Arc<Tab>)> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(self.config.sandbox)
            .path(self.config.chrome_path.clone())
            .window_size(Some((viewport.width, viewport.height)))
            .idle_browser_timeout(Duration::from_millis(
                self.config.navigation_timeout_ms + self.config.readiness_timeout_ms,
            ))
            .args(vec![
                OsStr::new("--force-device-scale-factor=1"),
                OsStr::new("--hide-scrollbars"),
                OsStr::new("--allow-file-access-from-files"),
                OsStr::new("--disable-dev-shm-usage"),
            ])
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;

        tab.set_default_timeout(Duration::from_millis(self.config.navigation_timeout_ms));
        Ok((browser, tab))
    }

    fn resize(&self, tab: &Tab, width: u32, height: u32) -> Result<()> {
        tab.set_bounds(Bounds::Normal {
            left: Some(0),
            top: Some(0),
            width: Some(width as f64),
            height: Some(height as f64),
        })
        .map_err(|e| Error::RenderError(format!("Failed to set viewport to {}x{}: {}", width, height, e)))?;
        Ok(())
    }

    fn load(&self, tab: &Tab, doc: &TempDocument) -> Result<()> {
        let url = doc.file_url()?;
        debug!("Navigating to {}", url);

        tab.navigate_to(&url)
            .map_err(|e| Error::LoadError(format!("Navigation failed: {}", e)))?;
        tab.wait_until_navigated()
            .map_err(|e| Error::LoadError(format!("Wait for navigation failed: {}", e)))?;

        self.wait_for_network_idle(tab)
    }

    /// Wait until the document has loaded and no new resource finished for
    /// `network_idle_ms`.
    fn wait_for_network_idle(&self, tab: &Tab) -> Result<()> {
        let mut quiet = NetworkQuiet::new(Duration::from_millis(self.config.network_idle_ms), Instant::now());

        poll_until(
            self.poll_interval(),
            Duration::from_millis(self.config.navigation_timeout_ms),
            || {
                let count = evaluate_i64(tab, RESOURCE_COUNT_SCRIPT)?;
                Ok(quiet.observe(count, Instant::now()))
            },
        )
    }

    fn wait_until_visible(&self, tab: &Tab) -> Result<()> {
        poll_until(
            self.poll_interval(),
            Duration::from_millis(self.config.readiness_timeout_ms),
            || {
                let value = evaluate(tab, FIRST_ELEMENT_VISIBLE_SCRIPT)?;
                Ok(value.as_bool().unwrap_or(false))
            },
        )
    }

    fn capture_full_page(&self, tab: &Tab, viewport: Viewport, format: ImageFormat) -> Result<Vec<u8>> {
        let raw = evaluate(tab, CONTENT_SIZE_SCRIPT)?;
        let [content_w, content_h]: [u32; 2] = raw
            .as_str()
            .and_then(|s| serde_json::from_str(s).ok())
            .ok_or_else(|| Error::RenderError(format!("Unexpected content size: {}", raw)))?;

        if let Some((width, height)) = overflow_size(viewport, content_w, content_h) {
            debug!("Content overflows viewport, capturing {}x{}", width, height);
            self.resize(tab, width, height)?;
        }

        tab.capture_screenshot(capture_format(format), None, None, true)
            .map_err(|e| Error::RenderError(format!("Screenshot failed: {}", e)))
    }
}

impl Renderer for CdpRenderer {
    fn render(&self, html: &str, output: &Path, options: &RenderOptions) -> Result<()> {
        let viewport = options.viewport;
        debug!("Rendering {}x{} {} to {}", viewport.width, viewport.height, options.format, output.display());

        let (browser, tab) = self.launch(viewport)?;
        self.resize(&tab, viewport.width, viewport.height)?;

        let doc = TempDocument::create(self.config.temp_dir.as_deref(), html, &self.config.stylesheet_script)?;

        let result = self
            .load(&tab, &doc)
            .and_then(|_| self.wait_until_visible(&tab))
            .and_then(|_| self.capture_full_page(&tab, viewport, options.format))
            .and_then(|bytes| {
                std::fs::write(output, &bytes)?;
                debug!("Wrote {} bytes to {}", bytes.len(), output.display());
                Ok(())
            });

        // Browser goes first so Chrome is not holding the document open.
        drop(tab);
        drop(browser);
        drop(doc);

        result
    }
}

/// Network-quiet detector fed with the page's resource count on every poll.
///
/// A negative count means the document is still loading. The network is
/// quiet once a non-negative count has been seen unchanged for `idle`.
#[derive(Debug)]
struct NetworkQuiet {
    idle: Duration,
    last_count: Option<i64>,
    stable_since: Instant,
}

impl NetworkQuiet {
    fn new(idle: Duration, now: Instant) -> Self {
        Self {
            idle,
            last_count: None,
            stable_since: now,
        }
    }

    fn observe(&mut self, count: i64, now: Instant) -> bool {
        if count < 0 || self.last_count != Some(count) {
            self.last_count = Some(count);
            self.stable_since = now;
            return false;
        }
        now.duration_since(self.stable_since) >= self.idle
    }
}

/// Window size for a full-page capture, or `None` when the content fits the
/// viewport. The viewport is the minimum in both directions.
fn overflow_size(viewport: Viewport, content_w: u32, content_h: u32) -> Option<(u32, u32)> {
    let width = content_w.max(viewport.width);
    let height = content_h.max(viewport.height);
    (width != viewport.width || height != viewport.height).then_some((width, height))
}

fn capture_format(format: ImageFormat) -> Page::CaptureScreenshotFormatOption {
    match format {
        ImageFormat::Png => Page::CaptureScreenshotFormatOption::Png,
        ImageFormat::Jpeg => Page::CaptureScreenshotFormatOption::Jpeg,
        ImageFormat::Webp => Page::CaptureScreenshotFormatOption::Webp,
    }
}

fn evaluate(tab: &Tab, script: &str) -> Result<serde_json::Value> {
    let result = tab
        .evaluate(script, false)
        .map_err(|e| Error::RenderError(format!("Evaluation failed: {}", e)))?;

    result
        .value
        .ok_or_else(|| Error::RenderError("No value returned from evaluation".into()))
}

fn evaluate_i64(tab: &Tab, script: &str) -> Result<i64> {
    let value = evaluate(tab, script)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .ok_or_else(|| Error::RenderError(format!("Expected a number, got {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_poll_interval() {
        let config = RendererConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(CdpRenderer::new(config), Err(Error::ConfigError(_))));
    }

    #[test]
    fn maps_every_format() {
        assert!(matches!(capture_format(ImageFormat::Png), Page::CaptureScreenshotFormatOption::Png));
        assert!(matches!(capture_format(ImageFormat::Jpeg), Page::CaptureScreenshotFormatOption::Jpeg));
        assert!(matches!(capture_format(ImageFormat::Webp), Page::CaptureScreenshotFormatOption::Webp));
    }

    #[test]
    fn network_quiet_needs_a_stable_count() {
        let start = Instant::now();
        let ms = |n| start + Duration::from_millis(n);
        let mut quiet = NetworkQuiet::new(Duration::from_millis(500), start);

        // still loading
        assert!(!quiet.observe(-1, ms(0)));
        assert!(!quiet.observe(-1, ms(600)));
        // first complete reading starts the window
        assert!(!quiet.observe(3, ms(700)));
        assert!(!quiet.observe(3, ms(1100)));
        assert!(quiet.observe(3, ms(1200)));
    }

    #[test]
    fn network_quiet_restarts_on_new_resources() {
        let start = Instant::now();
        let ms = |n| start + Duration::from_millis(n);
        let mut quiet = NetworkQuiet::new(Duration::from_millis(500), start);

        assert!(!quiet.observe(1, ms(0)));
        assert!(!quiet.observe(2, ms(400)));
        assert!(!quiet.observe(2, ms(800)));
        assert!(quiet.observe(2, ms(900)));
        // a late fetch resets the window
        assert!(!quiet.observe(4, ms(1000)));
        assert!(!quiet.observe(4, ms(1499)));
        assert!(quiet.observe(4, ms(1500)));
    }

    #[test]
    fn network_quiet_with_zero_idle_needs_two_equal_readings() {
        let start = Instant::now();
        let mut quiet = NetworkQuiet::new(Duration::ZERO, start);
        assert!(!quiet.observe(0, start));
        assert!(quiet.observe(0, start));
    }

    #[test]
    fn overflow_size_grows_only_past_viewport() {
        let viewport = Viewport { width: 400, height: 300 };
        assert_eq!(overflow_size(viewport, 400, 300), None);
        assert_eq!(overflow_size(viewport, 120, 80), None);
        assert_eq!(overflow_size(viewport, 400, 900), Some((400, 900)));
        assert_eq!(overflow_size(viewport, 250, 900), Some((400, 900)));
        assert_eq!(overflow_size(viewport, 1000, 10), Some((1000, 300)));
    }

    #[test]
    fn test_cdp_render_smoke() {
        // This test requires Chrome to be installed, so we skip it in CI
        if std::env::var("CI").is_ok() {
            return;
        }
        let renderer = CdpRenderer::new(RendererConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("smoke.png");
        match renderer.render("<h1>Hi</h1>", &out, &RenderOptions::default()) {
            Ok(()) => {}
            Err(Error::InitializationError(e)) => {
                eprintln!("Skipping CDP render smoke test because Chrome is not available: {}", e);
                return;
            }
            Err(e) => panic!("render failed after Chrome launched: {}", e),
        }
        let bytes = std::fs::read(&out).unwrap();
        assert_eq!(&bytes[0..8], b"\x89PNG\r\n\x1a\n");
    }
}
