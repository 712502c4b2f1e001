//! htmlshot
//!
//! Render HTML fragments to raster images by loading them in a headless
//! browser and capturing a screenshot, with a small HTTP frontend on top.
//!
//! # Features
//!
//! - **CDP Backend** (default): drives headless Chrome over the DevTools Protocol
//! - **Pluggable renderers**: the HTTP frontend only sees the [`Renderer`] trait
//! - **Bounded waits**: every readiness wait has a timeout
//!
//! # Example
//!
//! ```no_run
//! use htmlshot::{ImageFormat, RenderOptions, Renderer, RendererConfig, Viewport};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let renderer = htmlshot::new_renderer(RendererConfig::default())?;
//! let options = RenderOptions {
//!     viewport: Viewport { width: 400, height: 300 },
//!     format: ImageFormat::Jpeg,
//! };
//! renderer.render("<h1 class=\"text-3xl\">Hi</h1>", Path::new("hi.jpeg"), &options)?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

pub mod error;
pub use error::{Error, Result};

pub mod format;
pub use format::{ImageFormat, UnsupportedFormat};

pub mod document;
pub mod wait;

#[cfg(feature = "cdp")]
pub mod cdp;

pub mod server;
pub use server::{start_server, Server, ServerConfig};

/// Viewport dimensions in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

/// Per-call rendering options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub viewport: Viewport,
    pub format: ImageFormat,
}

/// Configuration shared by every render a renderer performs
///
/// The defaults load Tailwind's play CDN script and bound every wait so a page
/// that never becomes ready fails instead of hanging.
///
/// ```
/// let cfg = htmlshot::RendererConfig::default();
/// assert_eq!(cfg.poll_interval_ms, 100);
/// assert!(cfg.stylesheet_script.contains("tailwindcss"));
/// ```
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Script loaded in `<head>` of every page shell
    pub stylesheet_script: String,
    /// Upper bound for navigation plus network quiet, in milliseconds
    pub navigation_timeout_ms: u64,
    /// How long the resource count must stay unchanged to count as idle
    pub network_idle_ms: u64,
    /// Upper bound for the visibility readiness check, in milliseconds
    pub readiness_timeout_ms: u64,
    /// Interval between readiness checks, in milliseconds
    pub poll_interval_ms: u64,
    /// Run Chrome with its sandbox (disable inside containers running as root)
    pub sandbox: bool,
    /// Explicit Chrome/Chromium binary; auto-detected when `None`
    pub chrome_path: Option<PathBuf>,
    /// Directory for temporary documents; the system temp dir when `None`
    pub temp_dir: Option<PathBuf>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            stylesheet_script: "https://cdn.tailwindcss.com".to_string(),
            navigation_timeout_ms: 30000,
            network_idle_ms: 500,
            readiness_timeout_ms: 10000,
            poll_interval_ms: 100,
            sandbox: true,
            chrome_path: None,
            temp_dir: None,
        }
    }
}

/// Turns an HTML fragment into an image file
///
/// Implementations must be safe to call from many threads at once; each call
/// owns every resource it creates.
pub trait Renderer: Send + Sync {
    /// Render `html` and write the encoded image to `output`.
    fn render(&self, html: &str, output: &Path, options: &RenderOptions) -> Result<()>;
}

/// Create a renderer with the default backend
#[cfg(feature = "cdp")]
pub fn new_renderer(config: RendererConfig) -> Result<cdp::CdpRenderer> {
    cdp::CdpRenderer::new(config)
}
