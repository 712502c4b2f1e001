//! `/generate` query parsing and validation

use crate::{ImageFormat, RenderOptions, Viewport};
use std::collections::HashMap;
use thiserror::Error;

/// Rejections for a `/generate` request. `Display` is the exact 400 body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("HTML content is required")]
    MissingHtml,

    #[error("Width must be a positive number")]
    InvalidWidth,

    #[error("Height must be a positive number")]
    InvalidHeight,

    #[error("Width must not exceed {0} pixels")]
    WidthTooLarge(u32),

    #[error("Height must not exceed {0} pixels")]
    HeightTooLarge(u32),

    #[error("Format must be one of png, jpeg, webp")]
    UnsupportedFormat,
}

/// A validated render request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub html: String,
    pub options: RenderOptions,
}

/// Decode `query` (the part after `?`) into a map. Later duplicates win.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

impl RenderRequest {
    /// Validate decoded parameters. Empty values are treated as absent.
    pub fn from_params(params: &HashMap<String, String>, max_dimension: u32) -> Result<Self, QueryError> {
        let param = |name: &str| params.get(name).map(String::as_str).filter(|v| !v.is_empty());

        let defaults = Viewport::default();
        let width = match param("width") {
            Some(raw) => parse_dimension(raw).ok_or(QueryError::InvalidWidth)?,
            None => defaults.width,
        };
        if width > max_dimension {
            return Err(QueryError::WidthTooLarge(max_dimension));
        }

        let height = match param("height") {
            Some(raw) => parse_dimension(raw).ok_or(QueryError::InvalidHeight)?,
            None => defaults.height,
        };
        if height > max_dimension {
            return Err(QueryError::HeightTooLarge(max_dimension));
        }

        let html = param("html").ok_or(QueryError::MissingHtml)?;

        let format = match param("format") {
            Some(raw) => raw.parse::<ImageFormat>().map_err(|_| QueryError::UnsupportedFormat)?,
            None => ImageFormat::default(),
        };

        Ok(Self {
            html: html.to_string(),
            options: RenderOptions {
                viewport: Viewport { width, height },
                format,
            },
        })
    }
}

/// Accepts what a browser's `Number()` would: finite decimals (truncated
/// toward zero) and `0x`/`0o`/`0b` integer literals. The result must be at
/// least one pixel.
fn parse_dimension(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    let value = match radix_literal(raw) {
        Some((radix, digits)) => u64::from_str_radix(digits, radix).ok()? as f64,
        None => raw.parse::<f64>().ok()?,
    };
    if !value.is_finite() || value < 1.0 {
        return None;
    }
    Some(value.min(u32::MAX as f64) as u32)
}

fn radix_literal(raw: &str) -> Option<(u32, &str)> {
    let prefix = raw.get(..2)?;
    let digits = raw.get(2..)?;
    let radix = match prefix {
        "0x" | "0X" => 16,
        "0o" | "0O" => 8,
        "0b" | "0B" => 2,
        _ => return None,
    };
    // `from_str_radix` would otherwise accept a sign
    digits.bytes().all(|b| b.is_ascii_alphanumeric()).then_some((radix, digits))
}
