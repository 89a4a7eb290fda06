//! RFox Report Export
//!
//! Captures a rendered HTML report region into one tall raster image, slices
//! it onto fixed-size pages and writes the result as a multi-page PDF made of
//! raster page images.
//!
//! # Pipeline
//!
//! - **Rasterizer** ([`rendering`]): region → layout → display list → JPEG
//! - **Paginator** ([`pagination`]): raster size + page format → placements
//! - **Assembler** ([`assembly`]): placements → PDF bytes → [`DocumentSink`]
//! - **Preview** ([`preview`]): UI state and the re-entrancy gated export task
//!
//! # Example
//!
//! ```no_run
//! use rfexport::{DirectorySink, ExportConfig, ExportOutcome, Preview, ReportPage};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let html = std::fs::read_to_string("report.html")?;
//! let page = ReportPage::new(html, "#report")?;
//! let preview = Preview::new(page, ExportConfig::default(), Arc::new(DirectorySink::new(".")))?;
//!
//! preview.open();
//! if let ExportOutcome::Saved { path, .. } = preview.export().await {
//!     println!("wrote {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod assembly;
pub mod error;
pub mod pagination;
pub mod preview;
pub mod rendering;

// Remote image preloading (reqwest-backed)
#[cfg(feature = "fetch")]
pub mod preload;

pub use assembly::{Assembler, DirectorySink, Document, DocumentSink, MemorySink};
pub use error::{Error, Result};
pub use pagination::{paginate, Orientation, PageFormat, PagePlacement, Pagination};
pub use preview::{ExportOutcome, Preview, PreviewState, Transition};
pub use rendering::images::{EmbeddedImage, ImageStore};
pub use rendering::{HtmlRasterizer, RasterImage, Rasterizer, Region, ReportPage};

/// Configuration for an export
///
/// Defaults mirror an A4 sheet laid out at 96 dpi and captured at twice that
/// resolution:
/// - `viewport` is 794 x 1123 CSS px; the height is the region's minimum
/// - `scale` is 2
/// - output is `report.pdf`, JPEG quality 100, white background
///
/// Every field may be omitted from a JSON config file.
///
/// # Examples
///
/// ```
/// let cfg = rfexport::ExportConfig::default();
/// assert_eq!(cfg.file_name, "report.pdf");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Upscale factor applied during capture
    pub scale: u32,
    /// Layout viewport; `height` is the minimum region height
    pub viewport: Viewport,
    /// Inner padding of the captured region in CSS px
    pub padding: u32,
    /// Region background colour
    pub background: [u8; 3],
    /// JPEG quality (1-100) of the captured image
    pub jpeg_quality: u8,
    /// Output page format
    pub page_format: PageFormat,
    /// Name the finished document is saved under
    pub file_name: String,
    /// Optional bound on the capture wait. `None` waits indefinitely.
    pub capture_timeout_ms: Option<u64>,
    /// User agent sent when preloading images
    pub user_agent: String,
    /// Per-request timeout when preloading images
    pub fetch_timeout_ms: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            scale: 2,
            viewport: Viewport::default(),
            padding: 19,
            background: [255, 255, 255],
            jpeg_quality: 100,
            page_format: PageFormat::A4,
            file_name: "report.pdf".to_string(),
            capture_timeout_ms: None,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/115.0 RFOX/0.3".to_string(),
            fetch_timeout_ms: 30000,
        }
    }
}

impl ExportConfig {
    /// Parse a JSON config; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scale == 0 {
            return Err(Error::ConfigError("scale must be at least 1".into()));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::ConfigError("viewport must have positive dimensions".into()));
        }
        if self.padding.saturating_mul(2) >= self.viewport.width {
            return Err(Error::ConfigError("padding leaves no room for content".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::ConfigError(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.file_name.trim().is_empty() || self.file_name.contains(['/', '\\']) {
            return Err(Error::ConfigError(format!("invalid file name '{}'", self.file_name)));
        }
        if self.capture_timeout_ms == Some(0) {
            return Err(Error::ConfigError("capture_timeout_ms must be positive".into()));
        }
        self.page_format.validate()
    }
}

/// Viewport dimensions in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    /// A4 at 96 dpi
    fn default() -> Self {
        Self {
            width: 794,
            height: 1123,
        }
    }
}
