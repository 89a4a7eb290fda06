//! Region capture: HTML subtree → layout → display list → encoded raster.

pub mod images;
pub mod layout;
pub mod paint;
pub mod raster;

use crate::{Error, ExportConfig, Result};
use image::Rgb;
use images::{EmbeddedImage, ImageStore};
use scraper::{Html, Selector};

/// Still-image encoding of a [`RasterImage`]'s data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Jpeg,
    Png,
}

/// The single tall image produced by one capture.
///
/// Captures are JPEG unless a side exceeds the JPEG limit, in which case
/// they are PNG.
///
/// `pixel_width / pixel_height` matches the aspect ratio of the captured
/// region.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub data: Vec<u8>,
    pub encoding: ImageEncoding,
}

/// An owned snapshot of a rendered visual subtree, ready to capture.
#[derive(Debug, Clone)]
pub struct Region {
    html: String,
    width: u32,
    min_height: u32,
    padding: u32,
    images: ImageStore,
}

impl Region {
    /// `html` is the outer markup of the region's root element; `width` is
    /// the CSS pixel width it is laid out in.
    pub fn new(html: impl Into<String>, width: u32) -> Self {
        Self {
            html: html.into(),
            width,
            min_height: 0,
            padding: 0,
            images: ImageStore::new(),
        }
    }

    pub fn with_min_height(mut self, min_height: u32) -> Self {
        self.min_height = min_height;
        self
    }

    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_images(mut self, images: ImageStore) -> Self {
        self.images = images;
        self
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn min_height(&self) -> u32 {
        self.min_height
    }

    pub fn padding(&self) -> u32 {
        self.padding
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }
}

/// The on-screen report: a full HTML document plus the selector of the
/// element that gets exported.
#[derive(Debug, Clone)]
pub struct ReportPage {
    html: String,
    selector: String,
}

impl ReportPage {
    pub fn new(html: impl Into<String>, selector: impl Into<String>) -> Result<Self> {
        let selector = selector.into();
        Selector::parse(&selector)
            .map_err(|e| Error::ConfigError(format!("invalid region selector '{}': {:?}", selector, e)))?;
        Ok(Self {
            html: html.into(),
            selector,
        })
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Distinct non-inline `<img>` sources inside the region, in document
    /// order
    pub fn image_sources(&self) -> Vec<String> {
        let document = Html::parse_document(&self.html);
        let (Ok(region_sel), Ok(img_sel)) = (Selector::parse(&self.selector), Selector::parse("img[src]")) else {
            return Vec::new();
        };
        let mut sources: Vec<String> = Vec::new();
        for region in document.select(&region_sel).take(1) {
            for img in region.select(&img_sel) {
                let Some(src) = img.value().attr("src").map(str::trim) else { continue };
                if src.is_empty() || src.starts_with("data:") || sources.iter().any(|s| s == src) {
                    continue;
                }
                sources.push(src.to_string());
            }
        }
        sources
    }

    /// Snapshot the export region, or `None` when nothing matches the
    /// selector.
    pub fn region(&self, config: &ExportConfig, images: &[EmbeddedImage]) -> Result<Option<Region>> {
        let document = Html::parse_document(&self.html);
        let selector = Selector::parse(&self.selector)
            .map_err(|e| Error::ConfigError(format!("invalid region selector '{}': {:?}", self.selector, e)))?;
        let Some(element) = document.select(&selector).next() else {
            return Ok(None);
        };

        let store = ImageStore::from_embedded(images)?;
        Ok(Some(
            Region::new(element.html(), config.viewport.width)
                .with_min_height(config.viewport.height)
                .with_padding(config.padding)
                .with_images(store),
        ))
    }
}

/// Captures a region into a single raster image.
pub trait Rasterizer: Send + Sync {
    /// Produce an image whose pixel size is the region's layout size times
    /// `scale`.
    fn capture(&self, region: &Region, scale: u32) -> Result<RasterImage>;
}

/// Rasterizer backed by the built-in block/table layout.
#[derive(Debug, Clone)]
pub struct HtmlRasterizer {
    background: Rgb<u8>,
    jpeg_quality: u8,
}

impl HtmlRasterizer {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            background: Rgb(config.background),
            jpeg_quality: config.jpeg_quality,
        }
    }
}

impl Default for HtmlRasterizer {
    fn default() -> Self {
        Self::new(&ExportConfig::default())
    }
}

impl Rasterizer for HtmlRasterizer {
    fn capture(&self, region: &Region, scale: u32) -> Result<RasterImage> {
        if scale == 0 {
            return Err(Error::ConfigError("capture scale must be at least 1".into()));
        }

        let tree = layout::layout_region(region)?;
        let commands = paint::build_display_list(&tree, self.background);
        let canvas = raster::rasterize(&commands, tree.width, tree.height, scale)?;
        let (pixel_width, pixel_height) = canvas.dimensions();
        let encoding = if pixel_width.max(pixel_height) > raster::JPEG_MAX_DIMENSION {
            ImageEncoding::Png
        } else {
            ImageEncoding::Jpeg
        };
        let data = match encoding {
            ImageEncoding::Jpeg => raster::encode_jpeg(canvas, self.jpeg_quality)?,
            ImageEncoding::Png => raster::encode_png(canvas)?,
        };

        log::debug!(
            "captured region {}x{}px at scale {} ({:?}, {} bytes)",
            tree.width,
            tree.height,
            scale,
            encoding,
            data.len()
        );

        Ok(RasterImage {
            pixel_width,
            pixel_height,
            data,
            encoding,
        })
    }
}
