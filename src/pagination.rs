//! Page slicing for a single tall raster image.
//!
//! The captured region is scaled to the full page width and redrawn on every
//! page, shifted upward by one page height per page. Each page therefore
//! reveals the next `page_height`-tall band of the source image.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Page orientation. Only portrait output is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
}

/// Physical page size in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageFormat {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub orientation: Orientation,
}

impl PageFormat {
    /// ISO 216 A4, portrait
    pub const A4: PageFormat = PageFormat {
        width: 210.0,
        height: 297.0,
        orientation: Orientation::Portrait,
    };

    pub fn validate(&self) -> Result<()> {
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(Error::ConfigError(format!(
                "page width must be positive, got {}",
                self.width
            )));
        }
        if !(self.height.is_finite() && self.height > 0.0) {
            return Err(Error::ConfigError(format!(
                "page height must be positive, got {}",
                self.height
            )));
        }
        Ok(())
    }
}

impl Default for PageFormat {
    fn default() -> Self {
        Self::A4
    }
}

/// Where the shared image is drawn on one output page.
///
/// `source_y_offset` is the top edge of the image relative to the top of the
/// page, in millimetres. It is `0` for the first page and negative afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PagePlacement {
    pub source_y_offset: f64,
    pub render_width: f64,
    pub render_height: f64,
}

/// Ordered page placements for one export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    /// Drawn image width (equals the page width)
    pub render_width: f64,
    /// Drawn image height, aspect-preserving
    pub render_height: f64,
    pub page_height: f64,
    pub placements: Vec<PagePlacement>,
}

impl Pagination {
    pub fn page_count(&self) -> usize {
        self.placements.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PagePlacement> {
        self.placements.iter()
    }
}

impl<'a> IntoIterator for &'a Pagination {
    type Item = &'a PagePlacement;
    type IntoIter = std::slice::Iter<'a, PagePlacement>;

    fn into_iter(self) -> Self::IntoIter {
        self.placements.iter()
    }
}

/// Slice a raster of `pixel_width` x `pixel_height` onto pages of `format`.
///
/// The image is scaled to fill the page width; its rendered height keeps the
/// source aspect ratio.
pub fn paginate(pixel_width: u32, pixel_height: u32, format: &PageFormat) -> Result<Pagination> {
    if pixel_width == 0 || pixel_height == 0 {
        return Err(Error::ConfigError(format!(
            "raster must have positive dimensions, got {}x{}",
            pixel_width, pixel_height
        )));
    }
    format.validate()?;

    let render_width = format.width;
    let render_height = format.width * f64::from(pixel_height) / f64::from(pixel_width);
    paginate_extent(render_width, render_height, format.height)
}

/// Slice an image already scaled to `render_width` x `render_height` (mm) onto
/// pages `page_height` mm tall.
///
/// Pages are emitted while the unplaced height is `>= 0`, so a render height
/// that is an exact multiple of the page height yields one trailing page past
/// the end of the content.
pub fn paginate_extent(render_width: f64, render_height: f64, page_height: f64) -> Result<Pagination> {
    if !(page_height.is_finite() && page_height > 0.0) {
        return Err(Error::ConfigError(format!(
            "page height must be positive, got {}",
            page_height
        )));
    }
    if !(render_height.is_finite() && render_height > 0.0) || !(render_width.is_finite() && render_width > 0.0) {
        return Err(Error::ConfigError(format!(
            "render size must be positive, got {}x{}",
            render_width, render_height
        )));
    }

    let placement = |source_y_offset: f64| PagePlacement {
        source_y_offset,
        render_width,
        render_height,
    };

    let mut placements = vec![placement(0.0)];
    let mut remaining = render_height - page_height;

    while remaining >= 0.0 {
        placements.push(placement(remaining - render_height));
        remaining -= page_height;
    }

    log::debug!(
        "paginated {:.2}x{:.2}mm image onto {} page(s) of height {:.2}mm",
        render_width,
        render_height,
        placements.len(),
        page_height
    );

    Ok(Pagination {
        render_width,
        render_height,
        page_height,
        placements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets(p: &Pagination) -> Vec<f64> {
        p.iter().map(|pl| pl.source_y_offset).collect()
    }

    #[test]
    fn short_content_fits_one_page() {
        let p = paginate_extent(210.0, 100.0, 297.0).unwrap();
        assert_eq!(p.page_count(), 1);
        assert_eq!(offsets(&p), vec![0.0]);
    }

    #[test]
    fn exact_page_height_emits_trailing_page() {
        let p = paginate_extent(210.0, 297.0, 297.0).unwrap();
        assert_eq!(p.page_count(), 2);
        assert_eq!(offsets(&p), vec![0.0, -297.0]);
    }

    #[test]
    fn tall_content_spans_three_pages() {
        let p = paginate_extent(210.0, 600.0, 297.0).unwrap();
        assert_eq!(offsets(&p), vec![0.0, -297.0, -594.0]);
        for pl in &p {
            assert_eq!(pl.render_width, 210.0);
            assert_eq!(pl.render_height, 600.0);
        }
    }

    #[test]
    fn pixel_aspect_scales_to_page_width() {
        // 2:3 raster on A4 → 315mm tall
        let p = paginate(400, 600, &PageFormat::A4).unwrap();
        assert_eq!(p.render_width, 210.0);
        assert_eq!(p.render_height, 315.0);
        assert_eq!(p.page_count(), 2);
    }

    #[test]
    fn pixel_dimensions_matching_a4_are_an_exact_multiple() {
        let p = paginate(210, 297, &PageFormat::A4).unwrap();
        assert_eq!(p.render_height, 297.0);
        assert_eq!(p.page_count(), 2);
    }

    #[test]
    fn rejects_degenerate_inputs() {
        assert!(paginate(0, 10, &PageFormat::A4).is_err());
        assert!(paginate(10, 0, &PageFormat::A4).is_err());
        assert!(paginate_extent(210.0, 100.0, 0.0).is_err());
        assert!(paginate_extent(210.0, f64::NAN, 297.0).is_err());
        let bad = PageFormat { width: -1.0, ..PageFormat::A4 };
        assert!(paginate(10, 10, &bad).is_err());
    }
}
