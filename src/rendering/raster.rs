/// Software rasterizer for display lists

use crate::rendering::layout::{char_advance, GLYPH_HEIGHT, LINE_HEIGHT};
use crate::rendering::paint::PaintCommand;
use crate::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, ImageEncoder, Rgba, RgbaImage};

/// Baseline JPEG stores each side in 16 bits
pub const JPEG_MAX_DIMENSION: u32 = u16::MAX as u32;

/// Paint `commands` onto a `width` x `height` canvas (CSS pixels) upscaled by
/// `scale`.
pub fn rasterize(commands: &[PaintCommand], width: u32, height: u32, scale: u32) -> Result<RgbaImage> {
    let (pw, ph) = match (width.checked_mul(scale), height.checked_mul(scale)) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(Error::CaptureError(format!(
                "cannot allocate {}x{} canvas at scale {}",
                width, height, scale
            )))
        }
    };

    let mut canvas = RgbaImage::new(pw, ph);
    let s = i64::from(scale);

    for cmd in commands {
        match cmd {
            PaintCommand::SolidRect { x, y, width, height, rgba } => {
                fill_rect(&mut canvas, *x as i64 * s, *y as i64 * s, *width as i64 * s, *height as i64 * s, *rgba);
            }
            PaintCommand::StrokeRect { x, y, width, height, thickness, rgba } => {
                let (x, y, w, h, t) = (*x as i64 * s, *y as i64 * s, *width as i64 * s, *height as i64 * s, *thickness as i64 * s);
                fill_rect(&mut canvas, x, y, w, t, *rgba);
                fill_rect(&mut canvas, x, y + h - t, w, t, *rgba);
                fill_rect(&mut canvas, x, y, t, h, *rgba);
                fill_rect(&mut canvas, x + w - t, y, t, h, *rgba);
            }
            PaintCommand::Text { x, y, lines, size, rgba } => {
                let size = i64::from(*size) * s;
                for (i, line) in lines.iter().enumerate() {
                    let top = *y as i64 * s + i as i64 * i64::from(LINE_HEIGHT) * size;
                    let glyph_top = top + i64::from(LINE_HEIGHT - GLYPH_HEIGHT) / 2 * size;
                    let mut cx = *x as i64 * s;
                    for c in line.chars() {
                        let advance = i64::from(char_advance(c)) * size;
                        if !c.is_whitespace() {
                            fill_rect(
                                &mut canvas,
                                cx + size,
                                glyph_top,
                                advance - 2 * size,
                                i64::from(GLYPH_HEIGHT) * size,
                                *rgba,
                            );
                        }
                        cx += advance;
                    }
                }
            }
            PaintCommand::Image { x, y, width, height, image } => {
                let tw = (width * scale).max(1);
                let th = (height * scale).max(1);
                let resized = imageops::resize(image.as_ref(), tw, th, FilterType::Triangle);
                imageops::overlay(&mut canvas, &resized, *x as i64 * s, *y as i64 * s);
            }
        }
    }
    Ok(canvas)
}

/// Fill an axis-aligned rectangle, clipped to the canvas
fn fill_rect(canvas: &mut RgbaImage, x: i64, y: i64, w: i64, h: i64, rgba: (u8, u8, u8, u8)) {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + w).min(i64::from(canvas.width()));
    let y1 = (y + h).min(i64::from(canvas.height()));
    let px = Rgba([rgba.0, rgba.1, rgba.2, rgba.3]);
    for py in y0..y1 {
        for pxx in x0..x1 {
            canvas.put_pixel(pxx as u32, py as u32, px);
        }
    }
}

/// Flatten to RGB and encode as baseline JPEG
pub fn encode_jpeg(canvas: RgbaImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|e| Error::CaptureError(format!("JPEG encoding failed: {}", e)))?;
    Ok(out)
}

/// Flatten to RGB and encode losslessly as PNG. Used for captures past
/// [`JPEG_MAX_DIMENSION`].
pub fn encode_png(canvas: RgbaImage) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|e| Error::CaptureError(format!("PNG encoding failed: {}", e)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WHITE: (u8, u8, u8, u8) = (255, 255, 255, 255);
    const BLACK: (u8, u8, u8, u8) = (0, 0, 0, 255);

    fn background(width: u32, height: u32) -> PaintCommand {
        PaintCommand::SolidRect { x: 0, y: 0, width, height, rgba: WHITE }
    }

    #[test]
    fn canvas_is_upscaled() {
        let img = rasterize(&[background(16, 8)], 16, 8, 3).unwrap();
        assert_eq!(img.dimensions(), (48, 24));
        assert_eq!(img.get_pixel(47, 23), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn text_leaves_ink_inside_glyph_boxes() {
        let cmds = vec![
            background(32, 12),
            PaintCommand::Text { x: 0, y: 0, lines: vec!["a b".into()], size: 1, rgba: BLACK },
        ];
        let img = rasterize(&cmds, 32, 12, 2).unwrap();
        // glyph 'a' covers x in [2, 14) at scale 2
        assert_eq!(img.get_pixel(4, 10), &Rgba([0, 0, 0, 255]));
        // the space stays background
        assert_eq!(img.get_pixel(20, 10), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn stroke_rect_draws_only_the_outline() {
        let cmds = vec![
            background(20, 20),
            PaintCommand::StrokeRect { x: 0, y: 0, width: 20, height: 20, thickness: 2, rgba: BLACK },
        ];
        let img = rasterize(&cmds, 20, 20, 1).unwrap();
        assert_eq!(img.get_pixel(0, 10), &Rgba([0, 0, 0, 255]));
        assert_eq!(img.get_pixel(19, 19), &Rgba([0, 0, 0, 255]));
        assert_eq!(img.get_pixel(10, 10), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn images_are_scaled_into_place() {
        let red = Arc::new(RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255])));
        let cmds = vec![
            background(10, 10),
            PaintCommand::Image { x: 5, y: 5, width: 5, height: 5, image: red },
        ];
        let img = rasterize(&cmds, 10, 10, 2).unwrap();
        assert_eq!(img.get_pixel(15, 15), &Rgba([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(5, 5), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn out_of_bounds_drawing_is_clipped() {
        let cmds = vec![PaintCommand::SolidRect { x: -5, y: -5, width: 100, height: 100, rgba: BLACK }];
        let img = rasterize(&cmds, 4, 4, 1).unwrap();
        assert_eq!(img.get_pixel(3, 3), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn zero_sized_canvas_is_an_error() {
        assert!(rasterize(&[], 0, 10, 1).is_err());
        assert!(rasterize(&[], u32::MAX, 10, 2).is_err());
    }

    #[test]
    fn png_output_is_rgb() {
        let img = rasterize(&[background(3, 70_000)], 3, 70_000, 1).unwrap();
        let data = encode_png(img).unwrap();
        assert_eq!(&data[1..4], b"PNG");
        let decoded = image::load_from_memory(&data).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgb8);
        assert_eq!((decoded.width(), decoded.height()), (3, 70_000));
    }

    #[test]
    fn jpeg_output_has_soi_marker() {
        let img = rasterize(&[background(8, 8)], 8, 8, 1).unwrap();
        let data = encode_jpeg(img, 100).unwrap();
        assert_eq!(&data[0..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&data).unwrap();
        assert_eq!(decoded.to_rgb8().dimensions(), (8, 8));
    }
}
