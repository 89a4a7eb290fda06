//! PDF assembly and persistence.
//!
//! The captured image is embedded once as an image XObject and drawn on every
//! page at that page's placement. JPEG captures pass through as `DctDecode`;
//! PNG captures are stored as zlib-compressed RGB (`FlateDecode`). The whole document is serialized in memory
//! before anything reaches a [`DocumentSink`].

use crate::pagination::{paginate, PageFormat, PagePlacement, Pagination};
use crate::rendering::{ImageEncoding, RasterImage};
use crate::{Error, Result};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::io::Reader as ImageReader;
use image::ImageFormat;
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref, TextStr};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// PostScript points per millimetre
pub const PT_PER_MM: f64 = 72.0 / 25.4;

const IMAGE_NAME: Name<'static> = Name(b"Im0");
const PRODUCER: &str = concat!("rfexport ", env!("CARGO_PKG_VERSION"));

pub fn mm_to_pt(mm: f64) -> f32 {
    (mm * PT_PER_MM) as f32
}

/// A finished, serialized document
#[derive(Debug, Clone)]
pub struct Document {
    format: PageFormat,
    placements: Vec<PagePlacement>,
    bytes: Vec<u8>,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.placements.len()
    }

    pub fn placements(&self) -> &[PagePlacement] {
        &self.placements
    }

    pub fn format(&self) -> &PageFormat {
        &self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Hand the serialized document to `sink` under `file_name`
    pub fn save(&self, sink: &dyn DocumentSink, file_name: &str) -> Result<PathBuf> {
        let path = sink.save(file_name, &self.bytes)?;
        log::info!("saved {} page document to {}", self.page_count(), path.display());
        Ok(path)
    }
}

/// Paginates a capture and assembles it into a [`Document`]
#[derive(Debug, Clone)]
pub struct Assembler {
    format: PageFormat,
}

impl Assembler {
    pub fn new(format: PageFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> &PageFormat {
        &self.format
    }

    pub fn assemble(&self, image: &RasterImage) -> Result<Document> {
        let pagination = paginate(image.pixel_width, image.pixel_height, &self.format)?;
        assemble(image, &pagination, &self.format)
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(PageFormat::A4)
    }
}

/// Build the PDF for `image` drawn once per placement, in order.
pub fn assemble(image: &RasterImage, pagination: &Pagination, format: &PageFormat) -> Result<Document> {
    format.validate()?;
    if pagination.placements.is_empty() {
        return Err(Error::AssemblyError("no pages to assemble".into()));
    }
    let (payload, filter) = image_payload(image)?;

    let catalog_id = Ref::new(1);
    let page_tree_id = Ref::new(2);
    let image_id = Ref::new(3);
    let info_id = Ref::new(4);
    let mut next_ref = 5;

    let mut pdf = Pdf::new();
    pdf.catalog(catalog_id).pages(page_tree_id);
    pdf.document_info(info_id).producer(TextStr(PRODUCER));

    {
        let mut xobject = pdf.image_xobject(image_id, &payload);
        xobject.filter(filter);
        xobject.width(image.pixel_width as i32);
        xobject.height(image.pixel_height as i32);
        xobject.color_space().device_rgb();
        xobject.bits_per_component(8);
    }

    let page_w = mm_to_pt(format.width);
    let page_h = mm_to_pt(format.height);
    let mut page_ids = Vec::with_capacity(pagination.placements.len());

    for (index, placement) in pagination.placements.iter().enumerate() {
        let content = draw_placement(placement, format).map_err(|e| {
            Error::AssemblyError(format!("page {}: {}", index + 1, e))
        })?;

        let page_id = Ref::new(next_ref);
        let content_id = Ref::new(next_ref + 1);
        next_ref += 2;

        pdf.stream(content_id, &content);

        let mut page = pdf.page(page_id);
        page.media_box(Rect::new(0.0, 0.0, page_w, page_h));
        page.parent(page_tree_id);
        page.contents(content_id);
        page.resources().x_objects().pair(IMAGE_NAME, image_id);
        page.finish();

        page_ids.push(page_id);
    }

    let count = page_ids.len() as i32;
    pdf.pages(page_tree_id).kids(page_ids).count(count);

    let bytes = pdf.finish();
    log::debug!(
        "assembled {} page(s), {} bytes",
        pagination.placements.len(),
        bytes.len()
    );

    Ok(Document {
        format: *format,
        placements: pagination.placements.clone(),
        bytes,
    })
}

/// Image matrix for one placement.
///
/// Placements use a top-left origin in millimetres; PDF user space has a
/// bottom-left origin in points.
pub fn placement_matrix(placement: &PagePlacement, format: &PageFormat) -> [f32; 6] {
    let bottom = format.height - (placement.source_y_offset + placement.render_height);
    [
        mm_to_pt(placement.render_width),
        0.0,
        0.0,
        mm_to_pt(placement.render_height),
        0.0,
        mm_to_pt(bottom),
    ]
}

/// Content stream drawing the shared image at one placement
fn draw_placement(placement: &PagePlacement, format: &PageFormat) -> std::result::Result<Vec<u8>, String> {
    let PagePlacement {
        source_y_offset,
        render_width,
        render_height,
    } = *placement;
    if ![source_y_offset, render_width, render_height].iter().all(|v| v.is_finite())
        || render_width <= 0.0
        || render_height <= 0.0
    {
        return Err(format!("invalid placement {:?}", placement));
    }

    let mut content = Content::new();
    content.save_state();
    content.transform(placement_matrix(placement, format));
    content.x_object(IMAGE_NAME);
    content.restore_state();
    Ok(content.finish())
}

/// The capture's XObject stream and its filter
fn image_payload(image: &RasterImage) -> Result<(Vec<u8>, Filter)> {
    let reader = ImageReader::new(Cursor::new(&image.data))
        .with_guessed_format()
        .map_err(|e| Error::AssemblyError(format!("unreadable capture: {}", e)))?;
    let detected = reader.format();

    let (data, filter, (w, h)) = match (image.encoding, detected) {
        (ImageEncoding::Jpeg, Some(ImageFormat::Jpeg)) => {
            let dims = reader
                .into_dimensions()
                .map_err(|e| Error::AssemblyError(format!("invalid JPEG capture: {}", e)))?;
            (image.data.clone(), Filter::DctDecode, dims)
        }
        (ImageEncoding::Png, Some(ImageFormat::Png)) => {
            let rgb = reader
                .decode()
                .map_err(|e| Error::AssemblyError(format!("invalid PNG capture: {}", e)))?
                .to_rgb8();
            let dims = rgb.dimensions();
            (deflate(rgb.as_raw())?, Filter::FlateDecode, dims)
        }
        (declared, found) => {
            return Err(Error::AssemblyError(format!(
                "capture declared as {:?} but data is {:?}",
                declared, found
            )))
        }
    };

    if (w, h) != (image.pixel_width, image.pixel_height) {
        return Err(Error::AssemblyError(format!(
            "capture is {}x{} but declares {}x{}",
            w, h, image.pixel_width, image.pixel_height
        )));
    }
    Ok((data, filter))
}

fn deflate(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(raw)
        .and_then(|_| encoder.finish())
        .map_err(|e| Error::AssemblyError(format!("failed to compress capture: {}", e)))
}

/// Destination for finished documents
pub trait DocumentSink: Send + Sync {
    /// Persist `bytes` under `file_name`, returning where they ended up
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Writes documents into a directory.
///
/// Bytes go to a hidden temporary file first and are renamed into place, so
/// `file_name` only ever holds a complete document.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DocumentSink for DirectorySink {
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        if file_name.is_empty() || file_name.contains(['/', '\\']) {
            return Err(Error::SaveError(format!("invalid file name '{}'", file_name)));
        }
        std::fs::create_dir_all(&self.dir)?;

        let target = self.dir.join(file_name);
        let partial = self.dir.join(format!(".{}.part", file_name));
        std::fs::write(&partial, bytes)
            .map_err(|e| Error::SaveError(format!("failed to write {}: {}", partial.display(), e)))?;
        if let Err(e) = std::fs::rename(&partial, &target) {
            let _ = std::fs::remove_file(&partial);
            return Err(Error::SaveError(format!("failed to move into {}: {}", target.display(), e)));
        }
        Ok(target)
    }
}

/// Keeps saved documents in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    saved: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saved `(file_name, bytes)` pairs in save order
    pub fn saved(&self) -> Vec<(String, Vec<u8>)> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn save_count(&self) -> usize {
        self.saved.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl DocumentSink for MemorySink {
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| Error::SaveError("memory sink poisoned".into()))?;
        saved.push((file_name.to_string(), bytes.to_vec()));
        Ok(PathBuf::from(file_name))
    }
}
