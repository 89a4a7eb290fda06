use crate::assembly::{Assembler, DocumentSink};
use crate::pagination::PagePlacement;
use crate::rendering::images::EmbeddedImage;
use crate::rendering::{HtmlRasterizer, Rasterizer, Region, ReportPage};
use crate::{Error, ExportConfig, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Label of the export trigger while idle
pub const EXPORT_LABEL: &str = "Export PDF";
/// Label of the export trigger while an export is running
pub const GENERATING_LABEL: &str = "Generating...";

/// UI state of the report preview
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewState {
    /// Preview dialog is shown; the report region is mounted only while open
    pub open: bool,
    /// An export is in flight
    pub generating: bool,
    /// Images preloaded for the report, in request order
    pub images: Vec<EmbeddedImage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Opened,
    ImagesLoaded(Vec<EmbeddedImage>),
    ExportStarted,
    ExportFinished,
    Closed,
}

impl PreviewState {
    pub fn apply(self, transition: Transition) -> Self {
        match transition {
            Transition::Opened => Self { open: true, ..self },
            // a load finishing after close belongs to a dismissed dialog
            Transition::ImagesLoaded(images) if self.open => Self { images, ..self },
            Transition::ImagesLoaded(_) => self,
            Transition::ExportStarted => Self {
                generating: true,
                ..self
            },
            Transition::ExportFinished => Self {
                generating: false,
                ..self
            },
            // an in-flight export keeps its flag until it completes
            Transition::Closed => Self {
                open: false,
                generating: self.generating,
                images: Vec::new(),
            },
        }
    }

    pub fn can_export(&self) -> bool {
        !self.generating
    }

    pub fn export_label(&self) -> &'static str {
        if self.generating {
            GENERATING_LABEL
        } else {
            EXPORT_LABEL
        }
    }
}

/// Result of one export trigger. Failures are reported here, never as `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Saved {
        path: PathBuf,
        placements: Vec<PagePlacement>,
    },
    /// Another export was in flight; nothing was started
    AlreadyRunning,
    /// The report region is not mounted; nothing was started
    MissingRegion,
    /// Capture, assembly or save failed; nothing was saved
    Failed(String),
}

impl ExportOutcome {
    pub fn page_count(&self) -> usize {
        match self {
            ExportOutcome::Saved { placements, .. } => placements.len(),
            _ => 0,
        }
    }
}

/// The report preview: owns the UI state and runs exports.
pub struct Preview {
    page: ReportPage,
    config: ExportConfig,
    rasterizer: Arc<dyn Rasterizer>,
    sink: Arc<dyn DocumentSink>,
    state: Mutex<PreviewState>,
}

impl Preview {
    pub fn new(page: ReportPage, config: ExportConfig, sink: Arc<dyn DocumentSink>) -> Result<Self> {
        config.validate()?;
        let rasterizer = Arc::new(HtmlRasterizer::new(&config));
        Ok(Self {
            page,
            config,
            rasterizer,
            sink,
            state: Mutex::new(PreviewState::default()),
        })
    }

    /// Replace the capture backend
    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn page(&self) -> &ReportPage {
        &self.page
    }

    pub fn state(&self) -> PreviewState {
        self.lock_state().clone()
    }

    pub fn open(&self) {
        self.update(Transition::Opened);
    }

    pub fn close(&self) {
        self.update(Transition::Closed);
    }

    pub fn load_images(&self, images: Vec<EmbeddedImage>) {
        self.update(Transition::ImagesLoaded(images));
    }

    /// Open the dialog and preload every remote image the report references.
    ///
    /// A failed fetch fails the whole batch and leaves no images loaded.
    #[cfg(feature = "fetch")]
    pub async fn open_and_preload(&self, preloader: &crate::preload::ImagePreloader) -> Result<usize> {
        self.open();
        let sources = self.page.image_sources();
        let images = preloader.preload(&sources).await?;
        let count = images.len();
        self.load_images(images);
        Ok(count)
    }

    pub fn can_export(&self) -> bool {
        self.lock_state().can_export()
    }

    pub fn export_label(&self) -> &'static str {
        self.lock_state().export_label()
    }

    /// Capture, paginate, assemble and save the report.
    ///
    /// A trigger while another export is running is a no-op. A missing region
    /// fails fast without setting the in-progress flag. Every other failure is
    /// logged, resets the flag and saves nothing.
    pub async fn export(&self) -> ExportOutcome {
        let region = {
            let mut state = self.lock_state();
            if state.generating {
                log::warn!("export already in progress, ignoring trigger");
                return ExportOutcome::AlreadyRunning;
            }
            let region = if state.open {
                self.page.region(&self.config, &state.images)
            } else {
                Ok(None)
            };
            match region {
                Ok(Some(region)) => {
                    *state = std::mem::take(&mut *state).apply(Transition::ExportStarted);
                    region
                }
                Ok(None) => {
                    log::warn!("report region '{}' is not mounted, nothing to export", self.page.selector());
                    return ExportOutcome::MissingRegion;
                }
                Err(e) => {
                    log::error!("PDF generation failed: {}", e);
                    return ExportOutcome::Failed(e.to_string());
                }
            }
        };

        let _generating = GeneratingGuard { state: &self.state };
        match self.run(region).await {
            Ok((path, placements)) => ExportOutcome::Saved { path, placements },
            Err(e) => {
                log::error!("PDF generation failed: {}", e);
                ExportOutcome::Failed(e.to_string())
            }
        }
    }

    async fn run(&self, region: Region) -> Result<(PathBuf, Vec<PagePlacement>)> {
        let rasterizer = Arc::clone(&self.rasterizer);
        let scale = self.config.scale;
        let capture = tokio::task::spawn_blocking(move || rasterizer.capture(&region, scale));

        let joined = match self.config.capture_timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), capture)
                .await
                .map_err(|_| Error::Timeout(ms))?,
            None => capture.await,
        };
        let image = joined.map_err(|e| Error::CaptureError(format!("capture task failed: {}", e)))??;

        let document = Assembler::new(self.config.page_format).assemble(&image)?;
        drop(image);

        let path = document.save(self.sink.as_ref(), &self.config.file_name)?;
        Ok((path, document.placements().to_vec()))
    }

    fn update(&self, transition: Transition) {
        let mut state = self.lock_state();
        *state = std::mem::take(&mut *state).apply(transition);
    }

    fn lock_state(&self) -> MutexGuard<'_, PreviewState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clears the in-progress flag when the export task ends, however it ends
struct GeneratingGuard<'a> {
    state: &'a Mutex<PreviewState>,
}

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = std::mem::take(&mut *state).apply(Transition::ExportFinished);
    }
}
