// Image pipeline: decode, detect, edit, encode

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::core::config::Config;
use crate::core::errors::{ConfigResult, RenderingResult};
use crate::core::types::ProcessedImage;
use crate::pipeline::editor::RegionEditor;
use crate::services::detection::RegionDetector;
use crate::services::inpainting::MarchingInpainter;
use crate::services::ocr::TesseractEngine;
use crate::services::rendering::TextRenderer;
use crate::utils::{decode_image, encode_png, run_blocking};

pub struct ImagePipeline {
    detector: RegionDetector,
    editor: RegionEditor,
}

impl ImagePipeline {
    pub fn new(detector: RegionDetector, editor: RegionEditor) -> Self {
        Self { detector, editor }
    }

    /// Tesseract detection, marching inpainting and configured fonts
    pub fn from_config(config: &Config) -> ConfigResult<Self> {
        let engine = Arc::new(TesseractEngine::new(config.image.tesseract_cmd.clone()));
        match engine.version() {
            Some(version) => info!("OCR engine ready: {}", version),
            None => warn!(
                "'{}' cannot be run, images will be published unmodified",
                config.image.tesseract_cmd
            ),
        }
        let detector = RegionDetector::new(engine, config.link_regex()?, config.image.ocr_language.clone());
        let editor = RegionEditor::new(
            Arc::new(MarchingInpainter::new()),
            Arc::new(TextRenderer::new(&config.image.font_paths)),
            config.branding.target_link.clone(),
        );
        Ok(Self::new(detector, editor))
    }

    /// Replace every detected old link in an encoded image
    ///
    /// Anything that goes wrong degrades to returning the input unchanged.
    /// When nothing is edited the exact input bytes come back.
    #[instrument(skip_all, fields(bytes = input.len()))]
    pub fn process(&self, input: &[u8]) -> ProcessedImage {
        let start = Instant::now();
        let unchanged = || ProcessedImage {
            bytes: input.to_vec(),
            modified: false,
        };

        let decoded = match decode_image(input) {
            Ok(img) => img,
            Err(e) => {
                warn!("Image left untouched: {}", e);
                return unchanged();
            }
        };

        let regions = self.detector.detect(&decoded);
        if regions.is_empty() {
            debug!("No regions to replace");
            return unchanged();
        }

        let (edited, count) = self.editor.apply(decoded.to_rgba8(), &regions);
        if count == 0 {
            warn!("All {} region edits failed, keeping original image", regions.len());
            return unchanged();
        }

        match encode_png(&edited) {
            Ok(bytes) => {
                info!(
                    "Replaced {}/{} regions in {:.0}ms",
                    count,
                    regions.len(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
                ProcessedImage {
                    bytes,
                    modified: true,
                }
            }
            Err(e) => {
                warn!("Image left untouched: {}", e);
                unchanged()
            }
        }
    }

    /// `process` on the blocking pool
    pub async fn process_async(self: &Arc<Self>, input: Vec<u8>) -> RenderingResult<ProcessedImage> {
        let pipeline = Arc::clone(self);
        run_blocking(move || pipeline.process(&input)).await
    }
}
