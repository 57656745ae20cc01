// Region detection: find OCR words that match the link pattern

use image::DynamicImage;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::types::TextRegion;
use crate::services::ocr::{OcrEngine, OcrToken};
use crate::utils::boosted_grayscale;

/// Boxes this narrow are OCR noise
const MIN_REGION_WIDTH: u32 = 10;
/// Boxes this short are OCR noise
const MIN_REGION_HEIGHT: u32 = 5;

/// Linear contrast boost applied before OCR
#[derive(Debug, Clone, Copy)]
pub struct ContrastBoost {
    pub gain: f32,
    pub bias: f32,
}

impl Default for ContrastBoost {
    fn default() -> Self {
        Self {
            gain: 1.5,
            bias: 30.0,
        }
    }
}

/// Finds text regions matching a target pattern
pub struct RegionDetector {
    engine: Arc<dyn OcrEngine>,
    pattern: Regex,
    language: String,
    contrast: ContrastBoost,
}

impl RegionDetector {
    /// `pattern` should already be case-insensitive (see `Config::link_regex`)
    pub fn new(engine: Arc<dyn OcrEngine>, pattern: Regex, language: impl Into<String>) -> Self {
        Self {
            engine,
            pattern,
            language: language.into(),
            contrast: ContrastBoost::default(),
        }
    }

    pub fn with_contrast(mut self, contrast: ContrastBoost) -> Self {
        self.contrast = contrast;
        self
    }

    /// Detect regions to replace, in OCR order
    ///
    /// OCR failures are logged and reported as "nothing found".
    pub fn detect(&self, image: &DynamicImage) -> Vec<TextRegion> {
        let gray = boosted_grayscale(image, self.contrast.gain, self.contrast.bias);

        let tokens = match self.engine.recognize(&gray, &self.language) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("OCR failed, treating image as clean: {}", e);
                return Vec::new();
            }
        };

        let regions: Vec<TextRegion> = tokens
            .into_iter()
            .filter_map(|token| self.accept(token))
            .collect();

        if regions.is_empty() {
            debug!("No matching text regions");
        } else {
            for region in &regions {
                info!(
                    "Found '{}' at ({}, {}) {}x{}",
                    region.text, region.x, region.y, region.width, region.height
                );
            }
        }

        regions
    }

    fn accept(&self, token: OcrToken) -> Option<TextRegion> {
        let text = token.text.trim();
        if !self.pattern.is_match(text) {
            return None;
        }
        if token.width <= MIN_REGION_WIDTH || token.height <= MIN_REGION_HEIGHT {
            debug!(
                "Dropping tiny match '{}' ({}x{})",
                text, token.width, token.height
            );
            return None;
        }
        Some(TextRegion {
            x: token.left,
            y: token.top,
            width: token.width,
            height: token.height,
            text: text.to_string(),
            confidence: token.confidence,
        })
    }
}
