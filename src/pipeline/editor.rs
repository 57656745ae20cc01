// Region editor: erase each detected region and draw the replacement link

use image::RgbaImage;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::core::errors::{RenderingError, RenderingResult};
use crate::core::types::TextRegion;
use crate::services::inpainting::Inpainter;
use crate::services::rendering::TextRenderer;
use crate::utils::rect_mask;

/// Extra pixels around each OCR box so anti-aliased glyph edges are covered
pub const REGION_PADDING: u32 = 5;
pub const INPAINT_RADIUS: u32 = 3;
pub const MIN_FONT_SIZE: f32 = 12.0;
const FONT_HEIGHT_RATIO: f32 = 0.7;

pub struct RegionEditor {
    inpainter: Arc<dyn Inpainter>,
    renderer: Arc<TextRenderer>,
    replacement: String,
}

impl RegionEditor {
    pub fn new(
        inpainter: Arc<dyn Inpainter>,
        renderer: Arc<TextRenderer>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            inpainter,
            renderer,
            replacement: replacement.into(),
        }
    }

    pub fn font_size_for(box_height: u32) -> f32 {
        (box_height as f32 * FONT_HEIGHT_RATIO).floor().max(MIN_FONT_SIZE)
    }

    /// Edit a single region, returning a new buffer
    pub fn edit_region(&self, img: &RgbaImage, region: &TextRegion) -> RenderingResult<RgbaImage> {
        let (img_w, img_h) = img.dimensions();
        let [x, y, w, h] = region.padded(REGION_PADDING, img_w, img_h).ok_or(
            RenderingError::RegionOutOfBounds {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                image_width: img_w,
                image_height: img_h,
            },
        )?;

        let mask = rect_mask(img_w, img_h, [x, y, w, h]);
        let mut edited = self.inpainter.inpaint(img, &mask, INPAINT_RADIUS)?;

        let font_size = Self::font_size_for(h);
        self.renderer
            .draw_outlined(&mut edited, &self.replacement, x as i32, y as i32, font_size);

        debug!(
            "Replaced '{}' in box ({}, {}) {}x{} at {}px",
            region.text, x, y, w, h, font_size
        );
        Ok(edited)
    }

    /// Apply every region in order; each one sees the previous edits
    ///
    /// A failing region is logged and skipped. Returns the final buffer and
    /// how many regions were actually edited.
    #[instrument(skip_all, fields(regions = regions.len()))]
    pub fn apply(&self, img: RgbaImage, regions: &[TextRegion]) -> (RgbaImage, usize) {
        let mut current = img;
        let mut edited = 0;

        for region in regions {
            match self.edit_region(&current, region) {
                Ok(next) => {
                    current = next;
                    edited += 1;
                }
                Err(e) => warn!("Skipping region '{}': {}", region.text, e),
            }
        }

        (current, edited)
    }
}
