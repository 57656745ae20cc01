pub mod bitmap_font;

use cosmic_text::{
    fontdb, Attrs, Buffer, Color as CosmicColor, Family, FontSystem, Metrics, Shaping, SwashCache,
    Wrap,
};
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const OUTLINE_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
pub const FILL_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// 1px outline: the eight neighbours of the fill position
const OUTLINE_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

enum Backend {
    Shaped {
        font_system: Mutex<FontSystem>,
        swash_cache: Mutex<SwashCache>,
        /// First family from the configured fonts, `None` means "any monospace"
        family: Option<String>,
    },
    Bitmap,
}

/// Draws outlined replacement text onto images
///
/// Font resolution order: configured font files, installed system fonts,
/// then the built-in bitmap font. Rendering never fails for lack of fonts.
pub struct TextRenderer {
    backend: Backend,
}

impl TextRenderer {
    pub fn new(font_paths: &[PathBuf]) -> Self {
        let mut db = fontdb::Database::new();

        for path in font_paths {
            match db.load_font_file(path) {
                Ok(()) => debug!("Font loaded: {}", path.display()),
                Err(e) => warn!("Font not loaded: {} ({})", path.display(), e),
            }
        }

        let family = if db.is_empty() {
            None
        } else {
            db.faces()
                .next()
                .and_then(|face| face.families.first().map(|(name, _)| name.clone()))
        };

        if db.is_empty() {
            debug!("No configured fonts, scanning system fonts");
            db.load_system_fonts();
        }

        if db.is_empty() {
            warn!("No usable fonts found, using built-in bitmap font");
            return Self::bitmap();
        }

        info!(
            "Text renderer initialized ({} faces, family: {})",
            db.len(),
            family.as_deref().unwrap_or("monospace")
        );

        Self {
            backend: Backend::Shaped {
                font_system: Mutex::new(FontSystem::new_with_locale_and_db("en-US".to_string(), db)),
                swash_cache: Mutex::new(SwashCache::new()),
                family,
            },
        }
    }

    /// Renderer that only uses the built-in bitmap font
    pub fn bitmap() -> Self {
        Self {
            backend: Backend::Bitmap,
        }
    }

    pub fn is_bitmap(&self) -> bool {
        matches!(self.backend, Backend::Bitmap)
    }

    /// Draw `text` at (x, y) with a black outline beneath a white fill
    pub fn draw_outlined(&self, img: &mut RgbaImage, text: &str, x: i32, y: i32, font_size: f32) {
        if text.is_empty() {
            return;
        }

        match &self.backend {
            Backend::Bitmap => {
                let scale = bitmap_font::scale_for(font_size);
                for (dx, dy) in OUTLINE_OFFSETS {
                    bitmap_font::draw_text(img, text, x + dx, y + dy, scale, OUTLINE_COLOR);
                }
                bitmap_font::draw_text(img, text, x, y, scale, FILL_COLOR);
            }
            Backend::Shaped {
                font_system,
                swash_cache,
                family,
            } => {
                let mut font_system = font_system.lock();
                let mut swash_cache = swash_cache.lock();

                // Shape once, stamp nine times
                let metrics = Metrics::new(font_size, font_size * 1.2);
                let mut buffer = Buffer::new(&mut font_system, metrics);
                buffer.set_size(&mut font_system, None, None);
                buffer.set_wrap(&mut font_system, Wrap::None);

                let attrs = match family {
                    Some(name) => Attrs::new().family(Family::Name(name.as_str())),
                    None => Attrs::new().family(Family::Monospace),
                };
                buffer.set_text(&mut font_system, text, &attrs, Shaping::Advanced);
                buffer.shape_until_scroll(&mut font_system, false);

                let stamps = OUTLINE_OFFSETS
                    .iter()
                    .map(|&(dx, dy)| (dx, dy, OUTLINE_COLOR))
                    .chain(std::iter::once((0, 0, FILL_COLOR)));

                for (dx, dy, color) in stamps {
                    let cosmic_color = CosmicColor::rgba(color[0], color[1], color[2], color[3]);
                    let (origin_x, origin_y) = (x + dx, y + dy);
                    buffer.draw(
                        &mut font_system,
                        &mut swash_cache,
                        cosmic_color,
                        |px_x, px_y, _w, _h, pixel_color| {
                            blend_pixel(img, origin_x + px_x, origin_y + px_y, pixel_color);
                        },
                    );
                }
            }
        }
    }
}

fn blend_pixel(img: &mut RgbaImage, x: i32, y: i32, color: CosmicColor) {
    if x < 0 || y < 0 || x >= img.width() as i32 || y >= img.height() as i32 {
        return;
    }
    let existing = *img.get_pixel(x as u32, y as u32);
    let alpha = color.a() as f32 / 255.0;
    let inv_alpha = 1.0 - alpha;

    let blended = Rgba([
        (color.r() as f32 * alpha + existing[0] as f32 * inv_alpha) as u8,
        (color.g() as f32 * alpha + existing[1] as f32 * inv_alpha) as u8,
        (color.b() as f32 * alpha + existing[2] as f32 * inv_alpha) as u8,
        existing[3].max(color.a()),
    ]);
    img.put_pixel(x as u32, y as u32, blended);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_outline_and_fill() {
        let renderer = TextRenderer::bitmap();
        assert!(renderer.is_bitmap());

        let mut img = RgbaImage::from_pixel(40, 20, Rgba([120, 40, 40, 255]));
        renderer.draw_outlined(&mut img, "l", 5, 5, 8.0);

        // Stem of 'l' is column 2 of the glyph, rows 0-6
        assert_eq!(img.get_pixel(7, 8), &FILL_COLOR);
        // Left of the stem sits in the outline
        assert_eq!(img.get_pixel(6, 8), &OUTLINE_COLOR);
        // Far away stays untouched
        assert_eq!(img.get_pixel(30, 15), &Rgba([120, 40, 40, 255]));
    }

    #[test]
    fn test_empty_text_draws_nothing() {
        let renderer = TextRenderer::bitmap();
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([1, 2, 3, 255]));
        renderer.draw_outlined(&mut img, "", 0, 0, 12.0);
        assert!(img.pixels().all(|p| *p == Rgba([1, 2, 3, 255])));
    }

    #[test]
    fn test_renderer_never_fails_without_fonts() {
        // Bogus paths: either system fonts or the bitmap font must take over
        let renderer = TextRenderer::new(&[PathBuf::from("/nonexistent/font.ttf")]);
        let mut img = RgbaImage::from_pixel(120, 40, Rgba([60, 60, 60, 255]));
        renderer.draw_outlined(&mut img, "t.me/newchan", 2, 2, 20.0);
    }
}
