use image::{DynamicImage, GrayImage, ImageFormat, Luma, RgbaImage};
use std::io::Cursor;

use crate::core::errors::{RenderingError, RenderingResult};

/// Decode any supported raster format
pub fn decode_image(bytes: &[u8]) -> RenderingResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(RenderingError::Decode)
}

/// Encode as PNG (lossless, so repeated edits do not accumulate artifacts)
pub fn encode_png(img: &RgbaImage) -> RenderingResult<Vec<u8>> {
    let mut png_bytes = Vec::new();
    let mut cursor = Cursor::new(&mut png_bytes);
    img.write_to(&mut cursor, ImageFormat::Png)
        .map_err(RenderingError::Encode)?;
    Ok(png_bytes)
}

/// Run CPU-heavy image work on the blocking pool so the async runtime keeps
/// serving timers and network calls.
pub async fn run_blocking<T, F>(work: F) -> RenderingResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RenderingError::TaskFailed(e.to_string()))
}

/// Grayscale copy with a linear contrast boost: `clamp(gain * v + bias)`
pub fn boosted_grayscale(img: &DynamicImage, gain: f32, bias: f32) -> GrayImage {
    let mut gray = img.to_luma8();
    for pixel in gray.pixels_mut() {
        let boosted = (pixel[0] as f32 * gain + bias).round().clamp(0.0, 255.0);
        *pixel = Luma([boosted as u8]);
    }
    gray
}

/// Binary mask with 255 inside the `[x, y, width, height]` box
pub fn rect_mask(width: u32, height: u32, rect: [u32; 4]) -> GrayImage {
    let [x, y, w, h] = rect;
    let mut mask = GrayImage::new(width, height);
    for my in y..(y + h).min(height) {
        for mx in x..(x + w).min(width) {
            mask.put_pixel(mx, my, Luma([255u8]));
        }
    }
    mask
}
