// Content-aware fill for masked regions
//
// The fill marches inward from the mask border one ring at a time. Every
// pixel of a ring takes the distance-weighted mean of the already known pixels
// within `radius`, so colors and gradients from the surroundings continue into
// the hole instead of leaving a flat patch.

use image::{GrayImage, Rgba, RgbaImage};

use crate::core::errors::{RenderingError, RenderingResult};

/// Fills masked pixels (mask value > 0) from their surroundings
pub trait Inpainter: Send + Sync {
    fn inpaint(&self, image: &RgbaImage, mask: &GrayImage, radius: u32) -> RenderingResult<RgbaImage>;
}

/// Ring-by-ring fill in the spirit of Telea's fast marching method
#[derive(Debug, Default, Clone, Copy)]
pub struct MarchingInpainter;

impl MarchingInpainter {
    pub fn new() -> Self {
        Self
    }
}

impl Inpainter for MarchingInpainter {
    fn inpaint(&self, image: &RgbaImage, mask: &GrayImage, radius: u32) -> RenderingResult<RgbaImage> {
        let (width, height) = image.dimensions();
        if mask.dimensions() != (width, height) {
            return Err(RenderingError::MaskMismatch {
                mask_width: mask.width(),
                mask_height: mask.height(),
                image_width: width,
                image_height: height,
            });
        }

        let mut out = image.clone();
        let idx = |x: u32, y: u32| (y * width + x) as usize;
        let mut known: Vec<bool> = mask.pixels().map(|p| p[0] == 0).collect();

        // Bounding box of the hole, the march never leaves it
        let Some([min_x, min_y, max_x, max_y]) = hole_bounds(mask) else {
            return Ok(out);
        };

        let radius = radius.max(1) as i64;
        let radius_sq = radius * radius;

        loop {
            let mut ring: Vec<(u32, u32)> = Vec::new();
            for y in min_y..=max_y {
                for x in min_x..=max_x {
                    if !known[idx(x, y)] && has_known_neighbour(&known, width, height, x, y) {
                        ring.push((x, y));
                    }
                }
            }

            if ring.is_empty() {
                // Either everything is filled or the mask covers the whole image
                break;
            }

            let filled: Vec<Rgba<u8>> = ring
                .iter()
                .map(|&(x, y)| {
                    let mut acc = [0f64; 4];
                    let mut total = 0f64;
                    for dy in -radius..=radius {
                        for dx in -radius..=radius {
                            let d_sq = dx * dx + dy * dy;
                            if d_sq == 0 || d_sq > radius_sq {
                                continue;
                            }
                            let nx = x as i64 + dx;
                            let ny = y as i64 + dy;
                            if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                                continue;
                            }
                            let (nx, ny) = (nx as u32, ny as u32);
                            if !known[idx(nx, ny)] {
                                continue;
                            }
                            let weight = 1.0 / d_sq as f64;
                            let p = out.get_pixel(nx, ny);
                            for c in 0..4 {
                                acc[c] += p[c] as f64 * weight;
                            }
                            total += weight;
                        }
                    }
                    if total == 0.0 {
                        return *out.get_pixel(x, y);
                    }
                    Rgba([
                        (acc[0] / total).round() as u8,
                        (acc[1] / total).round() as u8,
                        (acc[2] / total).round() as u8,
                        (acc[3] / total).round() as u8,
                    ])
                })
                .collect();

            // Commit the whole ring at once so fill order inside a ring does not matter
            for (&(x, y), color) in ring.iter().zip(filled) {
                out.put_pixel(x, y, color);
                known[idx(x, y)] = true;
            }
        }

        Ok(out)
    }
}

fn hole_bounds(mask: &GrayImage) -> Option<[u32; 4]> {
    let mut bounds: Option<[u32; 4]> = None;
    for (x, y, p) in mask.enumerate_pixels() {
        if p[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => [x, y, x, y],
            Some([x1, y1, x2, y2]) => [x1.min(x), y1.min(y), x2.max(x), y2.max(y)],
        });
    }
    bounds
}

fn has_known_neighbour(known: &[bool], width: u32, height: u32, x: u32, y: u32) -> bool {
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                continue;
            }
            if known[(ny as u32 * width + nx as u32) as usize] {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::rect_mask;

    #[test]
    fn test_uniform_background_fills_uniformly() {
        let mut img = RgbaImage::from_pixel(40, 30, Rgba([90, 120, 150, 255]));
        // "Text" to be removed
        for y in 10..20 {
            for x in 10..30 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let mask = rect_mask(40, 30, [8, 8, 24, 14]);

        let out = MarchingInpainter::new().inpaint(&img, &mask, 3).unwrap();
        for y in 8..22 {
            for x in 8..32 {
                assert_eq!(out.get_pixel(x, y), &Rgba([90, 120, 150, 255]), "pixel {x},{y}");
            }
        }
    }

    #[test]
    fn test_pixels_outside_mask_untouched() {
        let mut img = RgbaImage::from_pixel(20, 20, Rgba([200, 10, 10, 255]));
        img.put_pixel(0, 0, Rgba([1, 2, 3, 255]));
        let mask = rect_mask(20, 20, [5, 5, 5, 5]);

        let out = MarchingInpainter::new().inpaint(&img, &mask, 3).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgba([1, 2, 3, 255]));
        assert_eq!(out.get_pixel(19, 19), &Rgba([200, 10, 10, 255]));
    }

    #[test]
    fn test_gradient_continues_into_hole() {
        // Left half dark, right half bright: the hole edges should follow their side
        let mut img = RgbaImage::new(40, 10);
        for (x, _, p) in img.enumerate_pixels_mut() {
            *p = if x < 20 { Rgba([20, 20, 20, 255]) } else { Rgba([230, 230, 230, 255]) };
        }
        let mask = rect_mask(40, 10, [10, 2, 20, 6]);

        let out = MarchingInpainter::new().inpaint(&img, &mask, 3).unwrap();
        assert!(out.get_pixel(10, 4)[0] < 60);
        assert!(out.get_pixel(29, 4)[0] > 190);
    }

    #[test]
    fn test_mask_size_mismatch() {
        let img = RgbaImage::new(10, 10);
        let mask = GrayImage::new(5, 5);
        assert!(matches!(
            MarchingInpainter::new().inpaint(&img, &mask, 3),
            Err(RenderingError::MaskMismatch { .. })
        ));
    }

    #[test]
    fn test_fully_masked_image_is_returned_as_is() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([5, 5, 5, 255]));
        let mask = rect_mask(4, 4, [0, 0, 4, 4]);
        let out = MarchingInpainter::new().inpaint(&img, &mask, 3).unwrap();
        assert_eq!(out, img);
    }
}
