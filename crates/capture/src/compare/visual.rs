//! Visual regression with screenshot comparison
//!
//! Pixels are compared by brightness only, so colour shifts below the
//! tolerance do not count. Mismatching pixels that sit on an anti-aliased
//! edge in either image are ignored.

use image::{GenericImageView, RgbaImage};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::CompareError;

/// Brightness and alpha tolerance when colours are ignored (0-255 scale)
const BRIGHTNESS_TOLERANCE: f64 = 16.0;
const ALPHA_TOLERANCE: f64 = 16.0;

/// Brightness step that makes a neighbour a high-contrast sibling
const CONTRAST_TOLERANCE: f64 = 96.0;

/// Hue step (0-1 scale) that makes a neighbour a differently-hued sibling
const HUE_TOLERANCE: f64 = 0.3;

/// Result of a visual comparison
#[derive(Debug, Clone, PartialEq)]
pub struct VisualDiff {
    /// Pixels counted as different
    pub diff_pixels: u64,

    /// Total pixels compared
    pub total_pixels: u64,

    /// Percentage of pixels that differ
    pub mismatch_percent: f64,
}

impl VisualDiff {
    /// 0-100 similarity, `100 - mismatch_percent`
    pub fn score(&self) -> f64 {
        100.0 - self.mismatch_percent
    }
}

/// Compare two encoded screenshots and return their similarity (0-100)
pub fn compare(before: &[u8], after: &[u8]) -> Result<f64, CompareError> {
    Ok(diff(before, after)?.score())
}

/// Compare two encoded screenshots.
///
/// Images of different dimensions are reported as
/// [`CompareError::DimensionMismatch`], never scored.
pub fn diff(before: &[u8], after: &[u8]) -> Result<VisualDiff, CompareError> {
    let before_img = image::load_from_memory(before)?;
    let after_img = image::load_from_memory(after)?;

    if before_img.dimensions() != after_img.dimensions() {
        return Err(CompareError::DimensionMismatch {
            before: before_img.dimensions(),
            after: after_img.dimensions(),
        });
    }

    let (width, height) = before_img.dimensions();
    let total_pixels = (width as u64) * (height as u64);

    // Quick hash comparison
    if hash(before) == hash(after) {
        debug!("Screenshots match exactly (same hash)");
        return Ok(VisualDiff {
            diff_pixels: 0,
            total_pixels,
            mismatch_percent: 0.0,
        });
    }

    if total_pixels == 0 {
        return Ok(VisualDiff {
            diff_pixels: 0,
            total_pixels,
            mismatch_percent: 0.0,
        });
    }

    let before_rgba = before_img.to_rgba8();
    let after_rgba = after_img.to_rgba8();
    let mut diff_pixels = 0u64;

    for y in 0..height {
        for x in 0..width {
            let a = Pixel::at(&before_rgba, x, y);
            let b = Pixel::at(&after_rgba, x, y);

            if a.similar_ignoring_colour(&b) {
                continue;
            }

            if is_antialiased(&before_rgba, x, y) || is_antialiased(&after_rgba, x, y) {
                continue;
            }

            diff_pixels += 1;
        }
    }

    let mismatch_percent = (diff_pixels as f64 / total_pixels as f64) * 100.0;
    debug!(
        "Visual diff: {}/{} pixels differ ({:.2}%)",
        diff_pixels, total_pixels, mismatch_percent
    );

    Ok(VisualDiff {
        diff_pixels,
        total_pixels,
        mismatch_percent,
    })
}

fn hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy)]
struct Pixel {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

impl Pixel {
    fn at(img: &RgbaImage, x: u32, y: u32) -> Self {
        let [r, g, b, a] = img.get_pixel(x, y).0;
        Self { r, g, b, a }
    }

    /// Perceived brightness (ITU-R BT.601 luma)
    fn brightness(&self) -> f64 {
        0.3 * self.r as f64 + 0.59 * self.g as f64 + 0.11 * self.b as f64
    }

    /// Hue on a 0-1 scale; 0 for greys
    fn hue(&self) -> f64 {
        let r = self.r as f64 / 255.0;
        let g = self.g as f64 / 255.0;
        let b = self.b as f64 / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        if delta == 0.0 {
            return 0.0;
        }

        let h = if max == r {
            (g - b) / delta + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / delta + 2.0
        } else {
            (r - g) / delta + 4.0
        };
        h / 6.0
    }

    fn similar_ignoring_colour(&self, other: &Pixel) -> bool {
        (self.a as f64 - other.a as f64).abs() <= ALPHA_TOLERANCE
            && (self.brightness() - other.brightness()).abs() <= BRIGHTNESS_TOLERANCE
    }

    fn same_rgb(&self, other: &Pixel) -> bool {
        self.r == other.r && self.g == other.g && self.b == other.b
    }
}

/// A pixel is treated as anti-aliasing when its neighbourhood shows a
/// sharp edge (several high-contrast or differently-hued neighbours) or it
/// has fewer than two identical neighbours.
fn is_antialiased(img: &RgbaImage, x: u32, y: u32) -> bool {
    let (width, height) = img.dimensions();
    let source = Pixel::at(img, x, y);
    let source_brightness = source.brightness();
    let source_hue = source.hue();

    let mut high_contrast = 0;
    let mut different_hue = 0;
    let mut equivalent = 0;

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

            let neighbour = Pixel::at(img, nx as u32, ny as u32);
            if (neighbour.brightness() - source_brightness).abs() > CONTRAST_TOLERANCE {
                high_contrast += 1;
            }
            if neighbour.same_rgb(&source) {
                equivalent += 1;
            }
            if (neighbour.hue() - source_hue).abs() > HUE_TOLERANCE {
                different_hue += 1;
            }
            if high_contrast > 1 || different_hue > 1 {
                return true;
            }
        }
    }

    equivalent < 2
}
