//! Grayscale normalisation for the classical descriptor (resize, global
//! histogram equalisation, CLAHE and light denoising).

use image::imageops::FilterType;
use image::{GrayImage, RgbImage};

const CLAHE_TILES: u32 = 4;
const CLAHE_CLIP_LIMIT: f32 = 0.03;
const DENOISE_SIGMA: f32 = 0.8;

/// Convert a face crop to a normalised `size` × `size` grayscale patch.
///
/// With `enhance` set, CLAHE and a mild Gaussian blur run before the global
/// equalisation.
pub fn normalize_face(face: &RgbImage, size: u32, enhance: bool) -> GrayImage {
    let gray = image::imageops::grayscale(face);
    let mut patch = image::imageops::resize(&gray, size, size, FilterType::Triangle);

    if enhance {
        clahe_enhance(&mut patch, CLAHE_TILES, CLAHE_CLIP_LIMIT);
        patch = image::imageops::blur(&patch, DENOISE_SIGMA);
    }

    equalize_histogram(&mut patch);
    patch
}

/// Global histogram equalisation in-place.
///
/// A single-valued image has no spread to redistribute and is left untouched.
pub fn equalize_histogram(gray: &mut GrayImage) {
    let total = gray.as_raw().len();
    if total == 0 {
        return;
    }

    let mut hist = [0usize; 256];
    for &p in gray.as_raw() {
        hist[p as usize] += 1;
    }

    let mut cdf = [0usize; 256];
    let mut running = 0usize;
    for (i, &count) in hist.iter().enumerate() {
        running += count;
        cdf[i] = running;
    }

    let cdf_min = cdf.iter().copied().find(|&v| v > 0).unwrap_or(0);
    let denom = total - cdf_min;
    if denom == 0 {
        return;
    }

    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        let scaled = (cdf[i].saturating_sub(cdf_min)) as f32 / denom as f32 * 255.0;
        *v = scaled.round().clamp(0.0, 255.0) as u8;
    }

    for p in gray.iter_mut() {
        *p = lut[*p as usize];
    }
}

/// Contrast-limited adaptive histogram equalisation in-place.
///
/// Each cell of a `tiles` × `tiles` grid gets its own clipped equalisation
/// curve. A pixel is remapped through the four curves whose cell centres
/// surround it, weighted by distance.
pub fn clahe_enhance(gray: &mut GrayImage, tiles: u32, clip_limit: f32) {
    let Some(curves) = TileCurves::build(gray, tiles, clip_limit) else {
        return;
    };
    for (x, y, pixel) in gray.enumerate_pixels_mut() {
        pixel[0] = curves.remap(x, y, pixel[0]);
    }
}

/// Per-cell lookup curves for [`clahe_enhance`].
struct TileCurves {
    tiles: u32,
    cell_w: u32,
    cell_h: u32,
    curves: Vec<[f32; 256]>,
}

impl TileCurves {
    /// `None` when the image is smaller than one pixel per cell.
    fn build(gray: &GrayImage, tiles: u32, clip_limit: f32) -> Option<Self> {
        let tiles = tiles.max(1);
        let (cell_w, cell_h) = (gray.width() / tiles, gray.height() / tiles);
        if cell_w == 0 || cell_h == 0 {
            return None;
        }
        let area = (cell_w * cell_h) as f32;
        let limit = ((clip_limit * area) as u32).max(1);

        let mut curves = Vec::with_capacity((tiles * tiles) as usize);
        for row in 0..tiles {
            for col in 0..tiles {
                let mut hist = [0u32; 256];
                for y in row * cell_h..(row + 1) * cell_h {
                    for x in col * cell_w..(col + 1) * cell_w {
                        hist[gray.get_pixel(x, y)[0] as usize] += 1;
                    }
                }
                clip_histogram(&mut hist, limit);
                curves.push(cumulative_curve(&hist, area));
            }
        }
        Some(Self { tiles, cell_w, cell_h, curves })
    }

    fn curve(&self, row: u32, col: u32) -> &[f32; 256] {
        &self.curves[(row * self.tiles + col) as usize]
    }

    fn remap(&self, x: u32, y: u32, value: u8) -> u8 {
        let last = self.tiles - 1;
        let fy = (y as f32 / self.cell_h as f32 - 0.5).clamp(0.0, last as f32);
        let fx = (x as f32 / self.cell_w as f32 - 0.5).clamp(0.0, last as f32);
        let (r0, c0) = (fy as u32, fx as u32);
        let (r1, c1) = ((r0 + 1).min(last), (c0 + 1).min(last));
        let (dy, dx) = (fy - r0 as f32, fx - c0 as f32);

        let v = value as usize;
        let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
        let upper = lerp(self.curve(r0, c0)[v], self.curve(r0, c1)[v], dx);
        let lower = lerp(self.curve(r1, c0)[v], self.curve(r1, c1)[v], dx);
        lerp(upper, lower, dy).round().clamp(0.0, 255.0) as u8
    }
}

/// Cap every bin at `limit` and spread the excess evenly, remainder to the
/// lowest levels.
fn clip_histogram(hist: &mut [u32; 256], limit: u32) {
    let excess: u32 = hist.iter().map(|&c| c.saturating_sub(limit)).sum();
    let (share, remainder) = (excess / 256, (excess % 256) as usize);
    for (level, bin) in hist.iter_mut().enumerate() {
        *bin = (*bin).min(limit) + share + u32::from(level < remainder);
    }
}

/// Running histogram total rescaled so the first occupied level maps to 0 and
/// `total` maps to 255.
fn cumulative_curve(hist: &[u32; 256], total: f32) -> [f32; 256] {
    let mut curve = [0f32; 256];
    let mut running = 0f32;
    for (slot, &count) in curve.iter_mut().zip(hist.iter()) {
        running += count as f32;
        *slot = running;
    }
    let floor = curve.iter().copied().find(|&v| v > 0.0).unwrap_or(0.0);
    let span = total - floor;
    if span > 0.0 {
        for v in curve.iter_mut() {
            *v = ((*v - floor) / span * 255.0).clamp(0.0, 255.0);
        }
    }
    curve
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn stddev(data: &[u8]) -> f32 {
        let n = data.len() as f32;
        let mean = data.iter().map(|&b| b as f32).sum::<f32>() / n;
        let variance = data.iter().map(|&b| (b as f32 - mean).powi(2)).sum::<f32>() / n;
        variance.sqrt()
    }

    fn low_contrast(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([100 + ((x + y * w) % 11) as u8]))
    }

    #[test]
    fn test_equalize_stretches_range() {
        let mut gray = low_contrast(32, 32);
        equalize_histogram(&mut gray);
        let min = *gray.as_raw().iter().min().unwrap();
        let max = *gray.as_raw().iter().max().unwrap();
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn test_equalize_flat_image_untouched() {
        let mut gray = GrayImage::from_pixel(10, 10, Luma([77]));
        equalize_histogram(&mut gray);
        assert!(gray.as_raw().iter().all(|&p| p == 77));
    }

    #[test]
    fn test_clahe_increases_contrast() {
        let mut gray = low_contrast(16, 16);
        let orig = stddev(gray.as_raw());
        clahe_enhance(&mut gray, 2, 0.02);
        let enhanced = stddev(gray.as_raw());
        assert!(enhanced > orig, "orig={orig:.2}, enhanced={enhanced:.2}");
    }

    #[test]
    fn test_clahe_tiny_image_is_noop() {
        let mut gray = GrayImage::from_pixel(3, 3, Luma([50]));
        clahe_enhance(&mut gray, 4, 0.03);
        assert!(gray.as_raw().iter().all(|&p| p == 50));
    }

    #[test]
    fn test_clip_histogram_conserves_pixels() {
        let mut hist = [0u32; 256];
        hist[10] = 900;
        hist[200] = 124;
        clip_histogram(&mut hist, 40);
        assert_eq!(hist.iter().sum::<u32>(), 1024);
        // 944 excess: 3 per level, 176 levels get one more
        assert_eq!(hist[10], 40 + 3 + 1);
        assert_eq!(hist[200], 40 + 3);
        assert_eq!(hist[0], 4);
        assert_eq!(hist[255], 3);
    }

    #[test]
    fn test_clahe_keeps_dark_and_bright_order() {
        let mut gray = GrayImage::from_fn(40, 40, |x, _| Luma([if x < 20 { 60 } else { 180 }]));
        clahe_enhance(&mut gray, 4, 0.03);
        assert!(gray.get_pixel(2, 20)[0] < gray.get_pixel(37, 20)[0]);
    }

    #[test]
    fn test_normalize_face_fixed_size() {
        for (w, h) in [(37, 80), (100, 100), (640, 480)] {
            let face = RgbImage::from_fn(w, h, |x, y| Rgb([(x * 3 % 256) as u8, (y % 256) as u8, 60]));
            let patch = normalize_face(&face, 100, true);
            assert_eq!(patch.dimensions(), (100, 100));
            let plain = normalize_face(&face, 100, false);
            assert_eq!(plain.dimensions(), (100, 100));
        }
    }
}
