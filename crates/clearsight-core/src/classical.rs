//! Hand-crafted face descriptor: LBP texture histogram fused with multi-scale HOG.
//!
//! Used when no embedding model is available, and as the fallback whenever the
//! embedding path fails.

use crate::config::ClassicalConfig;
use crate::preprocess;
use crate::types::Descriptor;
use image::{GrayImage, RgbImage};
use thiserror::Error;

const HOG_ORIENTATION_BINS: usize = 9;
const HOG_BIN_WIDTH_DEG: f32 = 180.0 / HOG_ORIENTATION_BINS as f32;

/// Neighbour offsets, clockwise from top-left. Bit `i` of the LBP code comes from entry `i`.
const LBP_NEIGHBOURS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
];

#[derive(Error, Debug)]
pub enum ClassicalError {
    #[error("face crop is empty")]
    EmptyFace,
    #[error("invalid classical configuration: {0}")]
    InvalidConfig(String),
}

/// LBP + HOG extractor with a fixed output length.
#[derive(Debug, Clone)]
pub struct ClassicalExtractor {
    config: ClassicalConfig,
    use_preprocessing: bool,
}

impl ClassicalExtractor {
    pub fn new(config: ClassicalConfig, use_preprocessing: bool) -> Result<Self, ClassicalError> {
        if config.face_size < 3 {
            return Err(ClassicalError::InvalidConfig(format!(
                "face_size must be at least 3, got {}",
                config.face_size
            )));
        }
        if config.lbp_bins == 0 {
            return Err(ClassicalError::InvalidConfig("lbp_bins must be > 0".into()));
        }
        if config.hog_cell_sizes.iter().any(|&c| c == 0) {
            return Err(ClassicalError::InvalidConfig("hog cell sizes must be > 0".into()));
        }
        for &cell in &config.hog_cell_sizes {
            let grid = config.hog_grid_len(cell);
            if grid > config.hog_bins_per_scale {
                tracing::warn!(
                    cell,
                    grid,
                    kept = config.hog_bins_per_scale,
                    "HOG scale truncated; lower face cells are dropped"
                );
            }
        }
        Ok(Self { config, use_preprocessing })
    }

    /// Output length of every descriptor from this extractor.
    pub fn descriptor_len(&self) -> usize {
        self.config.descriptor_len()
    }

    pub fn extract(&self, face: &RgbImage) -> Result<Descriptor, ClassicalError> {
        if face.width() == 0 || face.height() == 0 {
            return Err(ClassicalError::EmptyFace);
        }

        let patch = preprocess::normalize_face(face, self.config.face_size, self.use_preprocessing);

        let mut lbp = lbp_histogram(&patch, self.config.lbp_bins);
        let mut hog = hog_features(&patch, &self.config.hog_cell_sizes, self.config.hog_bins_per_scale);

        l2_normalize(&mut lbp);
        l2_normalize(&mut hog);

        let mut values = Vec::with_capacity(lbp.len() + hog.len());
        values.extend(lbp.iter().map(|v| v * self.config.lbp_weight));
        values.extend(hog.iter().map(|v| v * self.config.hog_weight));

        debug_assert_eq!(values.len(), self.descriptor_len());
        Ok(Descriptor::classical(values))
    }
}

/// L1-normalised histogram of 8-neighbour LBP codes over interior pixels.
///
/// Codes (0–255) are scaled into `bins` buckets.
pub fn lbp_histogram(gray: &GrayImage, bins: usize) -> Vec<f32> {
    let mut hist = vec![0f32; bins];
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 || bins == 0 {
        return hist;
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = gray.get_pixel(x, y)[0];
            let mut code = 0usize;
            for (bit, &(dx, dy)) in LBP_NEIGHBOURS.iter().enumerate() {
                let nx = (x as i32 + dx) as u32;
                let ny = (y as i32 + dy) as u32;
                if gray.get_pixel(nx, ny)[0] >= center {
                    code |= 1 << bit;
                }
            }
            let bin = (code * bins / 256).min(bins - 1);
            hist[bin] += 1.0;
        }
    }

    let total: f32 = hist.iter().sum();
    if total > 0.0 {
        for v in hist.iter_mut() {
            *v /= total;
        }
    }
    hist
}

/// Concatenated per-scale HOG histograms, each truncated or zero-padded to
/// `bins_per_scale` values.
pub fn hog_features(gray: &GrayImage, cell_sizes: &[u32], bins_per_scale: usize) -> Vec<f32> {
    let (magnitude, orientation) = gradients(gray);
    let (w, h) = gray.dimensions();
    let w = w as usize;
    let h = h as usize;

    let mut features = Vec::with_capacity(cell_sizes.len() * bins_per_scale);
    for &cell in cell_sizes {
        let cell = cell as usize;
        let cells_x = if cell > 0 { w / cell } else { 0 };
        let cells_y = if cell > 0 { h / cell } else { 0 };

        let mut scale = vec![0f32; cells_x * cells_y * HOG_ORIENTATION_BINS];
        for cy in 0..cells_y {
            for cx in 0..cells_x {
                let base = (cy * cells_x + cx) * HOG_ORIENTATION_BINS;
                for y in cy * cell..(cy + 1) * cell {
                    for x in cx * cell..(cx + 1) * cell {
                        let i = y * w + x;
                        let bin = ((orientation[i] / HOG_BIN_WIDTH_DEG) as usize)
                            .min(HOG_ORIENTATION_BINS - 1);
                        scale[base + bin] += magnitude[i];
                    }
                }
            }
        }

        scale.resize(bins_per_scale, 0.0);
        features.extend(scale);
    }

    features
}

/// Central-difference gradient magnitude and unsigned orientation in [0, 180).
fn gradients(gray: &GrayImage) -> (Vec<f32>, Vec<f32>) {
    let (w, h) = gray.dimensions();
    let (w, h) = (w as usize, h as usize);
    let data = gray.as_raw();
    let mut magnitude = vec![0f32; w * h];
    let mut orientation = vec![0f32; w * h];
    if w < 3 || h < 3 {
        return (magnitude, orientation);
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = data[y * w + x + 1] as f32 - data[y * w + x - 1] as f32;
            let gy = data[(y + 1) * w + x] as f32 - data[(y - 1) * w + x] as f32;
            let i = y * w + x;
            magnitude[i] = (gx * gx + gy * gy).sqrt();

            let mut angle = gy.atan2(gx).to_degrees();
            if angle < 0.0 {
                angle += 180.0;
            }
            if angle >= 180.0 {
                angle -= 180.0;
            }
            orientation[i] = angle;
        }
    }

    (magnitude, orientation)
}

/// Scale to unit L2 norm; all-zero vectors stay zero.
pub(crate) fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
}
