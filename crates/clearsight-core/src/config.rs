use serde::{Deserialize, Serialize};

/// Tunables for the whole recognition pipeline.
///
/// Every field has a default, so a partial TOML table is enough to override
/// a single value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Match threshold for classical (LBP + HOG) descriptors. The fused
    /// vector is non-negative, so unrelated faces already score near 0.9.
    pub similarity_threshold: f32,
    /// Match threshold for embedding-model descriptors (`1 - euclidean`).
    pub embedding_threshold: f32,
    /// Faces whose shorter side is below this many pixels are discarded.
    pub min_face_size: u32,
    /// Faces whose longer side exceeds this many pixels are discarded.
    pub max_face_size: Option<u32>,
    /// Images narrower or shorter than this are rejected as too small.
    pub min_image_size: u32,
    pub min_sharpness: f32,
    pub min_brightness: f32,
    pub max_brightness: f32,
    /// Apply CLAHE and a light blur before classical feature extraction.
    pub use_preprocessing: bool,
    /// Expected embedding length from the embedding model.
    pub feature_dimension: usize,
    /// Combined entry ceiling of the detection/descriptor cache.
    pub cache_capacity: usize,
    pub classical: ClassicalConfig,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.93,
            embedding_threshold: 0.40,
            min_face_size: 60,
            max_face_size: None,
            min_image_size: 200,
            min_sharpness: 50.0,
            min_brightness: 50.0,
            max_brightness: 200.0,
            use_preprocessing: true,
            feature_dimension: 128,
            cache_capacity: 50,
            classical: ClassicalConfig::default(),
        }
    }
}

/// Parameters of the hand-crafted LBP + HOG descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassicalConfig {
    /// Side of the square the face crop is resized to.
    pub face_size: u32,
    pub lbp_bins: usize,
    /// HOG cell sizes, one histogram grid per entry.
    pub hog_cell_sizes: Vec<u32>,
    /// Per-scale HOG length after truncation or zero padding. Should be at
    /// least [`ClassicalConfig::hog_grid_len`] of the finest cell size, or
    /// the lower part of the face never reaches the descriptor.
    pub hog_bins_per_scale: usize,
    pub lbp_weight: f32,
    pub hog_weight: f32,
}

impl Default for ClassicalConfig {
    fn default() -> Self {
        Self {
            face_size: 100,
            lbp_bins: 512,
            hog_cell_sizes: vec![8, 16],
            hog_bins_per_scale: 1296,
            lbp_weight: 0.6,
            hog_weight: 0.4,
        }
    }
}

impl ClassicalConfig {
    /// Length of every descriptor produced with this configuration.
    pub fn descriptor_len(&self) -> usize {
        self.lbp_bins + self.hog_bins_per_scale * self.hog_cell_sizes.len()
    }

    /// Untruncated HOG length for one cell size: 9 orientation bins per cell.
    pub fn hog_grid_len(&self, cell: u32) -> usize {
        let cells = (self.face_size / cell.max(1)) as usize;
        cells * cells * 9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_descriptor_len() {
        assert_eq!(ClassicalConfig::default().descriptor_len(), 512 + 2 * 1296);
    }

    #[test]
    fn test_default_hog_scales_are_not_truncated() {
        let config = ClassicalConfig::default();
        assert_eq!(config.hog_grid_len(8), 12 * 12 * 9);
        assert_eq!(config.hog_grid_len(16), 6 * 6 * 9);
        for &cell in &config.hog_cell_sizes {
            assert!(config.hog_grid_len(cell) <= config.hog_bins_per_scale, "cell {cell}");
        }
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let json = r#"{ "similarity_threshold": 0.65, "classical": { "lbp_bins": 256 } }"#;
        let config: RecognitionConfig = serde_json::from_str(json).unwrap();
        assert!((config.similarity_threshold - 0.65).abs() < 1e-6);
        assert!((config.embedding_threshold - 0.40).abs() < 1e-6);
        assert_eq!(config.classical.lbp_bins, 256);
        assert_eq!(config.classical.hog_cell_sizes, vec![8, 16]);
        assert_eq!(config.cache_capacity, 50);
    }
}
