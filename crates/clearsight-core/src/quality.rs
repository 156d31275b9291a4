//! Image quality metrics: brightness, Laplacian-variance sharpness, and the
//! accept/reject gate applied before detection.

use crate::config::RecognitionConfig;
use image::{GrayImage, RgbImage};
use serde::Serialize;

/// Brightness and sharpness of an image or region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityMetrics {
    /// Mean grayscale intensity (0.0–255.0).
    pub brightness: f32,
    /// Variance of the Laplacian response; higher = sharper.
    pub sharpness: f32,
    pub width: u32,
    pub height: u32,
}

impl QualityMetrics {
    /// Metrics of an empty or unusable image. Always rejected by the gate.
    pub fn zero() -> Self {
        Self { brightness: 0.0, sharpness: 0.0, width: 0, height: 0 }
    }
}

/// Why an image was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssue {
    TooSmall,
    TooDark,
    TooBright,
    TooBlurry,
}

impl QualityIssue {
    /// User-facing hint for this issue.
    pub fn hint(&self) -> &'static str {
        match self {
            QualityIssue::TooSmall => "Image too small. Please move closer to the camera.",
            QualityIssue::TooDark => "Image too dark. Please improve lighting.",
            QualityIssue::TooBright => "Image too bright. Please reduce lighting.",
            QualityIssue::TooBlurry => "Image too blurry. Please hold still and refocus.",
        }
    }
}

impl std::fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QualityIssue::TooSmall => "too small",
            QualityIssue::TooDark => "too dark",
            QualityIssue::TooBright => "too bright",
            QualityIssue::TooBlurry => "too blurry",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QualityThresholds {
    pub min_image_size: u32,
    pub min_brightness: f32,
    pub max_brightness: f32,
    pub min_sharpness: f32,
}

impl From<&RecognitionConfig> for QualityThresholds {
    fn from(config: &RecognitionConfig) -> Self {
        Self {
            min_image_size: config.min_image_size,
            min_brightness: config.min_brightness,
            max_brightness: config.max_brightness,
            min_sharpness: config.min_sharpness,
        }
    }
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self::from(&RecognitionConfig::default())
    }
}

/// Gate decision plus the metrics it was based on.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QualityReport {
    pub metrics: QualityMetrics,
    pub issue: Option<QualityIssue>,
}

impl QualityReport {
    pub fn accepted(&self) -> bool {
        self.issue.is_none()
    }
}

/// Measure an RGB image via its grayscale conversion.
pub fn measure_rgb(image: &RgbImage) -> QualityMetrics {
    measure(&image::imageops::grayscale(image))
}

/// Measure brightness and sharpness of a grayscale image.
///
/// Never fails: an empty image yields [`QualityMetrics::zero`], and images
/// too small for a 3×3 Laplacian report zero sharpness.
pub fn measure(gray: &GrayImage) -> QualityMetrics {
    let (width, height) = gray.dimensions();
    let pixels = gray.as_raw();
    if pixels.is_empty() {
        return QualityMetrics::zero();
    }

    let brightness = pixels.iter().map(|&p| p as f64).sum::<f64>() / pixels.len() as f64;

    QualityMetrics {
        brightness: brightness as f32,
        sharpness: laplacian_variance(pixels, width as usize, height as usize),
        width,
        height,
    }
}

/// Variance of the 4-neighbour Laplacian over interior pixels.
fn laplacian_variance(pixels: &[u8], width: usize, height: usize) -> f32 {
    if width < 3 || height < 3 || pixels.len() < width * height {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let count = ((width - 2) * (height - 2)) as f64;

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let at = |xx: usize, yy: usize| pixels[yy * width + xx] as f64;
            let lap = at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4.0 * at(x, y);
            sum += lap;
            sum_sq += lap * lap;
        }
    }

    let mean = sum / count;
    ((sum_sq / count) - mean * mean).max(0.0) as f32
}

/// Apply the thresholds. Checks run in order: size, darkness, brightness, blur.
pub fn assess(metrics: QualityMetrics, thresholds: &QualityThresholds) -> QualityReport {
    let issue = if metrics.width < thresholds.min_image_size
        || metrics.height < thresholds.min_image_size
    {
        Some(QualityIssue::TooSmall)
    } else if metrics.brightness < thresholds.min_brightness {
        Some(QualityIssue::TooDark)
    } else if metrics.brightness > thresholds.max_brightness {
        Some(QualityIssue::TooBright)
    } else if metrics.sharpness < thresholds.min_sharpness {
        Some(QualityIssue::TooBlurry)
    } else {
        None
    };

    QualityReport { metrics, issue }
}
