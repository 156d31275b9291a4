use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Raw detector output: a face box in source-image coordinates, with optional landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// A located face: an integer box clamped to the source image, plus the cropped pixels.
#[derive(Debug, Clone)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: Option<f32>,
    pub crop: RgbImage,
}

impl FaceRegion {
    /// Clamp a detector box into a `width` × `height` image and crop it.
    ///
    /// Returns `None` when nothing of the box remains inside the image.
    pub fn from_bbox(image: &RgbImage, bbox: &BoundingBox) -> Option<Self> {
        let (img_w, img_h) = image.dimensions();
        if img_w == 0 || img_h == 0 {
            return None;
        }

        let x0 = bbox.x.max(0.0).floor() as u32;
        let y0 = bbox.y.max(0.0).floor() as u32;
        let x1 = (bbox.x + bbox.width).max(0.0).ceil().min(img_w as f32) as u32;
        let y1 = (bbox.y + bbox.height).max(0.0).ceil().min(img_h as f32) as u32;

        if x0 >= x1 || y0 >= y1 {
            return None;
        }

        let width = x1 - x0;
        let height = y1 - y0;
        let crop = image::imageops::crop_imm(image, x0, y0, width, height).to_image();

        Some(Self {
            x: x0,
            y: y0,
            width,
            height,
            confidence: Some(bbox.confidence),
            crop,
        })
    }

    /// Shorter side of the box, in pixels.
    pub fn min_side(&self) -> u32 {
        self.width.min(self.height)
    }

    /// Longer side of the box, in pixels.
    pub fn max_side(&self) -> u32 {
        self.width.max(self.height)
    }
}

/// Which extraction strategy produced a descriptor.
///
/// Descriptors of different kinds live in unrelated vector spaces and are
/// never compared with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    Embedding,
    Classical,
}

impl std::fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DescriptorKind::Embedding => f.write_str("embedding"),
            DescriptorKind::Classical => f.write_str("classical"),
        }
    }
}

/// Fixed-length numeric summary of a face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub kind: DescriptorKind,
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn embedding(values: Vec<f32>) -> Self {
        Self { kind: DescriptorKind::Embedding, values }
    }

    pub fn classical(values: Vec<f32>) -> Self {
        Self { kind: DescriptorKind::Classical, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// An enrolled person: stored descriptor plus display metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub descriptor: Descriptor,
    pub image_path: Option<String>,
    pub enrolled_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9, landmarks: None }
    }

    #[test]
    fn test_region_inside_image() {
        let image = RgbImage::from_pixel(100, 80, Rgb([10, 20, 30]));
        let region = FaceRegion::from_bbox(&image, &bbox(10.0, 20.0, 30.0, 40.0)).unwrap();
        assert_eq!((region.x, region.y, region.width, region.height), (10, 20, 30, 40));
        assert_eq!(region.crop.dimensions(), (30, 40));
        assert_eq!(region.confidence, Some(0.9));
    }

    #[test]
    fn test_region_clamped_to_bounds() {
        let image = RgbImage::new(100, 80);
        let region = FaceRegion::from_bbox(&image, &bbox(-15.0, 50.0, 40.0, 60.0)).unwrap();
        assert_eq!(region.x, 0);
        assert_eq!(region.y, 50);
        assert_eq!(region.width, 25);
        assert_eq!(region.height, 30);
        assert!(region.x + region.width <= 100);
        assert!(region.y + region.height <= 80);
    }

    #[test]
    fn test_region_outside_image() {
        let image = RgbImage::new(100, 80);
        assert!(FaceRegion::from_bbox(&image, &bbox(120.0, 10.0, 20.0, 20.0)).is_none());
        assert!(FaceRegion::from_bbox(&image, &bbox(-50.0, -50.0, 20.0, 20.0)).is_none());
    }

    #[test]
    fn test_descriptor_kind_serializes_snake_case() {
        let d = Descriptor::classical(vec![0.5, 0.25]);
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, r#"{"kind":"classical","values":[0.5,0.25]}"#);
        let back: Descriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
