//! The recognition pipeline: decode → quality gate → locate → extract → match.
//!
//! A [`FaceProcessor`] is built once per process and shared by reference.
//! Locator, extractor and cache each sit behind their own mutex, so one
//! request's detection can overlap another's matching.

use crate::cache::{content_hash, DescriptorCache};
use crate::classical::{ClassicalError, ClassicalExtractor};
use crate::config::RecognitionConfig;
use crate::decode::{self, DecodeError};
use crate::detector::{DetectorError, FaceLocator};
use crate::embedder::EmbeddingModel;
use crate::extractor::{ExtractError, ExtractionStrategy, FeatureExtractor};
use crate::matcher::{Matcher, NearestMatcher, Thresholds};
use crate::quality::{self, QualityIssue, QualityMetrics, QualityReport, QualityThresholds};
use crate::types::{Descriptor, FaceRegion, Identity};
use image::RgbImage;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("image rejected: {issue}")]
    QualityRejected {
        issue: QualityIssue,
        metrics: QualityMetrics,
    },
    #[error("no face detected")]
    NoFaceDetected,
    #[error("{0} faces detected; exactly one is required")]
    MultipleFacesDetected(usize),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("feature extraction failed: {0}")]
    Extraction(#[from] ExtractError),
}

/// An encoded image as received from a client.
#[derive(Debug, Clone, Copy)]
pub enum ImagePayload<'a> {
    /// Base64 text, optionally a `data:` URI.
    Base64(&'a str),
    /// Raw encoded file bytes.
    Bytes(&'a [u8]),
}

/// A successful enrollment: the single face, its descriptor, and the decoded image.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub descriptor: Descriptor,
    pub region: FaceRegion,
    pub quality: QualityMetrics,
    pub image: RgbImage,
}

/// Outcome of a recognition request.
#[derive(Debug, Clone)]
pub enum Recognition {
    NoFace,
    NoMatch {
        /// Best similarity among comparable entries, if the gallery had any.
        best_similarity: Option<f32>,
    },
    Match {
        identity: Identity,
        similarity: f32,
    },
}

/// Face recognition pipeline owning its models and cache.
pub struct FaceProcessor {
    config: RecognitionConfig,
    locator: Mutex<Box<dyn FaceLocator>>,
    extractor: Mutex<FeatureExtractor>,
    cache: Mutex<DescriptorCache>,
}

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FaceProcessor {
    /// Build the pipeline. Passing `None` for `embedder` selects the classical strategy.
    pub fn new(
        config: RecognitionConfig,
        locator: Box<dyn FaceLocator>,
        embedder: Option<Box<dyn EmbeddingModel>>,
    ) -> Result<Self, ClassicalError> {
        let classical = ClassicalExtractor::new(config.classical.clone(), config.use_preprocessing)?;
        let cache = DescriptorCache::new(config.cache_capacity);

        Ok(Self {
            locator: Mutex::new(locator),
            extractor: Mutex::new(FeatureExtractor::new(embedder, classical)),
            cache: Mutex::new(cache),
            config,
        })
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    pub fn strategy(&self) -> ExtractionStrategy {
        lock(&self.extractor).strategy()
    }

    pub fn fallback_count(&self) -> u64 {
        lock(&self.extractor).fallback_count()
    }

    pub fn decode(&self, payload: ImagePayload<'_>) -> Result<RgbImage, DecodeError> {
        match payload {
            ImagePayload::Base64(s) => decode::decode_base64(s),
            ImagePayload::Bytes(b) => decode::decode_bytes(b),
        }
    }

    /// Measure and gate an image against the configured thresholds.
    pub fn assess(&self, image: &RgbImage) -> QualityReport {
        quality::assess(quality::measure_rgb(image), &QualityThresholds::from(&self.config))
    }

    /// Locate faces, clamp and size-filter them, and crop each region.
    ///
    /// Results are cached by the image's content hash.
    pub fn detect_faces(&self, image: &RgbImage) -> Result<Vec<FaceRegion>, ProcessError> {
        let key = content_hash(image);
        if let Some(regions) = lock(&self.cache).regions(&key) {
            tracing::debug!(faces = regions.len(), "detection cache hit");
            return Ok(regions);
        }

        let boxes = lock(&self.locator).locate(image)?;
        let found = boxes.len();
        let regions: Vec<FaceRegion> = boxes
            .iter()
            .filter_map(|b| FaceRegion::from_bbox(image, b))
            .filter(|r| self.size_allowed(r))
            .collect();

        tracing::debug!(found, kept = regions.len(), "faces located");
        lock(&self.cache).insert_regions(key, regions.clone());
        Ok(regions)
    }

    fn size_allowed(&self, region: &FaceRegion) -> bool {
        if region.min_side() < self.config.min_face_size {
            return false;
        }
        match self.config.max_face_size {
            Some(max) => region.max_side() <= max,
            None => true,
        }
    }

    /// Descriptor for one face crop, cached by the crop's content hash.
    pub fn extract(&self, region: &FaceRegion) -> Result<Descriptor, ProcessError> {
        let key = content_hash(&region.crop);
        if let Some(descriptor) = lock(&self.cache).descriptor(&key) {
            tracing::debug!(kind = %descriptor.kind, "descriptor cache hit");
            return Ok(descriptor);
        }

        let descriptor = lock(&self.extractor).extract(&region.crop)?;
        lock(&self.cache).insert_descriptor(key, descriptor.clone());
        Ok(descriptor)
    }

    /// Decode, gate, and require exactly one face; returns its descriptor.
    pub fn enroll(&self, payload: ImagePayload<'_>) -> Result<Enrollment, ProcessError> {
        let image = self.decode(payload)?;
        let report = self.assess(&image);
        if let Some(issue) = report.issue {
            tracing::info!(%issue, brightness = report.metrics.brightness, sharpness = report.metrics.sharpness, "enroll: quality rejected");
            return Err(ProcessError::QualityRejected { issue, metrics: report.metrics });
        }

        let mut regions = self.detect_faces(&image)?;
        let region = match regions.len() {
            0 => return Err(ProcessError::NoFaceDetected),
            1 => regions.remove(0),
            n => return Err(ProcessError::MultipleFacesDetected(n)),
        };

        let descriptor = self.extract(&region)?;
        tracing::info!(
            kind = %descriptor.kind,
            len = descriptor.len(),
            x = region.x,
            y = region.y,
            width = region.width,
            height = region.height,
            "enroll: descriptor extracted"
        );

        Ok(Enrollment {
            descriptor,
            region,
            quality: report.metrics,
            image,
        })
    }

    /// Decode, gate, and match the best face against `gallery`.
    ///
    /// An image without faces is a normal outcome, not an error. With
    /// several faces the highest-confidence one is used.
    pub fn recognize(&self, payload: ImagePayload<'_>, gallery: &[Identity]) -> Result<Recognition, ProcessError> {
        let image = self.decode(payload)?;
        let report = self.assess(&image);
        if let Some(issue) = report.issue {
            return Err(ProcessError::QualityRejected { issue, metrics: report.metrics });
        }

        let regions = self.detect_faces(&image)?;
        let best = regions.iter().max_by(|a, b| {
            let (ca, cb) = (a.confidence.unwrap_or(0.0), b.confidence.unwrap_or(0.0));
            ca.total_cmp(&cb)
        });
        let Some(region) = best else {
            tracing::info!("recognize: no face detected");
            return Ok(Recognition::NoFace);
        };

        let probe = self.extract(region)?;
        Ok(self.match_descriptor(&probe, gallery))
    }

    /// Compare a descriptor against every gallery entry and pick the best match.
    pub fn match_descriptor(&self, probe: &Descriptor, gallery: &[Identity]) -> Recognition {
        if gallery.is_empty() {
            return Recognition::NoMatch { best_similarity: None };
        }

        let result = NearestMatcher.compare(probe, gallery, &Thresholds::from(&self.config));
        tracing::info!(
            matched = result.matched,
            similarity = ?result.similarity,
            id = result.identity_id.as_deref().unwrap_or("-"),
            gallery = gallery.len(),
            "recognize: match complete"
        );

        match (result.index, result.similarity) {
            (Some(idx), Some(similarity)) if result.matched => Recognition::Match {
                identity: gallery[idx].clone(),
                similarity,
            },
            (_, best_similarity) => Recognition::NoMatch { best_similarity },
        }
    }

    pub fn cache_len(&self) -> usize {
        lock(&self.cache).len()
    }

    pub fn clear_cache(&self) {
        lock(&self.cache).clear();
    }

    pub fn clear_cache_older_than(&self, max_age: Duration) -> usize {
        lock(&self.cache).clear_older_than(max_age)
    }
}
