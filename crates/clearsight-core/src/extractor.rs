//! Descriptor extraction with embedding → classical fallback.

use crate::classical::{ClassicalError, ClassicalExtractor};
use crate::embedder::{EmbedderError, EmbeddingModel};
use crate::types::Descriptor;
use image::RgbImage;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("embedding failed ({embedding}) and classical fallback failed ({classical})")]
    BothFailed {
        embedding: EmbedderError,
        classical: ClassicalError,
    },
    #[error("classical extraction failed: {0}")]
    Classical(#[from] ClassicalError),
}

/// Which extraction path the extractor was configured with at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    Embedding,
    Classical,
}

/// Produces a descriptor for a face crop.
///
/// With an embedding model present every call tries it first; any failure
/// is logged, counted in [`fallback_count`](Self::fallback_count), and the
/// classical extractor answers instead.
pub struct FeatureExtractor {
    embedder: Option<Box<dyn EmbeddingModel>>,
    classical: ClassicalExtractor,
    fallbacks: u64,
}

impl FeatureExtractor {
    pub fn new(embedder: Option<Box<dyn EmbeddingModel>>, classical: ClassicalExtractor) -> Self {
        match &embedder {
            Some(model) => tracing::info!(model = model.name(), "feature extractor: embedding strategy"),
            None => tracing::info!(
                len = classical.descriptor_len(),
                "feature extractor: classical strategy (no embedding model)"
            ),
        }
        Self { embedder, classical, fallbacks: 0 }
    }

    pub fn strategy(&self) -> ExtractionStrategy {
        if self.embedder.is_some() {
            ExtractionStrategy::Embedding
        } else {
            ExtractionStrategy::Classical
        }
    }

    /// Number of embedding failures answered by the classical path so far.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks
    }

    pub fn extract(&mut self, face: &RgbImage) -> Result<Descriptor, ExtractError> {
        let Some(model) = self.embedder.as_mut() else {
            return Ok(self.classical.extract(face)?);
        };

        let embedding_err = match model.embed(face) {
            Ok(descriptor) => return Ok(descriptor),
            Err(e) => e,
        };

        self.fallbacks += 1;
        tracing::warn!(
            model = model.name(),
            error = %embedding_err,
            fallbacks = self.fallbacks,
            "embedding extraction failed; falling back to classical descriptor"
        );

        self.classical
            .extract(face)
            .map_err(|classical| ExtractError::BothFailed {
                embedding: embedding_err,
                classical,
            })
    }
}
