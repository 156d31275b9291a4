//! Pretrained face-embedding model via ONNX Runtime.
//!
//! Face crops are resized to 112×112, scaled to [0, 1] and run through the
//! network; the flattened output is L2-normalised.

use crate::classical::l2_normalize;
use crate::types::Descriptor;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const EMBEDDING_INPUT_SIZE: usize = 112;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("expected {expected}-dim embedding, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("face crop is empty")]
    EmptyFace,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A network mapping a face crop to an embedding descriptor.
pub trait EmbeddingModel: Send {
    fn embed(&mut self, face: &RgbImage) -> Result<Descriptor, EmbedderError>;

    /// Short identifier used in logs.
    fn name(&self) -> &str;
}

/// ONNX face-embedding network with a single image input and a single vector output.
pub struct OnnxEmbedder {
    session: Session,
    dimension: usize,
    name: String,
}

impl OnnxEmbedder {
    /// Load the model, expecting `dimension`-long output vectors.
    pub fn load(model_path: &Path, dimension: usize) -> Result<Self, EmbedderError> {
        if !model_path.exists() {
            return Err(EmbedderError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            dimension,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded embedding model"
        );

        let name = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "embedding".to_string());

        Ok(Self { session, dimension, name })
    }

    /// Resize a face crop into a 1×3×112×112 tensor with values in [0, 1].
    fn preprocess(face: &RgbImage) -> Array4<f32> {
        let size = EMBEDDING_INPUT_SIZE;
        let resized = image::imageops::resize(face, size as u32, size as u32, FilterType::Triangle);

        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }
        tensor
    }
}

impl EmbeddingModel for OnnxEmbedder {
    fn embed(&mut self, face: &RgbImage) -> Result<Descriptor, EmbedderError> {
        if face.width() == 0 || face.height() == 0 {
            return Err(EmbedderError::EmptyFace);
        }

        let input = Self::preprocess(face);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let mut values = raw.to_vec();
        if values.len() != self.dimension {
            return Err(EmbedderError::DimensionMismatch {
                expected: self.dimension,
                actual: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(EmbedderError::InferenceFailed("non-finite embedding values".into()));
        }

        l2_normalize(&mut values);
        Ok(Descriptor::embedding(values))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
