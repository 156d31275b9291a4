//! clearsight-core: face quality gating, detection, descriptors and matching.
//!
//! Faces are located with SCRFD and described either by a pretrained
//! embedding network (ONNX Runtime) or, when no model is available, by a
//! classical LBP + multi-scale HOG descriptor.

pub mod cache;
pub mod classical;
pub mod config;
pub mod decode;
pub mod detector;
pub mod embedder;
pub mod extractor;
pub mod matcher;
pub mod preprocess;
pub mod processor;
pub mod quality;
pub mod snapshot;
#[cfg(test)]
mod synthetic;
pub mod types;

pub use config::{ClassicalConfig, RecognitionConfig};
pub use detector::{FaceLocator, ScrfdDetector};
pub use embedder::{EmbeddingModel, OnnxEmbedder};
pub use matcher::{Matcher, MatchResult, NearestMatcher, Thresholds};
pub use processor::{Enrollment, FaceProcessor, ImagePayload, ProcessError, Recognition};
pub use quality::{QualityIssue, QualityMetrics, QualityReport};
pub use types::{BoundingBox, Descriptor, DescriptorKind, FaceRegion, Identity};
