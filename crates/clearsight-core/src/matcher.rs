//! Descriptor similarity and gallery matching.
//!
//! Each descriptor family has its own metric; all scores are "higher = more
//! alike" and a pair matches only when its score is strictly above the
//! family's threshold.

use crate::config::RecognitionConfig;
use crate::types::{Descriptor, DescriptorKind, Identity};
use thiserror::Error;

const CLASSICAL_COSINE_WEIGHT: f32 = 0.7;
const CLASSICAL_DISTANCE_WEIGHT: f32 = 0.3;

#[derive(Error, Debug, PartialEq)]
pub enum CompareError {
    #[error("cannot compare {0} descriptor with {1} descriptor")]
    KindMismatch(DescriptorKind, DescriptorKind),
}

/// Similarity between two descriptors of the same family.
///
/// - Embedding: `max(0, 1 - euclidean)`.
/// - Classical: `0.7 * cosine + 0.3 / (1 + euclidean)` over the shared prefix.
pub fn similarity(a: &Descriptor, b: &Descriptor) -> Result<f32, CompareError> {
    if a.kind != b.kind {
        return Err(CompareError::KindMismatch(a.kind, b.kind));
    }

    let score = match a.kind {
        DescriptorKind::Embedding => (1.0 - euclidean_distance(&a.values, &b.values)).max(0.0),
        DescriptorKind::Classical => {
            let n = a.values.len().min(b.values.len());
            let (x, y) = (&a.values[..n], &b.values[..n]);
            let distance_sim = 1.0 / (1.0 + euclidean_distance(x, y));
            CLASSICAL_COSINE_WEIGHT * cosine_similarity(x, y) + CLASSICAL_DISTANCE_WEIGHT * distance_sim
        }
    };
    Ok(score)
}

/// Cosine similarity in [-1, 1]; zero if either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 { dot / denom } else { 0.0 }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Per-family match thresholds.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub embedding: f32,
    pub classical: f32,
}

impl Thresholds {
    pub fn for_kind(&self, kind: DescriptorKind) -> f32 {
        match kind {
            DescriptorKind::Embedding => self.embedding,
            DescriptorKind::Classical => self.classical,
        }
    }
}

impl From<&RecognitionConfig> for Thresholds {
    fn from(config: &RecognitionConfig) -> Self {
        Self {
            embedding: config.embedding_threshold,
            classical: config.similarity_threshold,
        }
    }
}

/// Apply a threshold: strictly greater matches.
pub fn is_match(similarity: f32, threshold: f32) -> bool {
    similarity > threshold
}

/// Result of matching a probe descriptor against a gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Best similarity seen across comparable gallery entries; `None` when
    /// no entry shared the probe's descriptor family.
    pub similarity: Option<f32>,
    /// Gallery index of the match, if any.
    pub index: Option<usize>,
    pub identity_id: Option<String>,
    pub identity_name: Option<String>,
}

impl MatchResult {
    fn no_match(similarity: Option<f32>) -> Self {
        Self {
            matched: false,
            similarity,
            index: None,
            identity_id: None,
            identity_name: None,
        }
    }
}

/// Strategy for comparing a probe descriptor against enrolled identities.
pub trait Matcher {
    fn compare(&self, probe: &Descriptor, gallery: &[Identity], thresholds: &Thresholds) -> MatchResult;
}

/// Linear scan for the single best match above threshold.
///
/// O(N) in gallery size with no index; fine for the small galleries this
/// system targets. Ties keep the earliest entry. Entries of a different
/// descriptor family are skipped.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn compare(&self, probe: &Descriptor, gallery: &[Identity], thresholds: &Thresholds) -> MatchResult {
        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;
        let mut skipped = 0usize;

        for (i, identity) in gallery.iter().enumerate() {
            let sim = match similarity(probe, &identity.descriptor) {
                Ok(sim) => sim,
                Err(e) => {
                    skipped += 1;
                    tracing::debug!(id = %identity.id, error = %e, "skipping gallery entry");
                    continue;
                }
            };
            if sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        if skipped > 0 {
            tracing::warn!(
                skipped,
                probe_kind = %probe.kind,
                "gallery entries from another descriptor family were not compared"
            );
        }

        let threshold = thresholds.for_kind(probe.kind);
        match best_idx {
            Some(idx) if is_match(best_sim, threshold) => MatchResult {
                matched: true,
                similarity: Some(best_sim),
                index: Some(idx),
                identity_id: Some(gallery[idx].id.clone()),
                identity_name: Some(gallery[idx].name.clone()),
            },
            Some(_) => MatchResult::no_match(Some(best_sim)),
            None => MatchResult::no_match(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLDS: Thresholds = Thresholds { embedding: 0.6, classical: 0.7 };

    fn identity(id: &str, descriptor: Descriptor) -> Identity {
        Identity {
            id: id.into(),
            name: format!("person {id}"),
            descriptor,
            image_path: None,
            enrolled_at: String::new(),
        }
    }

    #[test]
    fn test_cosine_identical_orthogonal_opposite() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_embedding_self_similarity_is_max() {
        let a = Descriptor::embedding(vec![0.6, 0.8, 0.0]);
        let b = Descriptor::embedding(vec![0.0, 0.8, 0.6]);
        let self_sim = similarity(&a, &a).unwrap();
        assert!((self_sim - 1.0).abs() < 1e-6);
        assert!(self_sim >= similarity(&a, &b).unwrap());
    }

    #[test]
    fn test_embedding_similarity_clamped() {
        let a = Descriptor::embedding(vec![1.0, 0.0]);
        let b = Descriptor::embedding(vec![-1.0, 0.0]);
        assert_eq!(similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_classical_self_similarity_is_one() {
        let a = Descriptor::classical(vec![0.2, 0.4, 0.1, 0.3]);
        assert!((similarity(&a, &a).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_classical_blend() {
        let a = Descriptor::classical(vec![1.0, 0.0]);
        let b = Descriptor::classical(vec![0.0, 1.0]);
        // cosine 0, distance sqrt(2).
        let expected = 0.3 / (1.0 + 2f32.sqrt());
        assert!((similarity(&a, &b).unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_classical_truncates_to_shared_length() {
        let a = Descriptor::classical(vec![0.5, 0.5]);
        let b = Descriptor::classical(vec![0.5, 0.5, 9.0, 9.0]);
        assert!((similarity(&a, &b).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_kind_mismatch() {
        let a = Descriptor::classical(vec![0.5, 0.5]);
        let b = Descriptor::embedding(vec![0.5, 0.5]);
        assert_eq!(
            similarity(&a, &b),
            Err(CompareError::KindMismatch(DescriptorKind::Classical, DescriptorKind::Embedding))
        );
    }

    #[test]
    fn test_threshold_is_strict() {
        assert!(!is_match(0.6, 0.6));
        assert!(is_match(0.6001, 0.6));
    }

    #[test]
    fn test_selects_highest_above_threshold() {
        // Similarities against the zero probe: 0.5, 0.9, 0.7.
        let probe = Descriptor::embedding(vec![0.0, 0.0]);
        let gallery = vec![
            identity("a", Descriptor::embedding(vec![0.5, 0.0])),
            identity("b", Descriptor::embedding(vec![0.1, 0.0])),
            identity("c", Descriptor::embedding(vec![0.0, 0.3])),
        ];
        let result = NearestMatcher.compare(&probe, &gallery, &THRESHOLDS);
        assert!(result.matched);
        assert_eq!(result.index, Some(1));
        assert_eq!(result.identity_id.as_deref(), Some("b"));
        assert_eq!(result.identity_name.as_deref(), Some("person b"));
        assert!((result.similarity.unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_tie_keeps_first_enrolled() {
        let probe = Descriptor::embedding(vec![0.0, 0.0]);
        let gallery = vec![
            identity("first", Descriptor::embedding(vec![0.1, 0.0])),
            identity("second", Descriptor::embedding(vec![0.0, 0.1])),
        ];
        let result = NearestMatcher.compare(&probe, &gallery, &THRESHOLDS);
        assert_eq!(result.identity_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_best_below_threshold_reports_similarity() {
        let probe = Descriptor::embedding(vec![0.0, 0.0]);
        let gallery = vec![identity("a", Descriptor::embedding(vec![0.5, 0.0]))];
        let result = NearestMatcher.compare(&probe, &gallery, &THRESHOLDS);
        assert!(!result.matched);
        assert!(result.identity_id.is_none());
        assert!((result.similarity.unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_other_family_skipped() {
        let probe = Descriptor::classical(vec![0.5, 0.5]);
        let gallery = vec![
            identity("emb", Descriptor::embedding(vec![0.5, 0.5])),
            identity("cls", Descriptor::classical(vec![0.5, 0.5])),
        ];
        let result = NearestMatcher.compare(&probe, &gallery, &THRESHOLDS);
        assert!(result.matched);
        assert_eq!(result.identity_id.as_deref(), Some("cls"));
    }

    #[test]
    fn test_empty_gallery() {
        let probe = Descriptor::classical(vec![1.0]);
        let result = NearestMatcher.compare(&probe, &[], &THRESHOLDS);
        assert!(!result.matched);
        assert_eq!(result.similarity, None);
    }

    #[test]
    fn test_only_other_family_has_no_similarity() {
        let probe = Descriptor::classical(vec![0.5, 0.5]);
        let gallery = vec![
            identity("emb1", Descriptor::embedding(vec![0.5, 0.5])),
            identity("emb2", Descriptor::embedding(vec![0.1, 0.9])),
        ];
        let result = NearestMatcher.compare(&probe, &gallery, &THRESHOLDS);
        assert!(!result.matched);
        assert!(result.index.is_none());
        assert_eq!(result.similarity, None);
    }
}
