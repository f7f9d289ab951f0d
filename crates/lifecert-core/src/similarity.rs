use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cosine similarity a probe must strictly exceed to match the reference.
pub const SIMILARITY_THRESHOLD: f64 = 0.8;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimilarityError {
    #[error("embedding dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("embedding has zero norm")]
    ZeroVector,
    #[error("embedding contains NaN/Inf")]
    NonFinite,
}

/// A face embedding produced by an external recognizer, L2-normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Recognizer model identifier, if the producer reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// Cosine similarity of two equal-length vectors: `dot(a, b) / (|a| * |b|)`.
///
/// Inputs need not be normalized. Sums are accumulated in `f64`, which holds
/// the square of any finite `f32` without overflow or underflow. The result
/// is clamped to `[-1, 1]` to absorb rounding on near-identical vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.iter().chain(b).any(|v| !v.is_finite()) {
        return Err(SimilarityError::NonFinite);
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(SimilarityError::ZeroVector);
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !score.is_finite() {
        return Err(SimilarityError::NonFinite);
    }
    Ok(score.clamp(-1.0, 1.0))
}

/// Whether a similarity score passes `threshold`. Strict: a score exactly at
/// the threshold fails.
pub fn passes(score: f64, threshold: f64) -> bool {
    score > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(v: Vec<f32>) -> Vec<f32> {
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.into_iter().map(|x| x / norm).collect()
    }

    #[test]
    fn test_self_similarity_is_one() {
        let a = normalize((0..512).map(|i| ((i * 7919) % 101) as f32 - 50.0).collect());
        let sim = cosine_similarity(&a, &a).unwrap();
        assert!((sim - 1.0).abs() < 1e-5, "got {sim}");
    }

    #[test]
    fn test_orthogonal_is_zero() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn test_opposite_is_minus_one() {
        let sim = cosine_similarity(&[0.6, 0.8], &[-0.6, -0.8]).unwrap();
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_scale_invariant() {
        let sim = cosine_similarity(&[1.0, 0.0], &[4.0, 3.0]).unwrap();
        assert_eq!(sim, 0.8);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = cosine_similarity(&[1.0; 512], &[1.0; 128]).unwrap_err();
        assert_eq!(
            err,
            SimilarityError::DimensionMismatch {
                left: 512,
                right: 128
            }
        );
    }

    #[test]
    fn test_zero_vector() {
        let err = cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).unwrap_err();
        assert_eq!(err, SimilarityError::ZeroVector);
        let err = cosine_similarity(&[], &[]).unwrap_err();
        assert_eq!(err, SimilarityError::ZeroVector);
    }

    #[test]
    fn test_nan_rejected() {
        let err = cosine_similarity(&[f32::NAN, 1.0], &[1.0, 0.0]).unwrap_err();
        assert_eq!(err, SimilarityError::NonFinite);
    }

    #[test]
    fn test_threshold_is_strict() {
        assert!(!passes(SIMILARITY_THRESHOLD, SIMILARITY_THRESHOLD));
        assert!(passes(0.8001, SIMILARITY_THRESHOLD));
        assert!(!passes(0.5, SIMILARITY_THRESHOLD));
    }

    #[test]
    fn test_large_magnitudes_do_not_overflow() {
        let sim = cosine_similarity(&[1e20, 0.0], &[1e20, 0.0]).unwrap();
        assert!((sim - 1.0).abs() < 1e-12, "got {sim}");

        let big = f32::MAX;
        let sim = cosine_similarity(&[big, big, big], &[big, 0.0, 0.0]).unwrap();
        assert!((sim - 1.0 / 3f64.sqrt()).abs() < 1e-12, "got {sim}");
    }

    #[test]
    fn test_tiny_magnitudes_are_not_zero() {
        let sim = cosine_similarity(&[1e-25, 0.0], &[1e-25, 0.0]).unwrap();
        assert!((sim - 1.0).abs() < 1e-12, "got {sim}");

        let tiny = f32::from_bits(1); // smallest subnormal
        let sim = cosine_similarity(&[tiny, 0.0], &[0.0, tiny]).unwrap();
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn test_threshold_is_exact_in_f64() {
        // 0.8 as an f32 is 0.800000011920929, which would pass an f64 0.8
        assert!(passes(f64::from(0.8f32), SIMILARITY_THRESHOLD));
        assert!(!passes(0.8, SIMILARITY_THRESHOLD));
    }
}
