//! Cosine similarity primitive used by the in-memory vector store.

use crate::error::RagError;

/// Cosine similarity between two vectors: `dot(a,b) / (|a| * |b|)`.
///
/// Returns a value in `[-1, 1]`. If either vector has zero magnitude the
/// similarity is defined to be `0.0` rather than dividing by zero. Vectors
/// of different lengths are a [`RagError::DimensionMismatch`].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, RagError> {
    if a.len() != b.len() {
        return Err(RagError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = vec![0.3, -1.2, 4.5, 0.0];
        let score = cosine_similarity(&v, &v).unwrap();
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn opposite_vectors_score_negative_one() {
        let a = vec![2.0, 1.0];
        let b = vec![-2.0, -1.0];
        let score = cosine_similarity(&a, &b).unwrap();
        assert!((score + 1.0).abs() < 1e-6);
    }

    #[test]
    fn symmetric() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-4.0, 0.5, 2.0];
        let ab = cosine_similarity(&a, &b).unwrap();
        let ba = cosine_similarity(&b, &a).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn zero_magnitude_is_zero_not_nan() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 2.0, 3.0];
        let score = cosine_similarity(&zero, &v).unwrap();
        assert_eq!(score, 0.0);
        assert!(!score.is_nan());
    }

    #[test]
    fn mismatched_lengths_error() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];
        match cosine_similarity(&a, &b) {
            Err(RagError::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("expected dimension mismatch, got {other:?}"),
        }
    }
}
