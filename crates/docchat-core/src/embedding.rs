//! Embedding provider trait and vector math.
//!
//! Holds the [`EmbeddingProvider`] trait, the [`DistanceMetric`] a vector
//! index is created with, and pure helpers for vector serialization and
//! similarity.
//!
//! Concrete providers (OpenAI, local hashing) live in the `docchat` app
//! crate.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Turns text into fixed-length vectors.
///
/// An embedder is treated as a pure function from text to a vector of
/// [`dims`](EmbeddingProvider::dims) floats. Transport failures, timeouts and
/// malformed responses must surface as [`RagError::EmbeddingUnavailable`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, recorded in stats.
    fn model_name(&self) -> &str;
    /// Length of every vector this provider returns.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
///
/// Convenience wrapper around [`EmbeddingProvider::embed`] for the read path.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let results = provider.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| RagError::EmbeddingUnavailable("empty embedding response".to_string()))
}

/// Distance function a vector index ranks by. Fixed at index creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cosine_similarity`, in `[0, 2]`.
    #[default]
    Cosine,
    /// Euclidean distance.
    L2,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
        }
    }

    /// Distance between two vectors of equal length. Lower is closer.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
            DistanceMetric::L2 => l2_distance(a, b),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cosine" => Ok(DistanceMetric::Cosine),
            "l2" => Ok(DistanceMetric::L2),
            other => Err(RagError::config(format!(
                "unknown distance metric: '{}'. Must be cosine or l2.",
                other
            ))),
        }
    }
}

/// Little-endian `f32` bytes, 4 per component, as stored in the SQLite
/// `chunks.embedding` column.
///
/// ```rust
/// use docchat_core::embedding::{blob_to_vec, vec_to_blob};
///
/// let v = [0.5f32, -1.0];
/// assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`vec_to_blob`]. Trailing bytes that do not form a whole
/// `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine of the angle between `a` and `b`, in `[-1, 1]`.
///
/// Zero when either vector is empty or all zeros, or when the lengths
/// differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, aa, bb), (x, y)| {
            (dot + x * y, aa + x * x, bb + y * y)
        });
    let norms = (aa * bb).sqrt();
    if norms < f32::EPSILON {
        0.0
    } else {
        dot / norms
    }
}

/// Euclidean distance. Vectors of different lengths are compared over the
/// shared prefix; callers check dimensions first.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_codec() {
        let v = vec![0.25f32, -7.0, 1e-3, 0.0];
        let blob = vec_to_blob(&v);
        assert_eq!(blob.len(), 16);
        assert_eq!(blob_to_vec(&blob), v);
        assert_eq!(blob_to_vec(&blob[..6]), vec![0.25]);
    }

    #[test]
    fn test_cosine_distance_range() {
        let x = [2.0, 0.0];
        let y = [0.0, 5.0];
        let neg = [-1.0, 0.0];
        assert!(DistanceMetric::Cosine.distance(&x, &x).abs() < 1e-6);
        assert!((DistanceMetric::Cosine.distance(&x, &y) - 1.0).abs() < 1e-6);
        assert!((DistanceMetric::Cosine.distance(&x, &neg) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_l2_distance() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        assert!((l2_distance(&a, &b) - 5.0).abs() < 1e-6);
        assert_eq!(DistanceMetric::L2.distance(&b, &b), 0.0);
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!("l2".parse::<DistanceMetric>().unwrap(), DistanceMetric::L2);
        assert!("dot".parse::<DistanceMetric>().is_err());
    }
}
