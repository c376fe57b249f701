//! Distance metrics for vector similarity

use crate::error::{LshError, Result};
use crate::vector::Vector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metrics a search can compare candidates with.
///
/// Search keeps a candidate when `distance(candidate, query) <= threshold`,
/// whichever metric is selected. For [`DistanceMetric::Cosine`] the value is
/// the raw similarity, so the comparison keeps the *less* similar candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Euclidean (L2) distance
    Euclidean,
    /// Cosine similarity (not converted to a distance)
    Cosine,
}

impl DistanceMetric {
    /// Resolve a metric selector such as `"l2"` or `"cosine"`.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(DistanceMetric::Euclidean),
            "cosine" => Ok(DistanceMetric::Cosine),
            _ => Err(LshError::UnsupportedMetric {
                name: name.to_string(),
            }),
        }
    }

    /// Canonical selector name.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "l2",
            DistanceMetric::Cosine => "cosine",
        }
    }

    /// Compute the metric value between two vectors
    pub fn distance(&self, v1: &Vector, v2: &Vector) -> Result<f32> {
        v2.ensure_dimension(v1.dimension())?;

        match self {
            DistanceMetric::Euclidean => Ok(euclidean_distance(v1, v2)),
            DistanceMetric::Cosine => cosine_similarity(v1, v2),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = LshError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compute Euclidean (L2) distance between two vectors
pub fn euclidean_distance(v1: &Vector, v2: &Vector) -> f32 {
    v1.as_slice()
        .iter()
        .zip(v2.as_slice().iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Compute cosine similarity between two vectors, in [-1, 1]
pub fn cosine_similarity(v1: &Vector, v2: &Vector) -> Result<f32> {
    let norm1 = v1.norm();
    let norm2 = v2.norm();

    if norm1 == 0.0 || norm2 == 0.0 {
        return Err(LshError::Distance {
            reason: "cosine similarity is undefined for a zero vector".to_string(),
        });
    }

    let similarity = dot_product(v1, v2) / (norm1 * norm2);

    // Clamp to [-1, 1] to handle floating point errors
    Ok(similarity.clamp(-1.0, 1.0))
}

/// Compute dot product of two vectors
pub fn dot_product(v1: &Vector, v2: &Vector) -> f32 {
    v1.as_slice()
        .iter()
        .zip(v2.as_slice().iter())
        .map(|(a, b)| a * b)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_euclidean_distance() {
        let v1 = Vector::new(vec![1.0, 2.0, 3.0]);
        let v2 = Vector::new(vec![4.0, 5.0, 6.0]);
        assert_relative_eq!(euclidean_distance(&v1, &v2), 5.196152, epsilon = 1e-5);
    }

    #[test]
    fn test_euclidean_same_vector() {
        let v = Vector::new(vec![1.0, 2.0, 3.0]);
        assert_relative_eq!(euclidean_distance(&v, &v), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let v1 = Vector::new(vec![2.0, 0.0, 0.0]);
        let v2 = Vector::new(vec![1.0, 0.0, 0.0]);
        assert_relative_eq!(cosine_similarity(&v1, &v2).unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal_and_opposite() {
        let x = Vector::new(vec![1.0, 0.0]);
        let y = Vector::new(vec![0.0, 1.0]);
        let neg_x = Vector::new(vec![-1.0, 0.0]);
        assert_relative_eq!(cosine_similarity(&x, &y).unwrap(), 0.0, epsilon = 1e-6);
        assert_relative_eq!(cosine_similarity(&x, &neg_x).unwrap(), -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let zero = Vector::new(vec![0.0, 0.0]);
        let x = Vector::new(vec![1.0, 0.0]);
        let err = DistanceMetric::Cosine.distance(&zero, &x).unwrap_err();
        assert!(err.is_distance_error());
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(DistanceMetric::from_name("l2").unwrap(), DistanceMetric::Euclidean);
        assert_eq!(
            DistanceMetric::from_name("Euclidean").unwrap(),
            DistanceMetric::Euclidean
        );
        assert_eq!("cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!(DistanceMetric::Cosine.to_string(), "cosine");
    }

    #[test]
    fn test_unsupported_metric() {
        assert!(matches!(
            DistanceMetric::from_name("manhattan"),
            Err(LshError::UnsupportedMetric { .. })
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let v1 = Vector::new(vec![1.0, 2.0]);
        let v2 = Vector::new(vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            DistanceMetric::Euclidean.distance(&v1, &v2),
            Err(LshError::DimensionMismatch { .. })
        ));
    }
}
