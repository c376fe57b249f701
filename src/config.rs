//! Index configuration: search policy plus hasher generation parameters.

use crate::distance::DistanceMetric;
use crate::error::{LshError, Result};
use crate::hasher::HasherConfig;
use crate::persistence::serialization;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_metric() -> String {
    DistanceMetric::Euclidean.name().to_string()
}

/// Parameters that govern how a search filters and caps candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Metric selector, resolved on every search (`"l2"`, `"cosine"`).
    #[serde(default = "default_metric")]
    pub distance_metric: String,
    /// Candidates are kept when `metric value <= distance_threshold`.
    pub distance_threshold: f32,
    /// Upper bound on returned neighbors.
    pub max_nn: usize,
    /// Worker threads for train/search fan-out. `None` uses rayon's default.
    #[serde(default)]
    pub workers: Option<usize>,
}

impl SearchConfig {
    /// Resolve the metric selector.
    pub fn metric(&self) -> Result<DistanceMetric> {
        DistanceMetric::from_name(&self.distance_metric)
    }
}

/// Everything needed to build an [`crate::LshIndex`].
///
/// The JSON form is flat:
///
/// ```json
/// {
///   "distance_metric": "l2", "distance_threshold": 0.5, "max_nn": 10,
///   "n_permutes": 8, "n_planes": 16, "bias_multiplier": 1.0, "dims": 3,
///   "mean": [0.0, 0.0, 0.0], "std": [1.0, 1.0, 1.0]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(flatten)]
    pub search: SearchConfig,
    #[serde(flatten)]
    pub hasher: HasherConfig,
    /// Per-dimension mean of the data, used to anchor hyperplanes.
    pub mean: Vec<f32>,
    /// Per-dimension standard deviation of the data.
    pub std: Vec<f32>,
}

impl IndexConfig {
    /// A config for `dims`-dimensional data centred at the origin with unit spread.
    pub fn new(dims: usize) -> Self {
        Self {
            search: SearchConfig {
                distance_metric: default_metric(),
                distance_threshold: 1.0,
                max_nn: 10,
                workers: None,
            },
            hasher: HasherConfig {
                n_permutes: 8,
                n_planes: 16,
                bias_multiplier: 1.0,
                dims,
                seed: None,
            },
            mean: vec![0.0; dims],
            std: vec![1.0; dims],
        }
    }

    /// Read and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        let config: IndexConfig = serialization::from_json(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn dims(&self) -> usize {
        self.hasher.dims
    }

    /// Check every structural invariant. The metric selector is not checked here;
    /// an unsupported selector surfaces as a distance error at search time.
    pub fn validate(&self) -> Result<()> {
        self.hasher.validate()?;
        validate_spread(&self.mean, &self.std, self.hasher.dims)?;

        if self.search.max_nn == 0 {
            return Err(LshError::Config("max_nn must be positive".to_string()));
        }
        if self.search.distance_threshold.is_nan() {
            return Err(LshError::Config(
                "distance_threshold must be a number".to_string(),
            ));
        }
        if self.search.workers == Some(0) {
            return Err(LshError::Config(
                "workers must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Validate the per-dimension mean/std vectors against `dims`.
pub(crate) fn validate_spread(mean: &[f32], std: &[f32], dims: usize) -> Result<()> {
    if mean.len() != dims || std.len() != dims {
        return Err(LshError::Config(format!(
            "mean and std must have {} entries, got {} and {}",
            dims,
            mean.len(),
            std.len()
        )));
    }
    if mean.iter().any(|m| !m.is_finite()) {
        return Err(LshError::Config("mean entries must be finite".to_string()));
    }
    if std.iter().any(|s| !s.is_finite() || *s < 0.0) {
        return Err(LshError::Config(
            "std entries must be finite and non-negative".to_string(),
        ));
    }
    Ok(())
}
