//! Random-hyperplane hasher.
//!
//! Each permutation owns `n_planes` hyperplanes. A vector's hash under a
//! permutation is the bit pattern of which side of every hyperplane it falls on:
//! bit `i` is set when `dot(vector, plane_i) + bias_i > 0`. Because each plane
//! contributes one bit of a `u64`, a permutation holds at most 64 planes.

use crate::config::validate_spread;
use crate::error::{LshError, Result};
use crate::persistence::serialization;
use crate::vector::Vector;
use ndarray::{Array1, Array2, ArrayView1};
use ndarray_rand::rand_distr::{Distribution, Normal, StandardNormal};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Maximum hyperplanes per permutation (one bit each in a `u64`).
pub const MAX_PLANES: usize = 64;

/// Bumped whenever the serialized hasher layout changes.
const HASHER_FORMAT_VERSION: u32 = 1;

/// Parameters for generating a [`Hasher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HasherConfig {
    /// Number of independent hash permutations.
    pub n_permutes: usize,
    /// Hyperplanes per permutation.
    pub n_planes: usize,
    /// Scales the spread of the points hyperplanes are anchored at.
    pub bias_multiplier: f32,
    /// Vector dimensionality.
    pub dims: usize,
    /// RNG seed for reproducible generation.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl HasherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dims == 0 {
            return Err(LshError::Config("dims must be positive".to_string()));
        }
        if self.n_permutes == 0 {
            return Err(LshError::Config("n_permutes must be positive".to_string()));
        }
        if self.n_planes == 0 || self.n_planes > MAX_PLANES {
            return Err(LshError::Config(format!(
                "n_planes must be in 1..={}, got {}",
                MAX_PLANES, self.n_planes
            )));
        }
        if !self.bias_multiplier.is_finite() || self.bias_multiplier < 0.0 {
            return Err(LshError::Config(
                "bias_multiplier must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hyperplanes and offsets of a single permutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Permutation {
    /// `n_planes x dims`, one hyperplane normal per row.
    planes: Array2<f32>,
    /// One offset per hyperplane.
    bias: Array1<f32>,
}

impl Permutation {
    fn hash(&self, vector: ArrayView1<'_, f32>) -> u64 {
        let projections = self.planes.dot(&vector) + &self.bias;
        projections
            .iter()
            .enumerate()
            .fold(0u64, |hash, (bit, &p)| if p > 0.0 { hash | (1 << bit) } else { hash })
    }
}

/// Serialized form of a hasher.
#[derive(Serialize, Deserialize)]
struct HasherState {
    version: u32,
    config: HasherConfig,
    permutations: Vec<Permutation>,
}

/// Owns the random projections of every permutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Hasher {
    config: HasherConfig,
    permutations: Vec<Permutation>,
}

impl Hasher {
    /// Sample fresh hyperplanes for every permutation.
    ///
    /// Plane normals are standard normal. Each plane is anchored at a point whose
    /// coordinate `j` is drawn from `Normal(mean[j], std[j] * bias_multiplier)`,
    /// so the half-space offsets follow the data's spread rather than the
    /// normals' directions.
    pub fn new(config: HasherConfig, mean: &[f32], std: &[f32]) -> Result<Self> {
        config.validate()?;
        validate_spread(mean, std, config.dims)?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let anchors = mean
            .iter()
            .zip(std)
            .map(|(&m, &s)| {
                Normal::new(m, s * config.bias_multiplier)
                    .map_err(|e| LshError::Config(format!("invalid spread: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut permutations = Vec::with_capacity(config.n_permutes);
        for _ in 0..config.n_permutes {
            let planes: Array2<f32> =
                Array2::random_using((config.n_planes, config.dims), StandardNormal, &mut rng);
            let mut bias = Array1::<f32>::zeros(config.n_planes);
            for (offset, normal) in bias.iter_mut().zip(planes.rows()) {
                let anchor: f32 = normal
                    .iter()
                    .zip(&anchors)
                    .map(|(n, dist)| n * dist.sample(&mut rng))
                    .sum();
                *offset = -anchor;
            }
            permutations.push(Permutation { planes, bias });
        }

        info!(
            permutations = config.n_permutes,
            planes = config.n_planes,
            dims = config.dims,
            seeded = config.seed.is_some(),
            "generated hasher"
        );

        Ok(Self {
            config,
            permutations,
        })
    }

    /// Build a hasher from explicit hyperplanes: one `(planes, biases)` pair per
    /// permutation, each plane of length `dims`.
    pub fn from_planes(dims: usize, permutations: Vec<(Vec<Vec<f32>>, Vec<f32>)>) -> Result<Self> {
        let n_permutes = permutations.len();
        let n_planes = permutations.first().map(|(planes, _)| planes.len()).unwrap_or(0);
        let config = HasherConfig {
            n_permutes,
            n_planes,
            bias_multiplier: 1.0,
            dims,
            seed: None,
        };
        config.validate()?;

        let permutations = permutations
            .into_iter()
            .map(|(planes, bias)| {
                if planes.len() != n_planes || bias.len() != n_planes {
                    return Err(LshError::Config(format!(
                        "every permutation needs {} planes and biases",
                        n_planes
                    )));
                }
                if planes.iter().any(|p| p.len() != dims) {
                    return Err(LshError::Config(format!(
                        "every plane needs {} components",
                        dims
                    )));
                }
                let flat: Vec<f32> = planes.into_iter().flatten().collect();
                let planes = Array2::from_shape_vec((n_planes, dims), flat)
                    .map_err(|e| LshError::Config(e.to_string()))?;
                Ok(Permutation {
                    planes,
                    bias: Array1::from(bias),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            permutations,
        })
    }

    pub fn config(&self) -> &HasherConfig {
        &self.config
    }

    pub fn dims(&self) -> usize {
        self.config.dims
    }

    pub fn n_permutations(&self) -> usize {
        self.permutations.len()
    }

    /// One hash value per permutation, indexed by permutation.
    pub fn hashes(&self, vector: &Vector) -> Result<Vec<u64>> {
        vector.ensure_dimension(self.config.dims)?;
        let view = ArrayView1::from(vector.as_slice());
        Ok(self.permutations.iter().map(|p| p.hash(view)).collect())
    }

    /// Serialize hyperplanes, biases and configuration.
    pub fn dump(&self) -> Result<Vec<u8>> {
        serialization::to_bincode(&HasherState {
            version: HASHER_FORMAT_VERSION,
            config: self.config.clone(),
            permutations: self.permutations.clone(),
        })
    }

    /// Restore a hasher written by [`Hasher::dump`].
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let state: HasherState = serialization::from_bincode(bytes)?;
        if state.version != HASHER_FORMAT_VERSION {
            return Err(LshError::SerializationError(format!(
                "unsupported hasher format version {}",
                state.version
            )));
        }

        let config = state.config;
        config
            .validate()
            .map_err(|e| LshError::SerializationError(format!("corrupt hasher config: {}", e)))?;
        if state.permutations.len() != config.n_permutes {
            return Err(LshError::SerializationError(format!(
                "expected {} permutations, found {}",
                config.n_permutes,
                state.permutations.len()
            )));
        }
        let expected_shape = [config.n_planes, config.dims];
        for p in &state.permutations {
            if p.planes.shape() != expected_shape || p.bias.len() != config.n_planes {
                return Err(LshError::SerializationError(
                    "hyperplane shape does not match hasher config".to_string(),
                ));
            }
        }

        Ok(Self {
            config,
            permutations: state.permutations,
        })
    }
}
