//! Serialization utilities: bincode for hasher/store state, JSON for config and manifests.

use crate::error::{LshError, Result};
use serde::{Deserialize, Serialize};

/// Serializable representation of a stored vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedVector {
    pub id: String,
    pub data: Vec<f32>,
}

/// Serializable representation of one bucket's membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedBucket {
    pub permutation: usize,
    pub hash: u64,
    pub ids: Vec<String>,
}

/// Encode data to bincode bytes.
pub fn to_bincode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| LshError::SerializationError(e.to_string()))
}

/// Decode data from bincode bytes.
pub fn from_bincode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| LshError::SerializationError(e.to_string()))
}

/// Encode data to pretty-printed JSON bytes.
pub fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| LshError::SerializationError(e.to_string()))
}

/// Decode data from JSON bytes.
pub fn from_json<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| LshError::SerializationError(e.to_string()))
}
