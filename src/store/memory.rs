//! In-memory store backend

use super::{BucketIter, Store};
use crate::error::{LshError, Result};
use crate::persistence::serialization::{SerializedBucket, SerializedVector};
use crate::vector::Vector;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Bucket key: permutation index and hash value.
type BucketKey = (usize, u64);

/// Full contents of a [`MemoryStore`], in a serializable form.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub vectors: Vec<SerializedVector>,
    pub buckets: Vec<SerializedBucket>,
}

/// Thread-safe in-memory store. Buckets iterate their ids in sorted order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    vectors: RwLock<HashMap<String, Vector>>,
    buckets: RwLock<HashMap<BucketKey, BTreeSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.vectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of non-empty buckets across all permutations.
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    /// Ids in bucket `(permutation, hash)`, sorted.
    pub fn bucket(&self, permutation: usize, hash: u64) -> Vec<String> {
        self.buckets
            .read()
            .get(&(permutation, hash))
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// List all stored ids
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.vectors.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Copy out the full store contents.
    pub fn snapshot(&self) -> StoreSnapshot {
        let mut vectors: Vec<SerializedVector> = self
            .vectors
            .read()
            .iter()
            .map(|(id, vector)| SerializedVector {
                id: id.clone(),
                data: vector.as_slice().to_vec(),
            })
            .collect();
        vectors.sort_by(|a, b| a.id.cmp(&b.id));

        let mut buckets: Vec<SerializedBucket> = self
            .buckets
            .read()
            .iter()
            .map(|(&(permutation, hash), ids)| SerializedBucket {
                permutation,
                hash,
                ids: ids.iter().cloned().collect(),
            })
            .collect();
        buckets.sort_by_key(|b| (b.permutation, b.hash));

        StoreSnapshot { vectors, buckets }
    }

    /// Rebuild a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let vectors = snapshot
            .vectors
            .into_iter()
            .map(|sv| (sv.id, Vector::new(sv.data)))
            .collect();
        let buckets = snapshot
            .buckets
            .into_iter()
            .map(|b| ((b.permutation, b.hash), b.ids.into_iter().collect()))
            .collect();

        Self {
            vectors: RwLock::new(vectors),
            buckets: RwLock::new(buckets),
        }
    }
}

impl Store for MemoryStore {
    fn clear(&self) -> Result<()> {
        self.vectors.write().clear();
        self.buckets.write().clear();
        Ok(())
    }

    fn set_vector(&self, id: &str, vector: &Vector) -> Result<()> {
        self.vectors.write().insert(id.to_string(), vector.clone());
        Ok(())
    }

    fn get_vector(&self, id: &str) -> Result<Vector> {
        self.vectors
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| LshError::VectorNotFound { id: id.to_string() })
    }

    fn set_hash(&self, permutation: usize, hash: u64, id: &str) -> Result<()> {
        self.buckets
            .write()
            .entry((permutation, hash))
            .or_default()
            .insert(id.to_string());
        Ok(())
    }

    fn get_hash_iterator(&self, permutation: usize, hash: u64) -> Result<BucketIter<'_>> {
        // Snapshot the bucket so the lock is not held while the caller scans it.
        let ids = self.bucket(permutation, hash);
        Ok(Box::new(ids.into_iter().map(Ok)))
    }
}
