//! Storage contract consulted by the index.
//!
//! The index owns no data: vectors live under their record id, and bucket
//! membership lives under `(permutation, hash)`. Backends are shared by every
//! concurrent task of a train or search call, so they must tolerate concurrent
//! reads/writes to different keys and must not lose members when several tasks
//! append to the same bucket at once.

pub mod memory;

pub use memory::{MemoryStore, StoreSnapshot};

use crate::error::Result;
use crate::vector::Vector;

/// Sequential producer of the ids in one bucket. `None` marks the end of the
/// bucket; `Some(Err(_))` is a backend failure.
pub type BucketIter<'a> = Box<dyn Iterator<Item = Result<String>> + 'a>;

/// A pluggable vector + bucket store.
pub trait Store: Send + Sync {
    /// Drop all vectors and bucket memberships.
    fn clear(&self) -> Result<()>;

    /// Insert or replace the vector stored under `id`.
    fn set_vector(&self, id: &str, vector: &Vector) -> Result<()>;

    /// Fetch the vector stored under `id`. Absent ids are an error.
    fn get_vector(&self, id: &str) -> Result<Vector>;

    /// Add `id` to the bucket `(permutation, hash)`.
    fn set_hash(&self, permutation: usize, hash: u64, id: &str) -> Result<()>;

    /// Iterate the ids in bucket `(permutation, hash)`. A missing bucket is empty.
    fn get_hash_iterator(&self, permutation: usize, hash: u64) -> Result<BucketIter<'_>>;
}
