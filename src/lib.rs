//! # LSH Search
//!
//! Approximate nearest-neighbor search built on random-hyperplane
//! locality-sensitive hashing.
//!
//! This library provides:
//! - A multi-permutation hyperplane hasher with dump/load
//! - An index that trains a pluggable store and answers threshold queries
//!   concurrently across permutations
//! - Distance metrics (Euclidean, Cosine)
//! - An in-memory store, directory snapshots and an HTTP server
//!
//! ## Example
//!
//! ```rust
//! use lsh_search::{IndexConfig, LshIndex, MemoryStore, Record, Vector};
//!
//! let mut config = IndexConfig::new(3);
//! config.hasher.seed = Some(42);
//! config.search.distance_threshold = 0.5;
//!
//! let index = LshIndex::new(config, MemoryStore::new()).unwrap();
//! index
//!     .train(&[
//!         Record::new("v1", vec![1.0, 2.0, 3.0]),
//!         Record::new("v2", vec![-3.0, 0.5, 9.0]),
//!     ])
//!     .unwrap();
//!
//! let found = index.search(&Vector::new(vec![1.0, 2.0, 3.0])).unwrap();
//! assert_eq!(found[0].id, "v1");
//! ```

pub mod config;
pub mod dedup;
pub mod distance;
pub mod error;
pub mod hasher;
pub mod lsh;
pub mod metrics;
pub mod persistence;
pub mod server;
pub mod store;
pub mod vector;

pub use config::{IndexConfig, SearchConfig};
pub use dedup::DedupSet;
pub use distance::DistanceMetric;
pub use error::{LshError, RecordFailure, Result};
pub use hasher::{Hasher, HasherConfig};
pub use lsh::LshIndex;
pub use store::{MemoryStore, Store};
pub use vector::{Record, Vector};
