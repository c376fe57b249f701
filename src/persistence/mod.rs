//! Persistence layer: serialization helpers and index snapshots.

pub mod serialization;
pub mod snapshot;

pub use snapshot::{Manifest, SnapshotManager};
