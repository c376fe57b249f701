//! Snapshot: save/open an index backed by a [`MemoryStore`] to/from a directory.
//!
//! Layout:
//! - `hasher.bin`: the hasher dump
//! - `snapshot.bin`: bincode store contents
//! - `manifest.json`: index configuration and counts, human readable

use crate::config::SearchConfig;
use crate::error::Result;
use crate::hasher::Hasher;
use crate::lsh::LshIndex;
use crate::persistence::serialization;
use crate::store::{MemoryStore, StoreSnapshot};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Human-readable description of a saved index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub search: SearchConfig,
    pub dims: usize,
    pub permutations: usize,
    pub vector_count: usize,
    pub bucket_count: usize,
}

/// Manages saving and loading index snapshots.
pub struct SnapshotManager {
    dir: PathBuf,
}

impl SnapshotManager {
    /// Create a snapshot manager for the given directory.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn hasher_path(&self) -> PathBuf {
        self.dir.join("hasher.bin")
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join("snapshot.bin")
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join("manifest.json")
    }

    /// Write the hasher, store contents and manifest of `index`.
    pub fn save(&self, index: &LshIndex<MemoryStore>) -> Result<Manifest> {
        fs::write(self.hasher_path(), index.dump_hasher()?)?;

        let store = index.store().snapshot();
        fs::write(self.snapshot_path(), serialization::to_bincode(&store)?)?;

        let manifest = Manifest {
            search: index.config().clone(),
            dims: index.dims(),
            permutations: index.hasher().n_permutations(),
            vector_count: store.vectors.len(),
            bucket_count: store.buckets.len(),
        };
        fs::write(self.manifest_path(), serialization::to_json(&manifest)?)?;

        info!(
            dir = %self.dir.display(),
            vectors = manifest.vector_count,
            "saved index snapshot"
        );
        Ok(manifest)
    }

    /// Reopen a saved index, or return None if the directory holds no index.
    pub fn open(&self) -> Result<Option<LshIndex<MemoryStore>>> {
        if !self.exists() {
            return Ok(None);
        }

        let manifest = self.manifest()?;
        let hasher = Hasher::load(&fs::read(self.hasher_path())?)?;

        let store = if self.snapshot_path().exists() {
            let bytes = fs::read(self.snapshot_path())?;
            let snapshot: StoreSnapshot = serialization::from_bincode(&bytes)?;
            MemoryStore::from_snapshot(snapshot)
        } else {
            MemoryStore::new()
        };

        let index = LshIndex::with_hasher(manifest.search, hasher, store)?;
        info!(
            dir = %self.dir.display(),
            vectors = index.store().len(),
            "opened index snapshot"
        );
        Ok(Some(index))
    }

    /// Read the manifest alone.
    pub fn manifest(&self) -> Result<Manifest> {
        serialization::from_json(&fs::read(self.manifest_path())?)
    }

    /// Check if an index has been saved here.
    pub fn exists(&self) -> bool {
        self.manifest_path().exists() && self.hasher_path().exists()
    }
}
