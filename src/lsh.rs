//! LSH index: trains a store from records and answers threshold queries.

use std::collections::HashSet;
use std::sync::mpsc::{self, SyncSender};
use std::time::Instant;

use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use crate::config::{IndexConfig, SearchConfig};
use crate::dedup::DedupSet;
use crate::distance::DistanceMetric;
use crate::error::{LshError, RecordFailure, Result};
use crate::hasher::Hasher;
use crate::store::Store;
use crate::vector::{Record, Vector};

/// Approximate nearest-neighbor index over a pluggable store.
pub struct LshIndex<S: Store> {
    config: SearchConfig,
    hasher: Hasher,
    store: S,
    pool: ThreadPool,
}

impl<S: Store> LshIndex<S> {
    /// Generate a fresh hasher from `config` and wrap `store`.
    pub fn new(config: IndexConfig, store: S) -> Result<Self> {
        config.validate()?;
        let hasher = Hasher::new(config.hasher.clone(), &config.mean, &config.std)?;
        Self::with_hasher(config.search, hasher, store)
    }

    /// Wrap `store` with an existing hasher, e.g. one restored from a dump.
    pub fn with_hasher(config: SearchConfig, hasher: Hasher, store: S) -> Result<Self> {
        if config.max_nn == 0 {
            return Err(LshError::Config("max_nn must be positive".to_string()));
        }
        if let Err(e) = config.metric() {
            warn!(error = %e, "index configured with an unsupported metric; searches will fail");
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers.unwrap_or(0))
            .thread_name(|i| format!("lsh-worker-{}", i))
            .build()
            .map_err(|e| LshError::Config(format!("cannot build worker pool: {}", e)))?;

        Ok(Self {
            config,
            hasher,
            store,
            pool,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn hasher(&self) -> &Hasher {
        &self.hasher
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn dims(&self) -> usize {
        self.hasher.dims()
    }

    /// Replace the index contents with `records`.
    ///
    /// The batch is validated before anything is written. Then the store is
    /// cleared and every record is indexed independently on the worker pool.
    /// Failed records do not stop the others; they are all reported together
    /// in [`LshError::TrainFailed`]. After a failure the store is partially
    /// rebuilt and the whole batch should be trained again.
    pub fn train(&self, records: &[Record]) -> Result<()> {
        let start = Instant::now();
        self.validate_batch(records)?;
        self.store.clear()?;

        let mut failures: Vec<RecordFailure> = self.pool.install(|| {
            records
                .par_iter()
                .filter_map(|record| {
                    self.index_record(record).err().map(|error| RecordFailure {
                        id: record.id.clone(),
                        error,
                    })
                })
                .collect()
        });

        if !failures.is_empty() {
            failures.sort_by(|a, b| a.id.cmp(&b.id));
            warn!(
                failed = failures.len(),
                total = records.len(),
                "training finished with failures"
            );
            return Err(LshError::TrainFailed {
                failures,
                total: records.len(),
            });
        }

        info!(
            records = records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "trained index"
        );
        Ok(())
    }

    fn validate_batch(&self, records: &[Record]) -> Result<()> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            record.vector.ensure_dimension(self.dims())?;
            if !seen.insert(record.id.as_str()) {
                return Err(LshError::DuplicateId {
                    id: record.id.clone(),
                });
            }
        }
        Ok(())
    }

    fn index_record(&self, record: &Record) -> Result<()> {
        self.store.set_vector(&record.id, &record.vector)?;
        let hashes = self.hasher.hashes(&record.vector)?;
        for (permutation, hash) in hashes.into_iter().enumerate() {
            self.store.set_hash(permutation, hash, &record.id)?;
        }
        Ok(())
    }

    /// Find up to `max_nn` stored records within the threshold of `query`.
    ///
    /// Every permutation's bucket is probed concurrently. At most one match per
    /// permutation is collected, so the result never holds more records than
    /// there are permutations, even if more candidates pass the threshold. Any
    /// error raised by a permutation task fails the whole call, regardless of
    /// how many matches were already queued. Result order is unspecified.
    pub fn search(&self, query: &Vector) -> Result<Vec<Record>> {
        let start = Instant::now();
        query.ensure_dimension(self.dims())?;
        let metric = self.config.metric()?;
        let hashes = self.hasher.hashes(query)?;
        let permutations = hashes.len();

        let selected = DedupSet::new();
        let failure: Mutex<Option<LshError>> = Mutex::new(None);
        let (matches, collected) = mpsc::sync_channel::<Record>(permutations);

        let (shared, failed) = (&selected, &failure);
        self.pool.scope(move |scope| {
            for (permutation, hash) in hashes.into_iter().enumerate() {
                let matches = matches.clone();
                scope.spawn(move |_| {
                    let outcome = self.probe_bucket(
                        permutation,
                        hash,
                        query,
                        metric,
                        shared,
                        failed,
                        &matches,
                    );
                    if let Err(e) = outcome {
                        let mut first = failed.lock();
                        if first.is_none() {
                            *first = Some(e);
                        }
                    }
                });
            }
        });

        if let Some(e) = failure.into_inner() {
            warn!(error = %e, "search failed");
            return Err(e);
        }
        let found: Vec<Record> = collected.into_iter().take(permutations).collect();

        debug!(
            permutations,
            selected = selected.len(),
            returned = found.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "search finished"
        );
        Ok(found)
    }

    #[allow(clippy::too_many_arguments)]
    fn probe_bucket(
        &self,
        permutation: usize,
        hash: u64,
        query: &Vector,
        metric: DistanceMetric,
        selected: &DedupSet,
        failure: &Mutex<Option<LshError>>,
        matches: &SyncSender<Record>,
    ) -> Result<()> {
        let max_nn = self.config.max_nn;
        if selected.len() >= max_nn {
            return Ok(());
        }

        for candidate in self.store.get_hash_iterator(permutation, hash)? {
            // Another permutation already failed the search.
            if failure.lock().is_some() {
                return Ok(());
            }

            let id = candidate?;
            if selected.contains(&id) {
                continue;
            }

            let vector = self.store.get_vector(&id)?;
            let value = metric.distance(&vector, query)?;
            if value <= self.config.distance_threshold && selected.select(&id, max_nn) {
                emit(matches, Record { id, vector });
            }

            if selected.len() >= max_nn {
                break;
            }
        }
        Ok(())
    }

    /// Serialize the hasher so the index can be reopened without resampling.
    pub fn dump_hasher(&self) -> Result<Vec<u8>> {
        self.hasher.dump()
    }

    /// Replace the hasher with one restored from [`LshIndex::dump_hasher`].
    ///
    /// Stored buckets are not rehashed; load the hasher the store was trained with.
    pub fn load_hasher(&mut self, bytes: &[u8]) -> Result<()> {
        let hasher = Hasher::load(bytes)?;
        info!(
            permutations = hasher.n_permutations(),
            dims = hasher.dims(),
            "loaded hasher"
        );
        self.hasher = hasher;
        Ok(())
    }
}

/// Queue a match without blocking. The queue holds exactly as many matches as
/// the collector reads, so anything that does not fit would never be read.
fn emit(matches: &SyncSender<Record>, record: Record) {
    let _ = matches.try_send(record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BucketIter, MemoryStore};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn search_config(metric: &str, threshold: f32, max_nn: usize) -> SearchConfig {
        SearchConfig {
            distance_metric: metric.to_string(),
            distance_threshold: threshold,
            max_nn,
            workers: Some(4),
        }
    }

    /// `n` permutations that all split on the sign of the first coordinate.
    fn x_sign_hasher(n: usize) -> Hasher {
        Hasher::from_planes(2, vec![(vec![vec![1.0, 0.0]], vec![0.0]); n]).unwrap()
    }

    fn ids(records: &[Record]) -> HashSet<String> {
        records.iter().map(|r| r.id.clone()).collect()
    }

    /// Store that fails on demand.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_clear: bool,
        fail_hash_for: Option<&'static str>,
        fail_get: bool,
        fail_get_for: Option<&'static str>,
        writes: AtomicUsize,
    }

    impl Store for FlakyStore {
        fn clear(&self) -> Result<()> {
            if self.fail_clear {
                return Err(LshError::StorageError("clear refused".to_string()));
            }
            self.inner.clear()
        }

        fn set_vector(&self, id: &str, vector: &Vector) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set_vector(id, vector)
        }

        fn get_vector(&self, id: &str) -> Result<Vector> {
            if self.fail_get || self.fail_get_for == Some(id) {
                return Err(LshError::StorageError("backend down".to_string()));
            }
            self.inner.get_vector(id)
        }

        fn set_hash(&self, permutation: usize, hash: u64, id: &str) -> Result<()> {
            if let Some(prefix) = self.fail_hash_for {
                if id.starts_with(prefix) {
                    return Err(LshError::StorageError(format!("cannot bucket {}", id)));
                }
            }
            self.inner.set_hash(permutation, hash, id)
        }

        fn get_hash_iterator(&self, permutation: usize, hash: u64) -> Result<BucketIter<'_>> {
            self.inner.get_hash_iterator(permutation, hash)
        }
    }

    #[test]
    fn test_two_point_scenario() {
        let index = LshIndex::with_hasher(
            search_config("l2", 0.5, 10),
            x_sign_hasher(1),
            MemoryStore::new(),
        )
        .unwrap();
        index
            .train(&[
                Record::new("A", vec![1.0, 0.0]),
                Record::new("B", vec![-1.0, 0.0]),
            ])
            .unwrap();

        assert_eq!(index.store().bucket(0, 1), vec!["A"]);
        assert_eq!(index.store().bucket(0, 0), vec!["B"]);

        let found = index.search(&Vector::new(vec![1.0, 0.0])).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "A");
        assert_eq!(found[0].vector.as_slice(), &[1.0, 0.0]);
    }

    #[test]
    fn test_bucket_miss_beats_threshold() {
        // B is within the threshold but never shares a bucket with the query.
        let index = LshIndex::with_hasher(
            search_config("l2", 100.0, 10),
            x_sign_hasher(1),
            MemoryStore::new(),
        )
        .unwrap();
        index
            .train(&[
                Record::new("A", vec![1.0, 0.0]),
                Record::new("B", vec![-1.0, 0.0]),
            ])
            .unwrap();

        let found = index.search(&Vector::new(vec![1.0, 0.0])).unwrap();
        assert_eq!(ids(&found), HashSet::from(["A".to_string()]));
    }

    #[test]
    fn test_duplicates_across_permutations_returned_once() {
        let index = LshIndex::with_hasher(
            search_config("l2", 1.0, 10),
            x_sign_hasher(4),
            MemoryStore::new(),
        )
        .unwrap();
        index
            .train(&[
                Record::new("a", vec![1.0, 0.0]),
                Record::new("b", vec![1.0, 0.5]),
            ])
            .unwrap();

        let found = index.search(&Vector::new(vec![1.0, 0.0])).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(ids(&found).len(), 2);
    }

    #[test]
    fn test_max_nn_caps_results() {
        let index = LshIndex::with_hasher(
            search_config("l2", 1.0, 2),
            x_sign_hasher(8),
            MemoryStore::new(),
        )
        .unwrap();
        let records: Vec<Record> = (0..6)
            .map(|i| Record::new(format!("r{}", i), vec![1.0, 0.0]))
            .collect();
        index.train(&records).unwrap();

        let found = index.search(&Vector::new(vec![1.0, 0.0])).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_collection_is_bounded_by_permutation_count() {
        // One permutation means one collected event, however many records match.
        let index = LshIndex::with_hasher(
            search_config("l2", 1.0, 10),
            x_sign_hasher(1),
            MemoryStore::new(),
        )
        .unwrap();
        let records: Vec<Record> = (0..5)
            .map(|i| Record::new(format!("r{}", i), vec![1.0, 0.0]))
            .collect();
        index.train(&records).unwrap();

        let found = index.search(&Vector::new(vec![1.0, 0.0])).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_cosine_keeps_values_at_or_below_threshold() {
        let index = LshIndex::with_hasher(
            search_config("cosine", 0.5, 10),
            x_sign_hasher(2),
            MemoryStore::new(),
        )
        .unwrap();
        index
            .train(&[
                // similarity 1.0 with the query: above the threshold, dropped
                Record::new("same", vec![1.0, 0.0]),
                // similarity ~0.316: kept
                Record::new("wide", vec![1.0, 3.0]),
            ])
            .unwrap();

        let found = index.search(&Vector::new(vec![1.0, 0.0])).unwrap();
        assert_eq!(ids(&found), HashSet::from(["wide".to_string()]));
    }

    #[test]
    fn test_unsupported_metric_fails_even_when_empty() {
        let index = LshIndex::with_hasher(
            search_config("manhattan", 1.0, 10),
            x_sign_hasher(2),
            MemoryStore::new(),
        )
        .unwrap();
        let err = index.search(&Vector::new(vec![1.0, 0.0])).unwrap_err();
        assert!(matches!(err, LshError::UnsupportedMetric { .. }));
        assert!(err.is_distance_error());
    }

    #[test]
    fn test_retrain_replaces_contents() {
        let index = LshIndex::with_hasher(
            search_config("l2", 1.0, 10),
            x_sign_hasher(4),
            MemoryStore::new(),
        )
        .unwrap();
        index
            .train(&[Record::new("old1", vec![1.0, 0.0]), Record::new("old2", vec![1.0, 0.1])])
            .unwrap();
        index
            .train(&[Record::new("new1", vec![1.0, 0.0])])
            .unwrap();

        assert_eq!(index.store().list_ids(), vec!["new1"]);
        let found = index.search(&Vector::new(vec![1.0, 0.0])).unwrap();
        assert_eq!(ids(&found), HashSet::from(["new1".to_string()]));
    }

    #[test]
    fn test_invalid_batch_leaves_store_untouched() {
        let index = LshIndex::with_hasher(
            search_config("l2", 1.0, 10),
            x_sign_hasher(1),
            MemoryStore::new(),
        )
        .unwrap();
        index.train(&[Record::new("keep", vec![1.0, 0.0])]).unwrap();

        let err = index
            .train(&[Record::new("x", vec![1.0, 0.0]), Record::new("x", vec![0.5, 0.0])])
            .unwrap_err();
        assert!(matches!(err, LshError::DuplicateId { .. }));

        let err = index
            .train(&[Record::new("y", vec![1.0, 0.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, LshError::DimensionMismatch { .. }));

        assert_eq!(index.store().list_ids(), vec!["keep"]);
    }

    #[test]
    fn test_query_dimension_checked() {
        let index = LshIndex::with_hasher(
            search_config("l2", 1.0, 10),
            x_sign_hasher(1),
            MemoryStore::new(),
        )
        .unwrap();
        assert!(matches!(
            index.search(&Vector::new(vec![1.0])),
            Err(LshError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_clear_failure_aborts_before_writes() {
        let store = FlakyStore {
            fail_clear: true,
            ..Default::default()
        };
        let index =
            LshIndex::with_hasher(search_config("l2", 1.0, 10), x_sign_hasher(1), store).unwrap();

        let err = index.train(&[Record::new("a", vec![1.0, 0.0])]).unwrap_err();
        assert!(matches!(err, LshError::StorageError(_)));
        assert_eq!(index.store().writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_record_failures_are_aggregated() {
        let store = FlakyStore {
            fail_hash_for: Some("bad"),
            ..Default::default()
        };
        let index =
            LshIndex::with_hasher(search_config("l2", 1.0, 10), x_sign_hasher(2), store).unwrap();

        let records = vec![
            Record::new("good1", vec![1.0, 0.0]),
            Record::new("bad2", vec![1.0, 0.0]),
            Record::new("good3", vec![-1.0, 0.0]),
            Record::new("bad1", vec![-1.0, 0.0]),
        ];
        match index.train(&records).unwrap_err() {
            LshError::TrainFailed { failures, total } => {
                assert_eq!(total, 4);
                let failed: Vec<&str> = failures.iter().map(|f| f.id.as_str()).collect();
                assert_eq!(failed, vec!["bad1", "bad2"]);
                assert!(failures
                    .iter()
                    .all(|f| matches!(f.error, LshError::StorageError(_))));
            }
            other => panic!("unexpected error: {}", other),
        }

        // Healthy records were still indexed.
        assert_eq!(index.store().inner.bucket(0, 1), vec!["good1"]);
        assert_eq!(index.store().inner.bucket(1, 0), vec!["good3"]);
    }

    #[test]
    fn test_storage_error_fails_search() {
        let index = LshIndex::with_hasher(
            search_config("l2", 1.0, 10),
            x_sign_hasher(2),
            FlakyStore {
                fail_get: true,
                ..Default::default()
            },
        )
        .unwrap();
        index.train(&[Record::new("a", vec![1.0, 0.0])]).unwrap();

        assert!(matches!(
            index.search(&Vector::new(vec![1.0, 0.0])),
            Err(LshError::StorageError(_))
        ));
    }

    #[test]
    fn test_storage_error_not_masked_by_full_queue() {
        // Permutation x puts a and b with the query; permutation y puts bad there.
        let x_plane = (vec![vec![1.0, 0.0]], vec![0.0]);
        let y_plane = (vec![vec![0.0, 1.0]], vec![0.0]);
        let layouts = [
            vec![x_plane.clone(), y_plane.clone()],
            vec![y_plane, x_plane],
        ];

        for planes in layouts {
            let hasher = Hasher::from_planes(2, planes).unwrap();
            let store = FlakyStore {
                fail_get_for: Some("bad"),
                ..Default::default()
            };
            let index =
                LshIndex::with_hasher(search_config("l2", 100.0, 10), hasher, store).unwrap();
            index
                .train(&[
                    Record::new("a", vec![1.0, -1.0]),
                    Record::new("b", vec![2.0, -1.0]),
                    Record::new("bad", vec![-1.0, 1.0]),
                ])
                .unwrap();

            for _ in 0..100 {
                assert!(matches!(
                    index.search(&Vector::new(vec![1.0, 1.0])),
                    Err(LshError::StorageError(_))
                ));
            }
        }
    }

    #[test]
    fn test_generated_index_finds_exact_match() {
        let mut config = IndexConfig::new(4);
        config.hasher.seed = Some(11);
        config.search.distance_threshold = 1e-3;
        let index = LshIndex::new(config, MemoryStore::new()).unwrap();

        let records: Vec<Record> = (0..50)
            .map(|i| {
                let x = i as f32;
                Record::new(format!("v{}", i), vec![x.sin(), x.cos(), x * 0.1, -x * 0.05])
            })
            .collect();
        index.train(&records).unwrap();

        let found = index.search(&records[17].vector).unwrap();
        assert_eq!(ids(&found), HashSet::from(["v17".to_string()]));
    }

    #[test]
    fn test_hasher_dump_and_load() {
        let mut config = IndexConfig::new(3);
        config.hasher.seed = Some(3);
        let mut index = LshIndex::new(config.clone(), MemoryStore::new()).unwrap();
        let query = Vector::new(vec![0.2, -0.4, 1.0]);
        let before = index.hasher().hashes(&query).unwrap();
        let blob = index.dump_hasher().unwrap();

        config.hasher.seed = Some(4);
        let other = LshIndex::new(config, MemoryStore::new()).unwrap();
        let mut other_blob = other.dump_hasher().unwrap();
        index.load_hasher(&other_blob).unwrap();
        assert_ne!(index.hasher().hashes(&query).unwrap(), before);

        index.load_hasher(&blob).unwrap();
        assert_eq!(index.hasher().hashes(&query).unwrap(), before);

        other_blob.truncate(8);
        assert!(index.load_hasher(&other_blob).is_err());
        assert_eq!(index.hasher().hashes(&query).unwrap(), before);
    }
}
