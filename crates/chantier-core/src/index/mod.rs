//! Search index: trigram postings, facet membership, snapshot versioning.
//!
//! The index is a derived, disposable structure. It holds no authoritative
//! state: `rebuild_from` can discard and recompute everything from a full
//! store scan at any time. Incremental updates flow in through
//! [`SearchIndex::apply`], driven by store change notifications.
//!
//! # Concurrency contract
//!
//! - Updates to one shingle's posting set are mutually exclusive; updates
//!   to different shingles proceed concurrently (sharded locks).
//! - Notification applies are serialized against each other, so hydration
//!   and the index mutation of one change form a single atomic step.
//! - Readers never take the rebuild gate. They work on an `Arc` snapshot of
//!   the index and may observe a state that is concurrently mutating
//!   (eventual consistency), but never freed memory or a torn posting set.
//! - `rebuild_from` takes the gate exclusively, halting incremental updates
//!   while it builds a fresh index off to the side, then swaps it in
//!   atomically. Readers continue on the old index until the swap.

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::record::{now_millis, ChangeKind, ChangeNotification, RecordId, TaskRecord};
use crate::store::CatalogStore;

pub mod facet;
pub mod trigram;

#[cfg(test)]
mod thread_safety_tests;

pub use facet::{FacetFilters, FacetIndex};
pub use trigram::{extract_trigrams, jaccard, Trigram, TrigramIndex};

/// Bidirectional mapping between record ids and dense u32 slots.
///
/// Roaring bitmaps are u32-keyed; record ids are 128-bit. Slots are
/// allocated once per id and never reused, so a stale posting can never
/// alias a different record.
#[derive(Debug, Default)]
pub struct IdTable {
    id_to_slot: DashMap<RecordId, u32>,
    slot_to_id: DashMap<u32, RecordId>,
    next_slot: AtomicU32,
}

impl IdTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for an id, allocating one if absent.
    ///
    /// Concurrent calls with the same id agree on one slot.
    pub fn register(&self, id: RecordId) -> u32 {
        use dashmap::mapref::entry::Entry;
        match self.id_to_slot.entry(id) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let slot = self.next_slot.fetch_add(1, Ordering::SeqCst);
                entry.insert(slot);
                self.slot_to_id.insert(slot, id);
                slot
            }
        }
    }

    /// Removes an id, returning its slot if it was registered.
    pub fn remove(&self, id: RecordId) -> Option<u32> {
        let (_, slot) = self.id_to_slot.remove(&id)?;
        self.slot_to_id.remove(&slot);
        Some(slot)
    }

    /// Slot for an id, if registered.
    #[must_use]
    pub fn slot_of(&self, id: RecordId) -> Option<u32> {
        self.id_to_slot.get(&id).map(|r| *r)
    }

    /// Id for a slot, if registered.
    #[must_use]
    pub fn id_of(&self, slot: u32) -> Option<RecordId> {
        self.slot_to_id.get(&slot).map(|r| *r)
    }

    /// Number of registered ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.id_to_slot.len()
    }

    /// True if no ids are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id_to_slot.is_empty()
    }
}

/// One generation of the index: trigram postings, facets, id mapping.
///
/// Lives behind an `ArcSwap`; readers pin a generation with an `Arc` clone
/// and keep it alive across a rebuild swap.
#[derive(Debug)]
pub struct IndexInner {
    /// Id ↔ slot mapping.
    pub ids: IdTable,
    /// Trigram postings per indexed field.
    pub trigrams: TrigramIndex,
    /// Facet membership.
    pub facets: FacetIndex,
}

impl IndexInner {
    fn new(shard_count: usize) -> Self {
        Self {
            ids: IdTable::new(),
            trigrams: TrigramIndex::new(shard_count),
            facets: FacetIndex::new(),
        }
    }

    /// Indexes or re-indexes a record.
    pub fn upsert(&self, record: &TaskRecord) {
        let slot = self.ids.register(record.id);
        self.trigrams.upsert(slot, record);
        self.facets.set(slot, &record.discipline, &record.resource_type);
    }

    /// Removes a record from every derived structure. Idempotent.
    pub fn remove(&self, id: RecordId) {
        if let Some(slot) = self.ids.remove(id) {
            self.trigrams.remove(slot);
            self.facets.clear(slot);
        }
    }
}

/// A pinned view of the index taken at a point in time.
///
/// Read-only consumers record and report the version they observed.
#[derive(Clone)]
pub struct IndexSnapshot {
    /// The pinned index generation.
    pub inner: Arc<IndexInner>,
    /// Index version at snapshot time.
    pub version: u64,
    /// When the snapshot was taken.
    pub taken_at: Instant,
}

impl IndexSnapshot {
    /// Age of this snapshot.
    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.taken_at.elapsed()
    }
}

/// Operational statistics, reported by the healthcheck.
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    /// Number of indexed records.
    pub doc_count: u64,
    /// Number of unique shingles.
    pub trigram_count: usize,
    /// Estimated memory usage in bytes.
    pub memory_bytes: usize,
    /// Monotonically increasing change counter.
    pub version: u64,
    /// Last full rebuild, epoch milliseconds. Zero if never rebuilt.
    pub last_rebuilt_ms: i64,
    /// True if an incremental failure has scheduled a rebuild.
    pub needs_rebuild: bool,
}

/// The shared search index: current generation plus versioning and the
/// rebuild machinery.
pub struct SearchIndex {
    inner: ArcSwap<IndexInner>,
    /// Bumped on every applied change and on rebuild.
    version: AtomicU64,
    /// Incremental `apply` holds this shared; `rebuild_from` exclusively.
    rebuild_gate: RwLock<()>,
    /// Serializes notification application against itself.
    apply_lock: Mutex<()>,
    last_rebuilt_ms: AtomicI64,
    needs_rebuild: AtomicBool,
    shard_count: usize,
}

impl SearchIndex {
    /// Creates an empty index with the given posting shard count.
    #[must_use]
    pub fn new(shard_count: usize) -> Self {
        Self {
            inner: ArcSwap::from_pointee(IndexInner::new(shard_count)),
            version: AtomicU64::new(0),
            rebuild_gate: RwLock::new(()),
            apply_lock: Mutex::new(()),
            last_rebuilt_ms: AtomicI64::new(0),
            needs_rebuild: AtomicBool::new(false),
            shard_count,
        }
    }

    /// Applies one store change notification incrementally.
    ///
    /// Idempotent: a duplicate delivery diffs to nothing. Applies are
    /// serialized against each other so hydration and the index mutation
    /// form one atomic step: a delete committed between them could
    /// otherwise be overwritten by a stale hydrated record whose delete
    /// notification was already consumed. Store I/O still happens outside
    /// every shard lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexInconsistency`] if hydration fails for a
    /// reason other than the record having been deleted in the meantime.
    pub fn apply(&self, store: &dyn CatalogStore, change: &ChangeNotification) -> Result<()> {
        let _serial = self.apply_lock.lock();
        match change.kind {
            ChangeKind::Create | ChangeKind::Update => match store.get_task(change.id) {
                Ok(record) => {
                    let _gate = self.rebuild_gate.read();
                    self.inner.load().upsert(&record);
                }
                // Deleted between notification and hydration: treat as a
                // delete, the delete notification will be a no-op.
                Err(Error::NotFound(_)) => {
                    let _gate = self.rebuild_gate.read();
                    self.inner.load().remove(change.id);
                }
                Err(err) => {
                    return Err(Error::IndexInconsistency(format!(
                        "failed to hydrate {} during incremental update: {err}",
                        change.id
                    )));
                }
            },
            ChangeKind::Delete => {
                let _gate = self.rebuild_gate.read();
                self.inner.load().remove(change.id);
            }
        }
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Marks the index as inconsistent, scheduling a full rebuild.
    ///
    /// Queries are unaffected until the rebuild completes; they are served
    /// from the last good index.
    pub fn schedule_rebuild(&self) {
        self.needs_rebuild.store(true, Ordering::SeqCst);
    }

    /// True if an incremental failure has scheduled a rebuild.
    #[must_use]
    pub fn rebuild_pending(&self) -> bool {
        self.needs_rebuild.load(Ordering::SeqCst)
    }

    /// Discards the index and recomputes it from a full store scan.
    ///
    /// Holds the rebuild gate exclusively, halting incremental updates
    /// until the swap. Readers keep their pinned generation throughout.
    pub fn rebuild_from<I>(&self, scan: I)
    where
        I: IntoIterator<Item = TaskRecord>,
    {
        let started = Instant::now();
        let _gate = self.rebuild_gate.write();

        let fresh = IndexInner::new(self.shard_count);
        let mut count = 0u64;
        for record in scan {
            fresh.upsert(&record);
            count += 1;
        }

        self.inner.store(Arc::new(fresh));
        self.version.fetch_add(1, Ordering::SeqCst);
        self.last_rebuilt_ms.store(now_millis(), Ordering::SeqCst);
        self.needs_rebuild.store(false, Ordering::SeqCst);

        tracing::info!(
            records = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index rebuilt from full scan"
        );
    }

    /// Pins the current index generation.
    #[must_use]
    pub fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            inner: self.inner.load_full(),
            version: self.version.load(Ordering::SeqCst),
            taken_at: Instant::now(),
        }
    }

    /// Current index version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Operational statistics.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let inner = self.inner.load();
        let trigram_stats = inner.trigrams.stats();
        IndexStats {
            doc_count: trigram_stats.doc_count,
            trigram_count: trigram_stats.trigram_count,
            memory_bytes: trigram_stats.memory_bytes,
            version: self.version.load(Ordering::SeqCst),
            last_rebuilt_ms: self.last_rebuilt_ms.load(Ordering::SeqCst),
            needs_rebuild: self.needs_rebuild.load(Ordering::SeqCst),
        }
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("version", &self.version())
            .field("shard_count", &self.shard_count)
            .finish_non_exhaustive()
    }
}
