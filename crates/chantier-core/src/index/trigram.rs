//! Trigram extraction and sharded postings.
//!
//! pg_trgm-style shingling: normalized text is padded with two spaces on
//! each side and every overlapping 3-byte window becomes a shingle. The
//! postings side is an inverted index shingle → bitmap of record slots,
//! sharded by shingle hash so different shingles update concurrently while
//! updates to one shingle's posting set stay mutually exclusive.

use dashmap::DashMap;
use parking_lot::RwLock;
use roaring::RoaringBitmap;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use std::hash::{Hash, Hasher};

use crate::record::{FieldKind, TaskRecord};

/// Trigram type: 3 bytes representing a shingle.
pub type Trigram = [u8; 3];

/// Normalizes text for shingling: lowercase, whitespace runs collapsed to
/// single spaces, leading/trailing whitespace trimmed.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        }
    }
    out
}

/// Extracts the shingle set of a field value.
///
/// The input is normalized, then padded with two boundary spaces front and
/// back so prefix/suffix positions carry weight and sub-3-char inputs still
/// yield at least one shingle. Empty input yields the empty set.
///
/// # Example
///
/// ```
/// use chantier_core::index::trigram::extract_trigrams;
///
/// let trigrams = extract_trigrams("Hello");
/// // "  hello  " → {"  h", " he", "hel", "ell", "llo", "lo ", "o  "}
/// assert_eq!(trigrams.len(), 7);
/// ```
#[must_use]
pub fn extract_trigrams(text: &str) -> FxHashSet<Trigram> {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return FxHashSet::default();
    }

    let bytes = normalized.as_bytes();
    let text_len = bytes.len();

    // Virtual padding: conceptual string is "  " + text + "  ".
    let total_len = 4 + text_len;
    let trigram_count = total_len - 2;

    let mut trigrams =
        FxHashSet::with_capacity_and_hasher(trigram_count, rustc_hash::FxBuildHasher);
    for i in 0..trigram_count {
        let trigram: Trigram = std::array::from_fn(|j| {
            let pos = i + j;
            if pos < 2 || pos >= 2 + text_len {
                b' '
            } else {
                bytes[pos - 2]
            }
        });
        trigrams.insert(trigram);
    }
    trigrams
}

fn shard_of(trigram: Trigram, mask: usize) -> usize {
    let mut hasher = FxHasher::default();
    trigram.hash(&mut hasher);
    (hasher.finish() as usize) & mask
}

/// Sharded inverted index: shingle → bitmap of record slots.
///
/// Fixed power-of-two shard array; a shingle always lands in the same
/// shard, so its posting set is guarded by exactly one lock.
#[derive(Debug)]
struct ShardedPostings {
    shards: Box<[RwLock<FxHashMap<Trigram, RoaringBitmap>>]>,
    mask: usize,
}

impl ShardedPostings {
    fn new(shard_count: usize) -> Self {
        let count = shard_count.max(1).next_power_of_two();
        let shards = (0..count)
            .map(|_| RwLock::new(FxHashMap::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            mask: count - 1,
        }
    }

    fn add(&self, trigram: Trigram, slot: u32) {
        let mut shard = self.shards[shard_of(trigram, self.mask)].write();
        shard.entry(trigram).or_default().insert(slot);
    }

    fn remove(&self, trigram: Trigram, slot: u32) {
        let mut shard = self.shards[shard_of(trigram, self.mask)].write();
        if let Some(bitmap) = shard.get_mut(&trigram) {
            bitmap.remove(slot);
            // Drop empty bitmaps so dead shingles do not accumulate.
            if bitmap.is_empty() {
                shard.remove(&trigram);
            }
        }
    }

    fn postings(&self, trigram: Trigram) -> Option<RoaringBitmap> {
        let shard = self.shards[shard_of(trigram, self.mask)].read();
        shard.get(&trigram).cloned()
    }

    fn trigram_count(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    fn memory_bytes(&self) -> usize {
        self.shards
            .iter()
            .map(|s| {
                let shard = s.read();
                shard.len() * (3 + 8)
                    + shard
                        .values()
                        .map(RoaringBitmap::serialized_size)
                        .sum::<usize>()
            })
            .sum()
    }
}

/// Shingle sets of one record, per indexed field.
#[derive(Debug, Default, Clone)]
struct FieldShingles {
    fields: [FxHashSet<Trigram>; 3],
}

impl FieldShingles {
    fn union(&self) -> FxHashSet<Trigram> {
        let mut all = self.fields[0].clone();
        for set in &self.fields[1..] {
            all.extend(set.iter().copied());
        }
        all
    }
}

const fn field_pos(field: FieldKind) -> usize {
    match field {
        FieldKind::Description => 0,
        FieldKind::Discipline => 1,
        FieldKind::ResourceType => 2,
    }
}

/// Statistics for the trigram index.
#[derive(Debug, Clone, Default)]
pub struct TrigramStats {
    /// Number of indexed records.
    pub doc_count: u64,
    /// Number of unique shingles across all fields.
    pub trigram_count: usize,
    /// Estimated memory usage in bytes.
    pub memory_bytes: usize,
}

/// Trigram index over the three indexed fields of every record.
///
/// Maintains one sharded postings structure per field plus the per-record
/// stored shingle sets that drive diff-based incremental updates. Applying
/// the same change twice diffs to the empty set, so updates are idempotent
/// under at-least-once notification delivery.
#[derive(Debug)]
pub struct TrigramIndex {
    /// One postings structure per indexed field.
    postings: [ShardedPostings; 3],
    /// Record slot → stored shingle sets, per field.
    doc_shingles: DashMap<u32, FieldShingles>,
}

impl TrigramIndex {
    /// Creates an empty index with the given posting shard count.
    #[must_use]
    pub fn new(shard_count: usize) -> Self {
        Self {
            postings: [
                ShardedPostings::new(shard_count),
                ShardedPostings::new(shard_count),
                ShardedPostings::new(shard_count),
            ],
            doc_shingles: DashMap::new(),
        }
    }

    /// Number of indexed records.
    #[must_use]
    pub fn doc_count(&self) -> u64 {
        self.doc_shingles.len() as u64
    }

    /// True if no records are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc_shingles.is_empty()
    }

    /// Re-shingles one field of a record and diffs against the stored set.
    ///
    /// Postings are added for shingles present only in the new set and
    /// removed for shingles present only in the old set. Unchanged text
    /// diffs to nothing, which is what makes duplicate notification
    /// delivery harmless.
    pub fn upsert_field(&self, slot: u32, field: FieldKind, value: &str) {
        let new_set = extract_trigrams(value);
        let pos = field_pos(field);

        // Entry lock serializes concurrent updates to the same record.
        let mut entry = self.doc_shingles.entry(slot).or_default();
        let old_set = std::mem::take(&mut entry.fields[pos]);

        for &trigram in new_set.difference(&old_set) {
            self.postings[pos].add(trigram, slot);
        }
        for &trigram in old_set.difference(&new_set) {
            self.postings[pos].remove(trigram, slot);
        }

        entry.fields[pos] = new_set;
    }

    /// Indexes all three fields of a record.
    pub fn upsert(&self, slot: u32, record: &TaskRecord) {
        for field in FieldKind::ALL {
            self.upsert_field(slot, field, field.value_of(record));
        }
    }

    /// Removes every posting referencing the record. Idempotent.
    pub fn remove(&self, slot: u32) {
        if let Some((_, shingles)) = self.doc_shingles.remove(&slot) {
            for (pos, set) in shingles.fields.iter().enumerate() {
                for &trigram in set {
                    self.postings[pos].remove(trigram, slot);
                }
            }
        }
    }

    /// Posting slots containing the shingle in any indexed field.
    #[must_use]
    pub fn postings(&self, trigram: Trigram) -> RoaringBitmap {
        let mut result = RoaringBitmap::new();
        for postings in &self.postings {
            if let Some(bitmap) = postings.postings(trigram) {
                result |= bitmap;
            }
        }
        result
    }

    /// The record's full shingle set: union over its indexed fields.
    ///
    /// This is the record side of the Jaccard score.
    #[must_use]
    pub fn record_shingles(&self, slot: u32) -> Option<FxHashSet<Trigram>> {
        self.doc_shingles.get(&slot).map(|s| s.union())
    }

    /// Index statistics.
    #[must_use]
    pub fn stats(&self) -> TrigramStats {
        let trigram_count = self.postings.iter().map(ShardedPostings::trigram_count).sum();
        let memory_bytes = self.postings.iter().map(ShardedPostings::memory_bytes).sum::<usize>()
            + self.doc_shingles.len() * 64;
        TrigramStats {
            doc_count: self.doc_count(),
            trigram_count,
            memory_bytes,
        }
    }
}

/// Jaccard similarity between two shingle sets: `|∩| / |∪|`.
///
/// Symmetric, in [0, 1]; identical non-empty sets score 1.0, and an empty
/// side scores 0.0.
#[must_use]
pub fn jaccard(a: &FxHashSet<Trigram>, b: &FxHashSet<Trigram>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f32 / union as f32
}
