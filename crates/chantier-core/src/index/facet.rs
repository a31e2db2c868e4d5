//! Facet index: exact `(discipline, resource_type)` pre-filtering.
//!
//! Derived, disposable structure mapping normalized facet values to slot
//! bitmaps. Consulted before similarity scoring so facet filters cost one
//! bitmap lookup instead of a post-filter pass.

use dashmap::DashMap;
use parking_lot::RwLock;
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;

use super::trigram::normalize;

/// Facet filters of a search request. `None` fields are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacetFilters {
    /// Exact discipline match, if given.
    pub discipline: Option<String>,
    /// Exact resource type match, if given.
    pub resource_type: Option<String>,
}

impl FacetFilters {
    /// True if no facet is constrained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.discipline.is_none() && self.resource_type.is_none()
    }
}

/// Facet membership index over `(discipline, resource_type)`.
#[derive(Debug, Default)]
pub struct FacetIndex {
    /// `(discipline, resource_type)` pair → slots.
    pairs: RwLock<FxHashMap<(String, String), RoaringBitmap>>,
    /// discipline → slots.
    disciplines: RwLock<FxHashMap<String, RoaringBitmap>>,
    /// resource type → slots.
    resource_types: RwLock<FxHashMap<String, RoaringBitmap>>,
    /// Current facet assignment per slot, for clean reassignment.
    assignments: DashMap<u32, (String, String)>,
}

impl FacetIndex {
    /// Creates an empty facet index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a record's facets, replacing any previous assignment.
    pub fn set(&self, slot: u32, discipline: &str, resource_type: &str) {
        let discipline = normalize(discipline);
        let resource_type = normalize(resource_type);

        // Entry lock serializes reassignment of the same slot.
        match self.assignments.entry(slot) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let old = entry.get().clone();
                if old == (discipline.clone(), resource_type.clone()) {
                    return;
                }
                self.unlink(slot, &old.0, &old.1);
                entry.insert((discipline.clone(), resource_type.clone()));
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert((discipline.clone(), resource_type.clone()));
            }
        }

        self.pairs
            .write()
            .entry((discipline.clone(), resource_type.clone()))
            .or_default()
            .insert(slot);
        self.disciplines
            .write()
            .entry(discipline)
            .or_default()
            .insert(slot);
        self.resource_types
            .write()
            .entry(resource_type)
            .or_default()
            .insert(slot);
    }

    /// Removes a record from the facet index. Idempotent.
    pub fn clear(&self, slot: u32) {
        if let Some((_, (discipline, resource_type))) = self.assignments.remove(&slot) {
            self.unlink(slot, &discipline, &resource_type);
        }
    }

    fn unlink(&self, slot: u32, discipline: &str, resource_type: &str) {
        let mut pairs = self.pairs.write();
        if let Some(bitmap) = pairs.get_mut(&(discipline.to_string(), resource_type.to_string())) {
            bitmap.remove(slot);
            if bitmap.is_empty() {
                pairs.remove(&(discipline.to_string(), resource_type.to_string()));
            }
        }
        drop(pairs);

        let mut disciplines = self.disciplines.write();
        if let Some(bitmap) = disciplines.get_mut(discipline) {
            bitmap.remove(slot);
            if bitmap.is_empty() {
                disciplines.remove(discipline);
            }
        }
        drop(disciplines);

        let mut resource_types = self.resource_types.write();
        if let Some(bitmap) = resource_types.get_mut(resource_type) {
            bitmap.remove(slot);
            if bitmap.is_empty() {
                resource_types.remove(resource_type);
            }
        }
    }

    /// Candidate slots for the given filters.
    ///
    /// `None` means unfiltered (the whole catalog); `Some(empty)` means no
    /// record carries the requested facets.
    #[must_use]
    pub fn candidates(&self, filters: &FacetFilters) -> Option<RoaringBitmap> {
        match (&filters.discipline, &filters.resource_type) {
            (None, None) => None,
            (Some(discipline), Some(resource_type)) => {
                let key = (normalize(discipline), normalize(resource_type));
                Some(self.pairs.read().get(&key).cloned().unwrap_or_default())
            }
            (Some(discipline), None) => Some(
                self.disciplines
                    .read()
                    .get(&normalize(discipline))
                    .cloned()
                    .unwrap_or_default(),
            ),
            (None, Some(resource_type)) => Some(
                self.resource_types
                    .read()
                    .get(&normalize(resource_type))
                    .cloned()
                    .unwrap_or_default(),
            ),
        }
    }
}
