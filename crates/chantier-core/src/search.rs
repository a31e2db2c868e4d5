//! Similarity Query Engine: trigram-overlap scoring with facet filtering.
//!
//! Candidates come from facet bitmaps and per-shingle postings; scoring is
//! Jaccard similarity over shingle sets, which normalizes for field length
//! so long descriptions cannot dominate purely by shingle volume. The
//! result order is total and deterministic: score descending, most recent
//! `updated_at` first, id ascending.

use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::index::{extract_trigrams, jaccard, FacetFilters, IndexSnapshot};
use crate::record::{RecordId, TaskRecord};
use crate::store::CatalogStore;

/// Cooperative cancellation for searches.
///
/// Checked between per-shingle postings lookups; a search either runs to
/// completion or fails with [`Error::Cancelled`] / [`Error::Timeout`],
/// never a silently truncated result list.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that never fires.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// A token that trips after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Requests cancellation from another thread.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Fails if the token has been cancelled or the deadline passed.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] on explicit cancellation, [`Error::Timeout`]
    /// on deadline expiry. Cancellation wins when both apply.
    pub fn check(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                return Err(Error::Timeout);
            }
        }
        Ok(())
    }
}

/// A fuzzy search request.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Free-text query.
    pub query: String,
    /// Exact facet pre-filters.
    pub filters: FacetFilters,
    /// Minimum Jaccard score; `None` uses the configured default.
    pub min_score: Option<f32>,
    /// Maximum number of results.
    pub limit: usize,
}

impl SearchRequest {
    /// Builds a request with default filters and limit.
    #[must_use]
    pub fn new(query: &str, limit: usize) -> Self {
        Self {
            query: query.to_string(),
            limit,
            ..Self::default()
        }
    }

    /// Constrains the discipline facet.
    #[must_use]
    pub fn with_discipline(mut self, discipline: &str) -> Self {
        self.filters.discipline = Some(discipline.to_string());
        self
    }

    /// Constrains the resource type facet.
    #[must_use]
    pub fn with_resource_type(mut self, resource_type: &str) -> Self {
        self.filters.resource_type = Some(resource_type.to_string());
        self
    }

    /// Overrides the score threshold.
    #[must_use]
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

/// One ranked search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Matched record id.
    pub id: RecordId,
    /// Jaccard similarity of query and record shingle sets.
    pub score: f32,
    /// Hydrated record.
    pub record: TaskRecord,
}

/// The similarity engine. Stateless apart from configuration; operates on
/// a pinned [`IndexSnapshot`] and hydrates results through the store.
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    config: SearchConfig,
}

impl SimilarityEngine {
    /// Creates an engine with the given search configuration.
    #[must_use]
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    /// The configured default score threshold.
    #[must_use]
    pub fn default_min_score(&self) -> f32 {
        self.config.default_min_score
    }

    /// Runs a fuzzy search against a pinned index snapshot.
    ///
    /// An empty query yields no shingles and therefore an empty result set
    /// rather than matching everything. A record deleted between scoring
    /// and hydration is silently dropped; results never dangle.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] or [`Error::Timeout`] when the token trips
    /// between postings lookups.
    pub fn search(
        &self,
        snapshot: &IndexSnapshot,
        store: &dyn CatalogStore,
        request: &SearchRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchHit>> {
        let query_shingles = extract_trigrams(&request.query);
        if query_shingles.is_empty() {
            return Ok(Vec::new());
        }

        let inner = &snapshot.inner;
        let candidates = inner.facets.candidates(&request.filters);
        if let Some(bitmap) = &candidates {
            if bitmap.is_empty() {
                return Ok(Vec::new());
            }
        }

        // Any record sharing at least one query shingle is a scoring
        // candidate, restricted to the facet bitmap when present.
        let mut matched: FxHashSet<u32> = FxHashSet::default();
        for &trigram in &query_shingles {
            cancel.check()?;
            let mut postings = inner.trigrams.postings(trigram);
            if let Some(bitmap) = &candidates {
                postings &= bitmap;
            }
            matched.extend(&postings);
        }

        let min_score = request
            .min_score
            .unwrap_or(self.config.default_min_score);

        let mut scored: Vec<(u32, f32)> = Vec::with_capacity(matched.len());
        for &slot in &matched {
            cancel.check()?;
            let Some(record_shingles) = inner.trigrams.record_shingles(slot) else {
                // Removed concurrently; eventual consistency allows the miss.
                continue;
            };
            let score = jaccard(&query_shingles, &record_shingles);
            if score >= min_score {
                scored.push((slot, score));
            }
        }

        let mut hits = self.hydrate(snapshot, store, scored)?;

        // Total, deterministic order: score desc, updated_at desc, id asc.
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.record.updated_at.cmp(&a.record.updated_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        let limit = request.limit.min(self.config.max_results);
        hits.truncate(limit);
        Ok(hits)
    }

    fn hydrate(
        &self,
        snapshot: &IndexSnapshot,
        store: &dyn CatalogStore,
        scored: Vec<(u32, f32)>,
    ) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::with_capacity(scored.len());
        for (slot, score) in scored {
            let Some(id) = snapshot.inner.ids.id_of(slot) else {
                continue;
            };
            match store.get_task(id) {
                Ok(record) => hits.push(SearchHit { id, score, record }),
                // Deleted since scoring: drop, never return a dangling hit.
                Err(Error::NotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(hits)
    }
}
