//! Tests for the similarity query engine: scoring, ordering, filters,
//! cancellation.

use std::time::Duration;

use crate::config::SearchConfig;
use crate::error::Error;
use crate::index::SearchIndex;
use crate::record::{RecordId, TaskRecord};
use crate::search::{CancelToken, SearchRequest, SimilarityEngine};
use crate::store::{CatalogStore, MemoryStore};

struct Fixture {
    store: MemoryStore,
    index: SearchIndex,
    engine: SimilarityEngine,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            index: SearchIndex::new(16),
            engine: SimilarityEngine::new(SearchConfig::default()),
        }
    }

    fn add(&self, name: &str, discipline: &str, resource_type: &str, description: &str) -> RecordId {
        let rx = self.store.subscribe();
        let id = self
            .store
            .create_task(TaskRecord::new(name, discipline, resource_type, description))
            .unwrap();
        for change in rx.try_iter() {
            self.index.apply(&self.store, &change).unwrap();
        }
        id
    }

    fn search(&self, request: &SearchRequest) -> Vec<crate::search::SearchHit> {
        self.engine
            .search(
                &self.index.snapshot(),
                &self.store,
                request,
                &CancelToken::none(),
            )
            .unwrap()
    }
}

#[test]
fn test_exact_description_ranks_first_above_default_threshold() {
    let fixture = Fixture::new();
    let id = fixture.add(
        "slab",
        "structural",
        "concrete",
        "pour concrete foundation slab",
    );
    fixture.add("rebar", "structural", "steel", "tie rebar cage for columns");
    fixture.add("paint", "finishing", "paint", "apply primer coat to walls");

    let hits = fixture.search(&SearchRequest::new("pour concrete foundation slab", 10));
    assert!(!hits.is_empty());
    assert_eq!(hits[0].id, id);
    assert!(hits[0].score >= 0.3);
}

#[test]
fn test_typo_query_matches_below_perfect_score() {
    let fixture = Fixture::new();
    let id = fixture.add(
        "slab",
        "structural",
        "concrete",
        "pour concrete foundation slab",
    );

    // Single-character typo: "foundaton".
    let request = SearchRequest::new("concrete foundaton", 10).with_min_score(0.2);
    let hits = fixture.search(&request);

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, id);
    assert!(hits[0].score > 0.2);
    assert!(hits[0].score < 1.0);
}

#[test]
fn test_typo_query_with_mismatched_facet_returns_empty() {
    let fixture = Fixture::new();
    fixture.add(
        "slab",
        "structural",
        "concrete",
        "pour concrete foundation slab",
    );

    let request = SearchRequest::new("concrete foundaton", 10)
        .with_min_score(0.2)
        .with_discipline("electrical");
    assert!(fixture.search(&request).is_empty());
}

#[test]
fn test_facet_filter_never_leaks_other_disciplines() {
    let fixture = Fixture::new();
    fixture.add("a", "electrical", "cable", "install cable tray in corridor");
    fixture.add("b", "structural", "cable", "install cable stays on bridge deck");

    let request = SearchRequest::new("install cable", 10)
        .with_min_score(0.05)
        .with_discipline("electrical");
    let hits = fixture.search(&request);

    assert!(!hits.is_empty());
    for hit in &hits {
        assert_eq!(hit.record.discipline, "electrical");
    }
}

#[test]
fn test_resource_type_filter() {
    let fixture = Fixture::new();
    fixture.add("a", "structural", "concrete", "pour concrete wall");
    fixture.add("b", "structural", "steel", "erect steel frame");

    let request = SearchRequest::new("structural work on site", 10)
        .with_min_score(0.01)
        .with_resource_type("steel");
    let hits = fixture.search(&request);
    for hit in &hits {
        assert_eq!(hit.record.resource_type, "steel");
    }
}

#[test]
fn test_unknown_facet_value_returns_empty() {
    let fixture = Fixture::new();
    fixture.add("a", "structural", "concrete", "pour concrete wall");

    let request = SearchRequest::new("concrete", 10).with_discipline("plumbing");
    assert!(fixture.search(&request).is_empty());
}

#[test]
fn test_empty_query_returns_empty_not_everything() {
    let fixture = Fixture::new();
    fixture.add("a", "structural", "concrete", "pour concrete wall");

    assert!(fixture.search(&SearchRequest::new("", 10)).is_empty());
    assert!(fixture.search(&SearchRequest::new("   ", 10)).is_empty());
}

#[test]
fn test_short_query_still_shingles() {
    let fixture = Fixture::new();
    // Description containing the 2-char token "pv" as a word.
    fixture.add("a", "electrical", "panel", "mount pv inverter");

    let request = SearchRequest::new("pv", 10).with_min_score(0.01);
    assert!(!fixture.search(&request).is_empty());
}

#[test]
fn test_min_score_threshold_prunes() {
    let fixture = Fixture::new();
    fixture.add("a", "structural", "concrete", "pour concrete foundation slab");
    fixture.add("b", "finishing", "paint", "apply paint to concrete surface");

    let strict = SearchRequest::new("pour concrete foundation slab", 10).with_min_score(0.5);
    let hits = fixture.search(&strict);
    assert_eq!(hits.len(), 1);
}

#[test]
fn test_limit_truncates_after_ordering() {
    let fixture = Fixture::new();
    for i in 0..5 {
        fixture.add(
            &format!("t{i}"),
            "structural",
            "concrete",
            &format!("pour concrete element number {i}"),
        );
    }

    let request = SearchRequest::new("pour concrete element", 2).with_min_score(0.1);
    let hits = fixture.search(&request);
    assert_eq!(hits.len(), 2);
    assert!(hits[0].score >= hits[1].score);
}

#[test]
fn test_ordering_is_deterministic_with_tied_scores() {
    let fixture = Fixture::new();
    // Identical descriptions and facets: scores tie exactly.
    let a = fixture.add("a", "structural", "concrete", "pour concrete slab");
    let b = fixture.add("b", "structural", "concrete", "pour concrete slab");

    let request = SearchRequest::new("pour concrete slab", 10);
    let first = fixture.search(&request);
    let second = fixture.search(&request);
    assert_eq!(first.len(), 2);

    let order: Vec<RecordId> = first.iter().map(|h| h.id).collect();
    assert_eq!(order, second.iter().map(|h| h.id).collect::<Vec<_>>());

    // Ties break by updated_at descending, then id ascending.
    let rec_a = fixture.store.get_task(a).unwrap();
    let rec_b = fixture.store.get_task(b).unwrap();
    if rec_a.updated_at == rec_b.updated_at {
        assert_eq!(order[0], a.min(b));
    }
}

#[test]
fn test_deleted_record_never_returned() {
    let fixture = Fixture::new();
    let id = fixture.add("a", "structural", "concrete", "pour concrete slab");

    let rx = fixture.store.subscribe();
    fixture.store.delete_task(id).unwrap();
    for change in rx.try_iter() {
        fixture.index.apply(&fixture.store, &change).unwrap();
    }

    assert!(fixture
        .search(&SearchRequest::new("pour concrete slab", 10))
        .is_empty());
}

#[test]
fn test_record_deleted_after_snapshot_dropped_from_hydration() {
    let fixture = Fixture::new();
    let id = fixture.add("a", "structural", "concrete", "pour concrete slab");

    // Pin the snapshot, then delete from the store without re-indexing.
    let snapshot = fixture.index.snapshot();
    fixture.store.delete_task(id).unwrap();

    let hits = fixture
        .engine
        .search(
            &snapshot,
            &fixture.store,
            &SearchRequest::new("pour concrete slab", 10),
            &CancelToken::none(),
        )
        .unwrap();
    // Stale snapshot still scores it, hydration drops it: never a dangling hit.
    assert!(hits.is_empty());
}

#[test]
fn test_cancelled_token_aborts_with_distinct_error() {
    let fixture = Fixture::new();
    fixture.add("a", "structural", "concrete", "pour concrete slab");

    let token = CancelToken::none();
    token.cancel();
    let err = fixture
        .engine
        .search(
            &fixture.index.snapshot(),
            &fixture.store,
            &SearchRequest::new("pour concrete slab", 10),
            &token,
        )
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[test]
fn test_expired_deadline_times_out() {
    let fixture = Fixture::new();
    fixture.add("a", "structural", "concrete", "pour concrete slab");

    let token = CancelToken::with_timeout(Duration::from_millis(0));
    std::thread::sleep(Duration::from_millis(5));
    let err = fixture
        .engine
        .search(
            &fixture.index.snapshot(),
            &fixture.store,
            &SearchRequest::new("pour concrete slab", 10),
            &token,
        )
        .unwrap_err();
    assert!(matches!(err, Error::Timeout));
}

#[test]
fn test_facet_value_fuzzy_matches_via_field_shingles() {
    let fixture = Fixture::new();
    let id = fixture.add("a", "electrical", "cable", "run conduit to panel");

    // The discipline itself is fuzzy-searchable.
    let request = SearchRequest::new("electrical", 10).with_min_score(0.1);
    let hits = fixture.search(&request);
    assert_eq!(hits.first().map(|h| h.id), Some(id));
}
