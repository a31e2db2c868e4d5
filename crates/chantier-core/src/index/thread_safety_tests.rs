//! Thread-safety tests for the sharded trigram index and rebuild swap.
//!
//! Validates concurrent access patterns and absence of torn postings.

use std::sync::Arc;
use std::thread;

use super::{SearchIndex, TrigramIndex};
use crate::record::{ChangeKind, ChangeNotification, FieldKind, TaskPatch, TaskRecord};
use crate::store::{CatalogStore, MemoryStore};

fn task_numbered(n: u64) -> TaskRecord {
    let facet = match n % 3 {
        0 => ("structural", "concrete"),
        1 => ("electrical", "cable"),
        _ => ("finishing", "paint"),
    };
    TaskRecord::new(
        &format!("task-{n}"),
        facet.0,
        facet.1,
        &format!("task {n} with searchable content about {}", facet.1),
    )
}

#[test]
fn test_concurrent_upserts_distinct_slots() {
    let index = Arc::new(TrigramIndex::new(16));
    let mut handles = vec![];

    // 4 threads, each indexing 100 records into disjoint slot ranges.
    for t in 0u32..4 {
        let index = Arc::clone(&index);
        handles.push(thread::spawn(move || {
            for i in 0..100 {
                let slot = t * 1000 + i;
                let record = task_numbered(u64::from(slot));
                index.upsert(slot, &record);
            }
        }));
    }
    for handle in handles {
        handle.join().expect("thread panicked");
    }

    assert_eq!(index.doc_count(), 400);
}

#[test]
fn test_concurrent_upsert_and_remove() {
    let index = Arc::new(TrigramIndex::new(16));
    for slot in 0..200 {
        index.upsert(slot, &task_numbered(u64::from(slot)));
    }

    let writer = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            for slot in 200..400 {
                index.upsert(slot, &task_numbered(u64::from(slot)));
            }
        })
    };
    let remover = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            for slot in 0..200 {
                index.remove(slot);
            }
        })
    };

    writer.join().expect("writer panicked");
    remover.join().expect("remover panicked");

    assert_eq!(index.doc_count(), 200);
    for slot in 0..200 {
        assert!(index.record_shingles(slot).is_none());
    }
}

#[test]
fn test_concurrent_reads_during_writes() {
    let index = Arc::new(TrigramIndex::new(16));
    for slot in 0..100 {
        index.upsert(slot, &task_numbered(u64::from(slot)));
    }

    let writer = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            for slot in 100..300 {
                index.upsert(slot, &task_numbered(u64::from(slot)));
            }
        })
    };

    // Readers only see complete posting sets, never a torn bitmap.
    let mut readers = vec![];
    for _ in 0..3 {
        let index = Arc::clone(&index);
        readers.push(thread::spawn(move || {
            for _ in 0..200 {
                let postings = index.postings([b'c', b'o', b'n']);
                for slot in &postings {
                    assert!(slot < 300);
                }
            }
        }));
    }

    writer.join().expect("writer panicked");
    for reader in readers {
        reader.join().expect("reader panicked");
    }
}

#[test]
fn test_rebuild_during_pinned_reads() {
    let store = Arc::new(MemoryStore::new());
    let index = Arc::new(SearchIndex::new(16));
    let rx = store.subscribe();
    for n in 0..50 {
        store.create_task(task_numbered(n)).unwrap();
    }
    for change in rx.try_iter() {
        index.apply(store.as_ref(), &change).unwrap();
    }

    let pinned = index.snapshot();

    let rebuilder = {
        let store = Arc::clone(&store);
        let index = Arc::clone(&index);
        thread::spawn(move || {
            for _ in 0..10 {
                index.rebuild_from(store.scan_tasks());
            }
        })
    };

    // The pinned generation stays fully intact across every swap.
    for _ in 0..100 {
        assert_eq!(pinned.inner.trigrams.doc_count(), 50);
    }

    rebuilder.join().expect("rebuilder panicked");
    assert_eq!(index.snapshot().inner.trigrams.doc_count(), 50);
}

#[test]
fn test_update_delete_race_leaves_no_stale_entries() {
    let store = Arc::new(MemoryStore::new());
    let index = Arc::new(SearchIndex::new(16));
    let rx = store.subscribe();

    // An update hydrating just before a delete commits must not re-insert
    // the stale record after the delete notification has been applied.
    for _ in 0..200 {
        let id = store.create_task(task_numbered(7)).unwrap();
        for change in rx.try_iter() {
            index.apply(store.as_ref(), &change).unwrap();
        }

        let updater = {
            let store = Arc::clone(&store);
            let index = Arc::clone(&index);
            thread::spawn(move || {
                let patch = TaskPatch {
                    description: Some("revised slab pour".to_string()),
                    ..TaskPatch::default()
                };
                // The delete may have won; the apply below still runs.
                let _ = store.update_task(id, &patch);
                let change = ChangeNotification {
                    id,
                    kind: ChangeKind::Update,
                    affected_fields: vec![FieldKind::Description],
                };
                index.apply(store.as_ref(), &change).unwrap();
            })
        };
        let deleter = {
            let store = Arc::clone(&store);
            let index = Arc::clone(&index);
            thread::spawn(move || {
                store.delete_task(id).unwrap();
                let change = ChangeNotification {
                    id,
                    kind: ChangeKind::Delete,
                    affected_fields: Vec::new(),
                };
                index.apply(store.as_ref(), &change).unwrap();
            })
        };
        updater.join().expect("updater panicked");
        deleter.join().expect("deleter panicked");

        // Converge the notifications the store itself emitted.
        for change in rx.try_iter() {
            index.apply(store.as_ref(), &change).unwrap();
        }

        assert_eq!(index.stats().doc_count, 0);
        assert!(index.snapshot().inner.ids.slot_of(id).is_none());
    }
}

#[test]
fn test_concurrent_apply_from_parallel_writers() {
    let store = Arc::new(MemoryStore::new());
    let index = Arc::new(SearchIndex::new(16));

    let mut handles = vec![];
    for t in 0..4u64 {
        let store = Arc::clone(&store);
        let index = Arc::clone(&index);
        handles.push(thread::spawn(move || {
            let rx = store.subscribe();
            for n in 0..50 {
                store.create_task(task_numbered(t * 100 + n)).unwrap();
                // Each writer drains and applies its own notifications;
                // cross-writer duplicates are covered by idempotence.
                for change in rx.try_iter() {
                    index.apply(store.as_ref(), &change).unwrap();
                }
            }
        }));
    }
    for handle in handles {
        handle.join().expect("writer panicked");
    }

    // Converge any notifications still in flight.
    index.rebuild_from(store.scan_tasks());
    assert_eq!(index.stats().doc_count, 200);
}
