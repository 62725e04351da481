//! Property and concurrency invariants over the cache fingerprint, the
//! importance clamp, and graph-edge uniqueness.

mod common;

use common::engine;
use proptest::prelude::*;
use rae_core::cache::fingerprint::{fingerprint, time_bucket};
use rae_core::repository::{EdgeFilter, GraphRepository, MemoryRepository};
use rae_core::types::{MemoryDraft, Scope, SearchFilters};
use serde_json::Map;
use std::sync::Arc;
use uuid::Uuid;

fn scope() -> Scope {
    Scope::new("t1", "p1")
}

proptest! {
    #[test]
    fn prop_fingerprint_ignores_whitespace(words in proptest::collection::vec("[a-z]{1,8}", 1..6)) {
        let scope = scope();
        let filters = SearchFilters::default();
        let plain = words.join(" ");
        let noisy = format!("  {}  ", words.join("   \t"));
        prop_assert_eq!(
            fingerprint(&scope, &plain, &filters, 0, 1),
            fingerprint(&scope, &noisy, &filters, 0, 1)
        );
    }

    #[test]
    fn prop_fingerprint_ignores_case(query in "[a-zA-Z ]{1,40}") {
        let scope = scope();
        let filters = SearchFilters::default();
        prop_assert_eq!(
            fingerprint(&scope, &query, &filters, 0, 1),
            fingerprint(&scope, &query.to_uppercase(), &filters, 0, 1)
        );
    }

    #[test]
    fn prop_fingerprint_ignores_tag_order(mut tags in proptest::collection::vec("[a-z]{1,6}", 1..5)) {
        let scope = scope();
        let forward = SearchFilters {
            tags: tags.clone(),
            ..SearchFilters::default()
        };
        tags.reverse();
        let reversed = SearchFilters {
            tags,
            ..SearchFilters::default()
        };
        prop_assert_eq!(
            fingerprint(&scope, "q", &forward, 0, 1),
            fingerprint(&scope, "q", &reversed, 0, 1)
        );
    }

    #[test]
    fn prop_same_minute_same_bucket(base in 0i64..2_000_000_000, offset in 0i64..60) {
        let aligned = base - base.rem_euclid(60);
        prop_assert_eq!(time_bucket(aligned), time_bucket(aligned + offset));
    }
}

#[tokio::test]
async fn test_importance_clamped_on_update() {
    let test = engine().await;
    let scope = scope();

    let draft = MemoryDraft::episodic(scope.clone(), "clamp target");
    let id = test.engine.store().store(draft).await.unwrap();

    for (input, expected) in [(-1.5, 0.0), (0.42, 0.42), (7.0, 1.0)] {
        test.storage
            .update_importance(id, &scope, input)
            .await
            .unwrap();
        let stored = test.storage.get(id, &scope).await.unwrap().unwrap();
        assert!((stored.importance - expected).abs() < 1e-9, "input {input}");
        assert!((0.0..=1.0).contains(&stored.importance));
    }
}

#[tokio::test]
async fn test_edge_uniqueness_under_concurrency() {
    let test = engine().await;
    let scope = scope();

    let source = test
        .storage
        .upsert_node(&scope, "authservice", "AuthService", &Map::new())
        .await
        .unwrap();
    let target = test
        .storage
        .upsert_node(&scope, "encryptionservice", "EncryptionService", &Map::new())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let storage = Arc::clone(&test.storage);
        let scope = scope.clone();
        handles.push(tokio::spawn(async move {
            storage
                .insert_edge(&scope, source, target, "depends_on", &Map::new())
                .await
        }));
    }

    let mut first_inserts = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            first_inserts += 1;
        }
    }
    assert_eq!(first_inserts, 1, "exactly one insert may win");

    let edges = test
        .storage
        .list_edges(&scope, &EdgeFilter {
            relation: Some("depends_on".to_string()),
            limit: 10,
        })
        .await
        .unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].observation_count(), 8);
}

#[tokio::test]
async fn test_usage_count_no_lost_updates() {
    let test = engine().await;
    let scope = scope();

    let draft = MemoryDraft::episodic(scope.clone(), "hot memory");
    let id = test.engine.store().store(draft).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let storage = Arc::clone(&test.storage);
        let scope = scope.clone();
        handles.push(tokio::spawn(async move {
            storage.record_access(&[id], &scope).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = test.storage.get(id, &scope).await.unwrap().unwrap();
    assert_eq!(stored.usage_count, 10);
}

#[tokio::test]
async fn test_record_access_strictly_advances_clock() {
    let test = engine().await;
    let scope = scope();

    let draft = MemoryDraft::episodic(scope.clone(), "clock probe");
    let id = test.engine.store().store(draft).await.unwrap();

    let mut previous = test
        .storage
        .get(id, &scope)
        .await
        .unwrap()
        .unwrap()
        .last_accessed_at;
    for _ in 0..3 {
        test.storage.record_access(&[id], &scope).await.unwrap();
        let current = test
            .storage
            .get(id, &scope)
            .await
            .unwrap()
            .unwrap()
            .last_accessed_at;
        assert!(current > previous);
        previous = current;
    }
}

#[tokio::test]
async fn test_delete_is_idempotent_and_scoped() {
    let test = engine().await;
    let scope = scope();
    let other = Scope::new("t2", "p1");

    let draft = MemoryDraft::episodic(scope.clone(), "delete target");
    let id = test.engine.store().store(draft).await.unwrap();

    // A foreign tenant cannot delete the row.
    assert!(!test.storage.delete(id, &other).await.unwrap());
    assert!(test.storage.get(id, &scope).await.unwrap().is_some());

    assert!(test.engine.store().delete(id, &scope).await.unwrap());
    assert!(!test.engine.store().delete(id, &scope).await.unwrap());
    assert!(test.storage.get(id, &scope).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_memory_id_conflicts() {
    let test = engine().await;
    let scope = scope();

    let id = Uuid::new_v4();
    let mut draft = MemoryDraft::episodic(scope.clone(), "original");
    draft.id = Some(id);
    test.engine.store().store(draft).await.unwrap();

    let mut duplicate = MemoryDraft::episodic(scope, "impostor");
    duplicate.id = Some(id);
    let err = test.engine.store().store(duplicate).await.unwrap_err();
    assert!(matches!(err, rae_core::Error::Conflict(_)));
}
