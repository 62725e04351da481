//! End-to-end scenarios over the assembled engine with a libsql backend.

mod common;

use common::{engine, engine_with};
use rae_core::Error;
use rae_core::graph::ExtractionOptions;
use rae_core::orchestrator::TaskOptions;
use rae_core::repository::{BudgetRepository, CostRepository, EdgeFilter, GraphRepository, MemoryRepository};
use rae_core::search::SearchOptions;
use rae_core::types::{
    Budget, ConsolidationStatus, EngineConfig, MemoryDraft, MemoryLayer, Scope,
};
use rae_core::repository::MemoryQuery;
use chrono::{Duration, Utc};
use serde_json::json;

fn scope() -> Scope {
    Scope::new("t1", "p1")
}

#[tokio::test]
async fn test_store_query_round_trip() {
    let test = engine().await;
    let scope = scope();

    let draft = MemoryDraft::episodic(scope.clone(), "User prefers dark mode")
        .with_source("user_preference")
        .with_importance(0.8);
    let id = test.engine.store().store(draft).await.unwrap();

    let response = test
        .engine
        .search()
        .search(&scope, "dark mode preference", &SearchOptions::with_k(5))
        .await
        .unwrap();

    assert!(!response.results.is_empty());
    assert_eq!(response.results[0].memory.id, id);
    assert!(response.results[0].score > 0.5);

    let stored = test.storage.get(id, &scope).await.unwrap().unwrap();
    assert_eq!(stored.usage_count, 1);
    assert!(stored.last_accessed_at > stored.created_at);
}

#[tokio::test]
async fn test_cross_tenant_isolation() {
    let test = engine().await;
    let scope_a = Scope::new("tA", "p1");
    let scope_b = Scope::new("tB", "p1");

    let draft = MemoryDraft::episodic(scope_a.clone(), "secret deployment runbook");
    let id = test.engine.store().store(draft).await.unwrap();

    let response = test
        .engine
        .search()
        .search(&scope_b, "secret deployment runbook", &SearchOptions::with_k(5))
        .await
        .unwrap();
    assert!(
        response.results.iter().all(|r| r.memory.scope.tenant_id == scope_b.tenant_id),
        "no foreign-tenant rows may leak"
    );
    assert!(response.results.is_empty());

    // Foreign get reads as not-found, never as forbidden.
    let err = test.engine.store().get(id, &scope_b).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_graph_extraction_and_graphrag_query() {
    let test = engine().await;
    let scope = scope();

    for content in [
        "AuthService depends on EncryptionService for token sealing",
        "Observed that AuthService depends on EncryptionService at startup",
        "Incident review: AuthService depends on EncryptionService, rotation failed",
    ] {
        let draft = MemoryDraft::episodic(scope.clone(), content);
        test.engine.store().store(draft).await.unwrap();
    }

    test.llm.push_json(json!({
        "triples": [{
            "subject": "AuthService",
            "predicate": "depends_on",
            "object": "EncryptionService",
            "confidence": 0.9
        }],
        "entities": [
            {"name": "AuthService", "entity_type": "service"},
            {"name": "EncryptionService", "entity_type": "service"}
        ]
    }));

    let outcome = test
        .engine
        .extraction()
        .extract(&scope, &ExtractionOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.statistics.triples_count, 1);
    assert!(outcome.statistics.entities_count >= 2);
    assert_eq!(outcome.statistics.batches_failed, 0);

    let edges = test
        .storage
        .list_edges(&scope, &EdgeFilter {
            relation: Some("depends_on".to_string()),
            limit: 10,
        })
        .await
        .unwrap();
    assert_eq!(edges.len(), 1);

    // Extraction marks its inputs consolidated.
    let leftover = test
        .storage
        .find_unconsolidated_episodes(&scope, None, 10)
        .await
        .unwrap();
    assert!(leftover.is_empty());

    let response = test
        .engine
        .search()
        .search(
            &scope,
            "authentication dependencies",
            &SearchOptions::with_k(5).with_graph(2),
        )
        .await
        .unwrap();

    let stats = response.graph_statistics.expect("graph stats present");
    assert!(stats.graph_nodes >= 2);
    assert!(response.synthesized_context.contains("EncryptionService"));
}

#[tokio::test]
async fn test_cache_hit_on_repeat_query() {
    let test = engine().await;
    let scope = scope();

    let draft = MemoryDraft::episodic(scope.clone(), "cache me if you can");
    test.engine.store().store(draft).await.unwrap();

    let options = SearchOptions::with_k(3);
    let first = test
        .engine
        .search()
        .search(&scope, "cache me", &options)
        .await
        .unwrap();
    assert!(!first.metadata.cache_hit);

    let second = test
        .engine
        .search()
        .search(&scope, "cache me", &options)
        .await
        .unwrap();
    assert!(second.metadata.cache_hit);
    assert_eq!(test.engine.cache().stats().hits, 1);
    assert_eq!(second.results.len(), first.results.len());

    // Invalidation forces the next identical query back to a miss.
    test.engine.cache().invalidate(&scope.tenant_id, Some(&scope.project_id));
    let third = test
        .engine
        .search()
        .search(&scope, "cache me", &options)
        .await
        .unwrap();
    assert!(!third.metadata.cache_hit);
}

#[tokio::test]
async fn test_budget_exceeded_blocks_before_llm() {
    let test = engine().await;
    let scope = scope();

    test.storage
        .upsert(&Budget::new("t1", 0.001))
        .await
        .unwrap();

    let draft = MemoryDraft::episodic(scope.clone(), "some context");
    test.engine.store().store(draft).await.unwrap();

    let err = test
        .engine
        .orchestrator()
        .execute_task(
            &scope,
            "Write a long analysis of everything we know",
            &TaskOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BudgetExceeded { .. }));

    // Refused before any provider call: no cost rows, no LLM traffic.
    let usage = test
        .storage
        .usage_since("t1", Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(usage.call_count, 0);
    assert!(test.llm.calls().is_empty());
}

#[tokio::test]
async fn test_agent_task_accounts_cost() {
    let test = engine().await;
    let scope = scope();

    let draft = MemoryDraft::episodic(scope.clone(), "the deploy window is Tuesday");
    test.engine.store().store(draft).await.unwrap();

    test.llm.push_response("Deploys happen on Tuesday.");
    let execution = test
        .engine
        .orchestrator()
        .execute_task(&scope, "when do we deploy", &TaskOptions::default())
        .await
        .unwrap();

    assert_eq!(execution.answer, "Deploys happen on Tuesday.");
    assert!(!execution.used_memories.is_empty());
    assert!(execution.cost.total_estimate > 0.0);
    assert!(execution.cost.input_tokens > 0);

    let usage = test
        .storage
        .usage_for_operation("t1", "completion", Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(usage.call_count, 1);
    assert!(usage.total_cost_usd > 0.0);

    // The exchange itself lands as an episodic memory for later reflection.
    let exchanges = test
        .storage
        .list_by_layer(&scope, MemoryLayer::Episodic, &MemoryQuery {
            source: Some("agent_exchange".to_string()),
            ..MemoryQuery::with_limit(10)
        })
        .await
        .unwrap();
    assert_eq!(exchanges.len(), 1);
}

#[tokio::test]
async fn test_reflection_generation() {
    let mut config = EngineConfig::default();
    config.reflection.min_episodes = 20;
    let test = engine_with(config).await;
    let scope = scope();

    let start = Utc::now() - Duration::days(2);
    let mut stored_ids = Vec::new();
    for i in 0..25 {
        let mut draft = MemoryDraft::episodic(
            scope.clone(),
            format!("deploy pipeline failed with timeout error, attempt {i}"),
        );
        draft.timestamp = Some(start + Duration::minutes(i * 90));
        stored_ids.push(test.engine.store().store(draft).await.unwrap());
    }

    for _ in 0..3 {
        test.llm.push_json(json!({
            "summary": "Deploy pipeline timeouts recur across attempts.",
            "key_insights": ["Timeouts cluster around deploys"],
            "reflection_type": "pattern"
        }));
    }

    let outcome = test
        .engine
        .reflection()
        .run_for_scope(&scope)
        .await
        .unwrap();
    assert!(outcome.reflections_created >= 1);

    let reflections = test
        .storage
        .list_by_layer(
            &scope,
            MemoryLayer::Reflective,
            &MemoryQuery::with_limit(10),
        )
        .await
        .unwrap();
    assert!(!reflections.is_empty());

    let reflection = &reflections[0];
    assert_eq!(
        reflection.consolidation_status,
        ConsolidationStatus::Consolidated
    );
    assert!(!reflection.parent_ids.is_empty());
    assert!(
        reflection.parent_ids.iter().all(|p| stored_ids.contains(p)),
        "parents must be drawn from the stored episodes"
    );

    let parents = test
        .storage
        .get_batch(&reflection.parent_ids, &scope)
        .await
        .unwrap();
    assert!(
        parents
            .iter()
            .all(|p| p.consolidation_status == ConsolidationStatus::Consolidated)
    );
}

#[tokio::test]
async fn test_lifecycle_start_and_stop() {
    let test = engine().await;
    test.engine.start().await.unwrap();
    // Idempotent start.
    test.engine.start().await.unwrap();
    test.engine.stop().await;
}

#[tokio::test]
async fn test_k_zero_returns_empty_without_side_effects() {
    let test = engine().await;
    let scope = scope();

    let draft = MemoryDraft::episodic(scope.clone(), "anything at all");
    let id = test.engine.store().store(draft).await.unwrap();

    let response = test
        .engine
        .search()
        .search(&scope, "anything", &SearchOptions::with_k(0))
        .await
        .unwrap();
    assert!(response.results.is_empty());
    assert!(test.engine.cache().is_empty());

    let stored = test.storage.get(id, &scope).await.unwrap().unwrap();
    assert_eq!(stored.usage_count, 0);
}

#[tokio::test]
async fn test_graph_depth_clamped_with_warning() {
    let test = engine().await;
    let scope = scope();

    let draft = MemoryDraft::episodic(scope.clone(), "depth probe memory");
    test.engine.store().store(draft).await.unwrap();

    let response = test
        .engine
        .search()
        .search(
            &scope,
            "depth probe",
            &SearchOptions::with_k(3).with_graph(9),
        )
        .await
        .unwrap();
    assert!(
        response
            .metadata
            .warnings
            .iter()
            .any(|w| w.contains("clamped"))
    );
}
