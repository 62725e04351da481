//! Graph traversal, PageRank, hierarchical reflection, and extraction
//! failure-tolerance over the assembled engine.

mod common;

use common::{engine, engine_with, engine_with_reranker};
use rae_core::graph::ExtractionOptions;
use rae_core::repository::{GraphRepository, MemoryRepository, NodeFilter};
use rae_core::search::SearchOptions;
use rae_core::types::{EngineConfig, MemoryDraft, Scope};
use serde_json::json;

fn scope() -> Scope {
    Scope::new("t1", "p1")
}

/// Store three linked services and extract their graph.
async fn seed_service_graph(test: &common::TestEngine, scope: &Scope) {
    for content in [
        "GatewayService depends on AuthService for request checks",
        "AuthService depends on EncryptionService for token sealing",
    ] {
        let draft = MemoryDraft::episodic(scope.clone(), content);
        test.engine.store().store(draft).await.unwrap();
    }
    test.llm.push_json(json!({
        "triples": [
            {
                "subject": "GatewayService",
                "predicate": "depends_on",
                "object": "AuthService",
                "confidence": 0.9
            },
            {
                "subject": "AuthService",
                "predicate": "depends_on",
                "object": "EncryptionService",
                "confidence": 0.9
            }
        ],
        "entities": []
    }));
    test.engine
        .extraction()
        .extract(scope, &ExtractionOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_subgraph_by_node_ids() {
    let test = engine().await;
    let scope = scope();
    seed_service_graph(&test, &scope).await;

    let one_hop = test
        .engine
        .traversal()
        .subgraph_by_node_ids(&scope, &["authservice".to_string()], 1)
        .await
        .unwrap();
    assert_eq!(one_hop.nodes.len(), 3);
    assert_eq!(one_hop.edges.len(), 2);

    let zero_hop = test
        .engine
        .traversal()
        .subgraph_by_node_ids(&scope, &["gatewayservice".to_string()], 0)
        .await
        .unwrap();
    assert_eq!(zero_hop.nodes.len(), 1);

    let unknown = test
        .engine
        .traversal()
        .subgraph_by_node_ids(&scope, &["nosuchnode".to_string()], 2)
        .await
        .unwrap();
    assert!(unknown.is_empty());
}

#[tokio::test]
async fn test_pagerank_recompute_and_filter() {
    let test = engine().await;
    let scope = scope();
    seed_service_graph(&test, &scope).await;

    let updated = test
        .engine
        .traversal()
        .recompute_pagerank(&scope)
        .await
        .unwrap();
    assert_eq!(updated, 3);

    let nodes = test
        .storage
        .list_nodes(&scope, &NodeFilter {
            order_by_pagerank: true,
            limit: 10,
            ..NodeFilter::default()
        })
        .await
        .unwrap();
    // EncryptionService sits downstream of both other services.
    assert_eq!(nodes[0].node_id, "encryptionservice");
    assert!((nodes[0].pagerank_score().unwrap() - 1.0).abs() < 1e-9);

    let high_only = test
        .storage
        .list_nodes(&scope, &NodeFilter {
            min_pagerank: Some(0.99),
            limit: 10,
            ..NodeFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(high_only.len(), 1);
}

#[tokio::test]
async fn test_graph_stats() {
    let test = engine().await;
    let scope = scope();
    seed_service_graph(&test, &scope).await;

    let stats = test.storage.stats(&scope).await.unwrap();
    assert_eq!(stats.node_count, 3);
    assert_eq!(stats.edge_count, 2);
    assert_eq!(stats.unique_relations(), 1);
    assert_eq!(stats.relation_counts["depends_on"], 2);
    assert!((stats.avg_degree - 4.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_extraction_partial_failure_keeps_memories_raw() {
    let mut config = EngineConfig::default();
    config.extraction.batch_size = 5;
    let test = engine_with(config).await;
    let scope = scope();

    for i in 0..10 {
        let draft = MemoryDraft::episodic(scope.clone(), format!("ServiceA calls ServiceB, log {i}"));
        test.engine.store().store(draft).await.unwrap();
    }

    // One batch succeeds, one hits a provider outage.
    test.llm.push_json(json!({
        "triples": [{
            "subject": "ServiceA",
            "predicate": "calls",
            "object": "ServiceB",
            "confidence": 0.8
        }],
        "entities": []
    }));
    test.llm.push_failure();

    let outcome = test
        .engine
        .extraction()
        .extract(&scope, &ExtractionOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.statistics.batches_failed, 1);
    assert_eq!(outcome.statistics.memories_processed, 5);

    // The failed batch stays available for the next invocation.
    let leftover = test
        .storage
        .find_unconsolidated_episodes(&scope, None, 20)
        .await
        .unwrap();
    assert_eq!(leftover.len(), 5);
}

#[tokio::test]
async fn test_low_confidence_triples_dropped() {
    let test = engine().await;
    let scope = scope();

    let draft = MemoryDraft::episodic(scope.clone(), "maybe CacheLayer talks to Disk");
    test.engine.store().store(draft).await.unwrap();

    test.llm.push_json(json!({
        "triples": [{
            "subject": "CacheLayer",
            "predicate": "talks_to",
            "object": "Disk",
            "confidence": 0.2
        }],
        "entities": []
    }));

    let options = ExtractionOptions {
        min_confidence: 0.5,
        ..ExtractionOptions::default()
    };
    let outcome = test.engine.extraction().extract(&scope, &options).await.unwrap();
    assert_eq!(outcome.statistics.triples_count, 0);

    let edges = test
        .storage
        .list_edges(&scope, &rae_core::repository::EdgeFilter::default())
        .await
        .unwrap();
    assert!(edges.is_empty());
}

#[tokio::test]
async fn test_hierarchical_summary_reduces_to_one() {
    let mut config = EngineConfig::default();
    config.reflection.bucket_size = 4;
    let test = engine_with(config).await;
    let scope = scope();

    for i in 0..10 {
        let draft =
            MemoryDraft::episodic(scope.clone(), format!("sprint note number {i}"));
        test.engine.store().store(draft).await.unwrap();
    }

    // 10 leaves -> 3 bucket summaries -> 1 root summary.
    for text in [
        "bucket one summary",
        "bucket two summary",
        "bucket three summary",
        "root: the sprint closed out cleanly",
    ] {
        test.llm.push_response(text);
    }

    let result = test
        .engine
        .reflection()
        .hierarchical_summary(&scope, 100)
        .await
        .unwrap();
    assert_eq!(result.summary, "root: the sprint closed out cleanly");
    assert_eq!(result.statistics.episodes, 10);
    assert_eq!(result.statistics.levels, 2);
    assert_eq!(result.statistics.llm_calls, 4);
}

#[tokio::test]
async fn test_hierarchical_summary_empty_scope() {
    let test = engine().await;
    let result = test
        .engine
        .reflection()
        .hierarchical_summary(&scope(), 100)
        .await
        .unwrap();
    assert!(result.summary.is_empty());
    assert_eq!(result.statistics.episodes, 0);
}

#[tokio::test]
async fn test_rerank_orders_final_top_k() {
    let test = engine_with_reranker().await;
    let scope = scope();

    for content in [
        "release checklist for the api",
        "release checklist for the worker",
        "release checklist for the scheduler",
    ] {
        let draft = MemoryDraft::episodic(scope.clone(), content);
        test.engine.store().store(draft).await.unwrap();
    }

    let mut options = SearchOptions::with_k(1);
    options.rerank = true;
    let response = test
        .engine
        .search()
        .search(&scope, "release checklist", &options)
        .await
        .unwrap();
    assert_eq!(response.results.len(), 1);
    assert!(response.results[0].fused_score > 0.0);
}
