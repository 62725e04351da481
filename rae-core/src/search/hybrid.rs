//! The central retrieval pipeline.
//!
//! Cache lookup, query analysis, per-strategy retrieval (vector, full-text,
//! semantic-node, graph), score fusion with importance/recency modulation,
//! optional reranking, access-stats bookkeeping, cache store, and context
//! synthesis.

use super::analyzer::QueryAnalyzer;
use super::fusion::{self, CandidateSet, FusedScore};
use super::types::{
    GraphSearchStats, RetrievedMemory, SearchMetadata, SearchOptions, SearchResponse, Strategy,
};
use crate::cache::{ContextCache, fingerprint};
use crate::error::Result;
use crate::graph::GraphTraversalService;
use crate::ports::{
    EmbeddingProvider, RerankCandidate, Reranker, VectorFilter, VectorIndex, cosine_similarity,
    normalize_cosine,
};
use crate::repository::{MemoryRepository, NodeFilter};
use crate::scoring::QueryHistory;
use crate::telemetry::Telemetry;
use crate::types::{Memory, Scope, SearchConfig};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Distinct graph nodes kept by the semantic-node strategy.
const SEMANTIC_NODE_KEEP: usize = 8;

/// Outcome of the graph strategy: scored memory candidates plus the
/// traversal context used in synthesis.
#[derive(Debug, Default)]
struct GraphStrategyResult {
    scored: Vec<(Uuid, f64)>,
    stats: Option<GraphSearchStats>,
    context_lines: Vec<String>,
}

/// Hybrid retrieval over memories and the knowledge graph.
pub struct HybridSearchService {
    memories: Arc<dyn MemoryRepository>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn Reranker>>,
    traversal: Arc<GraphTraversalService>,
    analyzer: QueryAnalyzer,
    cache: Arc<ContextCache<SearchResponse>>,
    query_history: Arc<QueryHistory>,
    telemetry: Telemetry,
    config: SearchConfig,
}

impl HybridSearchService {
    /// Wire a search service.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        memories: Arc<dyn MemoryRepository>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn Reranker>>,
        traversal: Arc<GraphTraversalService>,
        analyzer: QueryAnalyzer,
        cache: Arc<ContextCache<SearchResponse>>,
        query_history: Arc<QueryHistory>,
        telemetry: Telemetry,
        config: SearchConfig,
    ) -> Self {
        Self {
            memories,
            vectors,
            embedder,
            reranker,
            traversal,
            analyzer,
            cache,
            query_history,
            telemetry,
            config,
        }
    }

    /// The context cache this service reads and writes.
    #[must_use]
    pub fn cache(&self) -> &Arc<ContextCache<SearchResponse>> {
        &self.cache
    }

    /// Run the retrieval pipeline.
    #[instrument(skip(self, options), fields(scope = %scope, k = options.k))]
    pub async fn search(
        &self,
        scope: &Scope,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        scope.validate()?;
        if options.k == 0 {
            return Ok(SearchResponse {
                results: Vec::new(),
                synthesized_context: String::new(),
                graph_statistics: None,
                metadata: SearchMetadata::default(),
            });
        }

        let mut warnings = Vec::new();
        let depth = self.clamp_depth(options, &mut warnings);

        let key = fingerprint::fingerprint(
            scope,
            query,
            &options.filters,
            Utc::now().timestamp(),
            self.cache.pipeline_version(),
        );
        if !options.nocache {
            if let Some(mut cached) = self.cache.get(&key) {
                self.telemetry.counter("search_cache_hits").increment();
                cached.metadata.cache_hit = true;
                return Ok(cached);
            }
            self.telemetry.counter("search_cache_misses").increment();
        }

        // Resolve strategy weights: preset profile skips analysis.
        let (weights, intent) = match options.profile {
            Some(profile) => (profile.weights(), None),
            None => {
                let analysis = self.analyzer.analyze(query).await;
                (analysis.weights, Some(analysis.intent))
            }
        };
        let weights = if options.use_graph {
            weights
        } else {
            weights.without_graph()
        };

        let k_strategy = ((options.k as f64) * self.config.oversample).ceil() as usize;
        let query_embedding = self
            .embedder
            .embed_text(query)
            .await
            .map_err(|e| e.into_service_error("embedding-provider"))?;
        self.query_history.record(scope, query_embedding.clone());

        // Vector runs first: its top hits seed the graph strategy.
        let vector_candidates = self
            .vector_candidates(scope, &query_embedding, k_strategy, options)
            .await?;
        let seed_ids: Vec<Uuid> = vector_candidates.iter().map(|(id, _)| *id).collect();

        let (fulltext_result, semantic_result, graph_result) = tokio::join!(
            self.fulltext_candidates(scope, query, k_strategy),
            self.semantic_node_candidates(scope, query, &query_embedding, options),
            self.graph_candidates(scope, &seed_ids, depth, options),
        );
        let fulltext_candidates = fulltext_result?;
        let (semantic_candidates, semantic_warning) = semantic_result?;
        if let Some(warning) = semantic_warning {
            warnings.push(warning);
        }
        let graph = graph_result?;

        let candidate_sets = vec![
            CandidateSet {
                strategy: Strategy::Vector,
                scored: vector_candidates,
            },
            CandidateSet {
                strategy: Strategy::Fulltext,
                scored: fulltext_candidates,
            },
            CandidateSet {
                strategy: Strategy::SemanticNode,
                scored: semantic_candidates,
            },
            CandidateSet {
                strategy: Strategy::Graph,
                scored: graph.scored,
            },
        ];
        let fused = fusion::fuse(&candidate_sets, &weights);

        let mut ranked = self.load_and_rank(scope, fused).await?;
        let top = self.apply_rerank(query, &mut ranked, options.k).await;

        let results: Vec<RetrievedMemory> = top
            .into_iter()
            .map(|(memory, score, fused)| RetrievedMemory {
                memory,
                score,
                fused_score: fused.fused,
                strategy_scores: fused.per_strategy,
            })
            .collect();

        if !results.is_empty() {
            let ids: Vec<Uuid> = results.iter().map(|r| r.memory.id).collect();
            self.memories
                .record_access(&ids, scope)
                .await
                .map_err(|e| e.into_service_error("relational-store"))?;
        }

        let synthesized_context =
            synthesize_context(&results, graph.stats.as_ref(), &graph.context_lines, intent);
        let response = SearchResponse {
            results,
            synthesized_context,
            graph_statistics: graph.stats,
            metadata: SearchMetadata {
                cache_hit: false,
                intent,
                weights: Some(weights),
                warnings,
            },
        };

        if !options.nocache {
            let ttl = if response.results.is_empty() {
                Some(self.cache.negative_ttl())
            } else {
                None
            };
            self.cache.put_if_absent(key, scope, response.clone(), ttl);
        }

        debug!(results = response.results.len(), "search complete");
        Ok(response)
    }

    /// Clamp the requested graph depth at the configured cap, warning when
    /// a clamp happened.
    fn clamp_depth(&self, options: &SearchOptions, warnings: &mut Vec<String>) -> u8 {
        let requested = options.graph_depth.unwrap_or(self.config.default_graph_depth);
        if requested > self.config.max_graph_depth {
            warnings.push(format!(
                "graph_depth {requested} clamped to {}",
                self.config.max_graph_depth
            ));
            self.config.max_graph_depth
        } else {
            requested
        }
    }

    /// Vector strategy: similarity search with cosine scores normalized to
    /// [0, 1].
    async fn vector_candidates(
        &self,
        scope: &Scope,
        query_embedding: &[f32],
        k_strategy: usize,
        options: &SearchOptions,
    ) -> Result<Vec<(Uuid, f64)>> {
        let filter = VectorFilter {
            layers: options.filters.layers.clone(),
            tags: options.filters.tags.clone(),
        };
        let matches = self
            .vectors
            .search(scope, query_embedding, k_strategy, &filter)
            .await
            .map_err(|e| e.into_service_error("vector-index"))?;
        Ok(matches
            .into_iter()
            .map(|m| (m.id, normalize_cosine(m.score)))
            .collect())
    }

    /// Full-text strategy: relational FTS relevance.
    async fn fulltext_candidates(
        &self,
        scope: &Scope,
        query: &str,
        k_strategy: usize,
    ) -> Result<Vec<(Uuid, f64)>> {
        let hits = self
            .memories
            .fulltext_search(scope, query, k_strategy)
            .await
            .map_err(|e| e.into_service_error("relational-store"))?;
        Ok(hits.into_iter().map(|(m, score)| (m.id, score)).collect())
    }

    /// Semantic-node strategy: nearest graph-node labels, then the memories
    /// those nodes were extracted from.
    ///
    /// Label similarity uses the embedding provider; if batch embedding
    /// fails the strategy degrades to lexical token overlap and reports a
    /// warning instead of failing the request.
    async fn semantic_node_candidates(
        &self,
        scope: &Scope,
        query: &str,
        query_embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<(Vec<(Uuid, f64)>, Option<String>)> {
        if !options.use_graph {
            return Ok((Vec::new(), None));
        }
        let nodes = self
            .traversal
            .list_nodes(
                scope,
                &NodeFilter {
                    limit: self.config.semantic_node_pool,
                    ..NodeFilter::default()
                },
            )
            .await?;
        if nodes.is_empty() {
            return Ok((Vec::new(), None));
        }

        let labels: Vec<String> = nodes.iter().map(|n| n.label.clone()).collect();
        let (similarities, warning): (Vec<f64>, Option<String>) =
            match self.embedder.embed_batch(&labels).await {
                Ok(embeddings) => (
                    embeddings
                        .iter()
                        .map(|e| normalize_cosine(f64::from(cosine_similarity(
                            query_embedding,
                            e,
                        ))))
                        .collect(),
                    None,
                ),
                Err(err) => {
                    warn!(error = %err, "semantic-node strategy degraded to lexical match");
                    (
                        labels
                            .iter()
                            .map(|label| lexical_overlap(query, label))
                            .collect(),
                        Some("semantic-node strategy degraded to lexical match".to_string()),
                    )
                }
            };

        let mut scored_nodes: Vec<(usize, f64)> = similarities.into_iter().enumerate().collect();
        scored_nodes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored_nodes.truncate(SEMANTIC_NODE_KEEP);

        let mut candidates: HashMap<Uuid, f64> = HashMap::new();
        for (index, similarity) in scored_nodes {
            for memory_id in nodes[index].source_memory_ids() {
                let entry = candidates.entry(memory_id).or_insert(0.0);
                if similarity > *entry {
                    *entry = similarity;
                }
            }
        }
        Ok((candidates.into_iter().collect(), warning))
    }

    /// Graph strategy: expand from vector-seeded entities, score attached
    /// memories by hop distance.
    async fn graph_candidates(
        &self,
        scope: &Scope,
        seed_memory_ids: &[Uuid],
        depth: u8,
        options: &SearchOptions,
    ) -> Result<GraphStrategyResult> {
        if !options.use_graph || seed_memory_ids.is_empty() {
            return Ok(GraphStrategyResult::default());
        }
        let expansion = self
            .traversal
            .expand_from_memories(scope, seed_memory_ids, depth)
            .await?;
        if expansion.subgraph.is_empty() {
            return Ok(GraphStrategyResult::default());
        }

        let scored = expansion
            .memory_hits
            .iter()
            .map(|(id, hop)| (*id, 1.0 / (1.0 + f64::from(*hop))))
            .collect();

        let label_by_id: HashMap<Uuid, &str> = expansion
            .subgraph
            .nodes
            .iter()
            .map(|n| (n.id, n.label.as_str()))
            .collect();
        let context_lines = expansion
            .subgraph
            .edges
            .iter()
            .filter_map(|edge| {
                let source = label_by_id.get(&edge.source_node_id)?;
                let target = label_by_id.get(&edge.target_node_id)?;
                Some(format!("{source} [{}] {target}", edge.relation))
            })
            .collect();

        Ok(GraphStrategyResult {
            scored,
            stats: Some(GraphSearchStats {
                graph_nodes: expansion.subgraph.nodes.len() as u64,
                graph_edges: expansion.subgraph.edges.len() as u64,
                seed_count: expansion.seed_count as u64,
                depth,
            }),
            context_lines,
        })
    }

    /// Load candidate memories, drop archived and foreign rows, apply the
    /// modulation formula, and sort deterministically.
    async fn load_and_rank(
        &self,
        scope: &Scope,
        fused: HashMap<Uuid, FusedScore>,
    ) -> Result<Vec<(Memory, f64, FusedScore)>> {
        let ids: Vec<Uuid> = fused.keys().copied().collect();
        let memories = self
            .memories
            .get_batch(&ids, scope)
            .await
            .map_err(|e| e.into_service_error("relational-store"))?;

        let now = Utc::now();
        let mut ranked: Vec<(Memory, f64, FusedScore)> = memories
            .into_iter()
            .filter(Memory::is_retrievable)
            .filter_map(|memory| {
                let fused_score = fused.get(&memory.id)?.clone();
                let score = fusion::modulate(
                    fused_score.fused,
                    &memory,
                    now,
                    self.config.alpha,
                    self.config.beta,
                    self.config.gamma,
                );
                Some((memory, score, fused_score))
            })
            .collect();
        fusion::rank(&mut ranked);
        Ok(ranked)
    }

    /// Optionally rerank the fused top pool; rerank order decides the final
    /// top-k while fused scores stay in the output.
    async fn apply_rerank(
        &self,
        query: &str,
        ranked: &mut Vec<(Memory, f64, FusedScore)>,
        k: usize,
    ) -> Vec<(Memory, f64, FusedScore)> {
        let reranker = match &self.reranker {
            Some(reranker) if ranked.len() > k => reranker,
            _ => {
                ranked.truncate(k);
                return std::mem::take(ranked);
            }
        };

        let pool_size = (self.config.rerank_pool_factor * k).min(ranked.len());
        let pool: Vec<(Memory, f64, FusedScore)> = ranked.drain(..pool_size).collect();
        let candidates: Vec<RerankCandidate> = pool
            .iter()
            .map(|(memory, _, fused)| RerankCandidate {
                id: memory.id,
                text: memory.content.clone(),
                score: fused.fused,
            })
            .collect();

        match reranker.rerank(query, candidates, k).await {
            Ok(ordered) => {
                let mut by_id: HashMap<Uuid, (Memory, f64, FusedScore)> =
                    pool.into_iter().map(|entry| (entry.0.id, entry)).collect();
                ordered
                    .into_iter()
                    .filter_map(|candidate| by_id.remove(&candidate.id))
                    .collect()
            }
            Err(err) => {
                // Reranking is best-effort; fall back to fused order.
                warn!(error = %err, "rerank failed, using fused order");
                self.telemetry.counter("search_rerank_failures").increment();
                let mut pool = pool;
                pool.truncate(k);
                pool
            }
        }
    }
}

/// Token overlap between a query and a node label, in [0, 1].
fn lexical_overlap(query: &str, label: &str) -> f64 {
    let query_lower = query.to_lowercase();
    let query_tokens: std::collections::HashSet<&str> =
        query_lower.split_whitespace().collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let label_lower = label.to_lowercase();
    let label_tokens: Vec<&str> = label_lower.split_whitespace().collect();
    if label_tokens.is_empty() {
        return 0.0;
    }
    let hits = label_tokens
        .iter()
        .filter(|t| query_tokens.contains(**t) || query_lower.contains(**t))
        .count();
    hits as f64 / label_tokens.len() as f64
}

/// Deterministic prompt-ready context: ordered headings "Retrieved
/// Memories", "Graph Context", "Statistics".
fn synthesize_context(
    results: &[RetrievedMemory],
    graph_stats: Option<&GraphSearchStats>,
    graph_lines: &[String],
    intent: Option<super::analyzer::QueryIntent>,
) -> String {
    let mut out = String::from("## Retrieved Memories\n");
    if results.is_empty() {
        out.push_str("(none)\n");
    }
    for (rank, result) in results.iter().enumerate() {
        out.push_str(&format!(
            "{}. [score={:.3} layer={}] {}\n",
            rank + 1,
            result.score,
            result.memory.layer,
            result.memory.content
        ));
    }

    if let Some(stats) = graph_stats {
        out.push_str("\n## Graph Context\n");
        if graph_lines.is_empty() {
            out.push_str("(no relations traversed)\n");
        }
        for line in graph_lines {
            out.push_str(&format!("- {line}\n"));
        }
        out.push_str(&format!(
            "\n## Statistics\nmemories: {}\ngraph_nodes: {}\ngraph_edges: {}\n",
            results.len(),
            stats.graph_nodes,
            stats.graph_edges
        ));
    } else {
        out.push_str(&format!("\n## Statistics\nmemories: {}\n", results.len()));
    }
    if let Some(intent) = intent {
        out.push_str(&format!("intent: {}\n", serde_json::json!(intent).as_str().unwrap_or("unknown")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::analyzer::QueryIntent;
    use crate::types::{MemoryDraft, MemoryLayer};

    fn retrieved(content: &str, score: f64) -> RetrievedMemory {
        let memory = MemoryDraft::episodic(Scope::new("t1", "p1"), content)
            .into_memory(Utc::now());
        RetrievedMemory {
            memory,
            score,
            fused_score: score,
            strategy_scores: std::collections::BTreeMap::new(),
        }
    }

    #[test]
    fn test_synthesis_headings_in_order() {
        let results = vec![retrieved("user prefers dark mode", 0.9)];
        let stats = GraphSearchStats {
            graph_nodes: 2,
            graph_edges: 1,
            seed_count: 1,
            depth: 2,
        };
        let lines = vec!["AuthService [depends_on] EncryptionService".to_string()];
        let context =
            synthesize_context(&results, Some(&stats), &lines, Some(QueryIntent::Relational));

        let memories_at = context.find("## Retrieved Memories").unwrap();
        let graph_at = context.find("## Graph Context").unwrap();
        let stats_at = context.find("## Statistics").unwrap();
        assert!(memories_at < graph_at);
        assert!(graph_at < stats_at);
        assert!(context.contains("EncryptionService"));
        assert!(context.contains("graph_nodes: 2"));
    }

    #[test]
    fn test_synthesis_without_graph() {
        let context = synthesize_context(&[retrieved("x", 0.5)], None, &[], None);
        assert!(context.contains("## Retrieved Memories"));
        assert!(!context.contains("## Graph Context"));
        assert!(context.contains("memories: 1"));
    }

    #[test]
    fn test_synthesis_empty_results() {
        let context = synthesize_context(&[], None, &[], None);
        assert!(context.contains("(none)"));
    }

    #[test]
    fn test_lexical_overlap() {
        assert!((lexical_overlap("authentication dependencies", "authentication") - 1.0).abs() < 1e-9);
        assert!(lexical_overlap("dark mode", "EncryptionService").abs() < 1e-9);
        assert!(lexical_overlap("", "anything").abs() < 1e-9);
    }

    #[test]
    fn test_layer_display_in_synthesis() {
        let mut result = retrieved("fact", 0.4);
        result.memory.layer = MemoryLayer::Semantic;
        let context = synthesize_context(&[result], None, &[], None);
        assert!(context.contains("layer=semantic"));
    }
}
