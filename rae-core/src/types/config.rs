//! Engine configuration.
//!
//! Each service takes its own config struct; [`EngineConfig`] bundles them
//! for callers that wire the whole engine. Defaults carry the tuned values
//! the services are documented against.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hybrid-search tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Multiplier applied to `k` for per-strategy candidate pools
    pub oversample: f64,
    /// Weight of the fused strategy score in the final ranking
    pub alpha: f64,
    /// Weight of stored importance in the final ranking
    pub beta: f64,
    /// Weight of the recency factor in the final ranking
    pub gamma: f64,
    /// Default graph traversal depth for the graph strategy
    pub default_graph_depth: u8,
    /// Hard cap on graph traversal depth; larger requests are clamped
    pub max_graph_depth: u8,
    /// Candidate nodes considered by the semantic-node strategy
    pub semantic_node_pool: usize,
    /// Rerank pool multiplier: reranker sees the top `rerank_pool_factor * k`
    pub rerank_pool_factor: usize,
    /// Classify queries with the LLM instead of the rule-based classifier
    pub llm_query_analysis: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            oversample: 3.0,
            alpha: 0.7,
            beta: 0.2,
            gamma: 0.1,
            default_graph_depth: 2,
            max_graph_depth: 5,
            semantic_node_pool: 64,
            rerank_pool_factor: 3,
            llm_query_analysis: false,
        }
    }
}

/// Context-cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum entries before LRU eviction
    pub capacity: usize,
    /// TTL for populated results
    pub default_ttl: Duration,
    /// TTL for empty (negative) results
    pub negative_ttl: Duration,
    /// Version tag mixed into every fingerprint; bump to invalidate all
    /// entries across a pipeline change
    pub pipeline_version: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            default_ttl: Duration::from_secs(300),
            negative_ttl: Duration::from_secs(60),
            pipeline_version: 1,
        }
    }
}

/// Importance scoring and decay tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight of the recency factor
    pub recency_weight: f64,
    /// Weight of access frequency
    pub frequency_weight: f64,
    /// Weight of graph centrality
    pub centrality_weight: f64,
    /// Weight of similarity to recent queries
    pub relevance_weight: f64,
    /// Weight of the user-provided override
    pub override_weight: f64,
    /// Weight of the consolidation boost
    pub consolidation_weight: f64,
    /// Usage count at which the frequency factor saturates
    pub frequency_saturation: f64,
    /// Recent query embeddings retained per scope
    pub query_history_size: usize,
    /// Importance below which an old memory is archived
    pub archive_importance_threshold: f64,
    /// Age in days beyond which low-importance memories are archived
    pub archive_age_days: f64,
    /// Days an archived memory is retained for audit before deletion
    pub archive_retention_days: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            recency_weight: 0.25,
            frequency_weight: 0.20,
            centrality_weight: 0.25,
            relevance_weight: 0.15,
            override_weight: 0.10,
            consolidation_weight: 0.05,
            frequency_saturation: 10.0,
            query_history_size: 20,
            archive_importance_threshold: 0.05,
            archive_age_days: 90.0,
            archive_retention_days: 30.0,
        }
    }
}

/// Graph-extraction tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Memories per LLM extraction batch
    pub batch_size: usize,
    /// Concurrent batches per invocation
    pub batch_concurrency: usize,
    /// Default confidence floor for storing triples
    pub default_min_confidence: f64,
    /// Model used for extraction prompts
    pub model: String,
    /// Max tokens for the extraction completion
    pub max_tokens: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            batch_concurrency: 4,
            default_min_confidence: 0.5,
            model: "default".to_string(),
            max_tokens: 2_048,
        }
    }
}

/// Reflection-pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    /// Unconsolidated episodes required before a scope is reflected
    pub min_episodes: usize,
    /// Episodes fetched per pipeline run
    pub max_memories: usize,
    /// Smallest cluster that produces a reflection
    pub min_cluster_size: usize,
    /// Reflections with overlapping parents required for a meta-insight
    pub min_reflections_for_meta: usize,
    /// Cosine similarity threshold for embedding clustering
    pub cluster_similarity_threshold: f64,
    /// Time-window width for the bucketing fallback
    pub fallback_window: Duration,
    /// Bucket size for hierarchical map-reduce summarization
    pub bucket_size: usize,
    /// Initial importance assigned to reflective memories
    pub reflection_importance: f64,
    /// Model used for reflection prompts
    pub model: String,
    /// Max tokens for reflection completions
    pub max_tokens: u32,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            min_episodes: 20,
            max_memories: 100,
            min_cluster_size: 5,
            min_reflections_for_meta: 5,
            cluster_similarity_threshold: 0.75,
            fallback_window: Duration::from_secs(86_400),
            bucket_size: 10,
            reflection_importance: 0.7,
            model: "default".to_string(),
            max_tokens: 1_024,
        }
    }
}

/// Agent-task orchestration tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Memories retrieved per task when the caller does not say
    pub default_k: usize,
    /// Token budget for injected reflective memories
    pub reflection_token_budget: u64,
    /// Recent reflective memories considered for injection
    pub reflection_candidates: usize,
    /// Deadline for the task's LLM call
    pub llm_timeout: Duration,
    /// Record an episodic memory of each completed task
    pub post_hoc_memory: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            reflection_token_budget: 1_024,
            reflection_candidates: 3,
            llm_timeout: Duration::from_secs(60),
            post_hoc_memory: true,
        }
    }
}

/// Background sweeper intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Decay sweep interval
    pub decay_interval: Duration,
    /// Cache expiry sweep interval
    pub cache_interval: Duration,
    /// Reflection pipeline interval
    pub reflection_interval: Duration,
    /// Archived-memory purge interval
    pub archive_interval: Duration,
    /// Bounded drain period on shutdown
    pub drain_timeout: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            decay_interval: Duration::from_secs(3_600),
            cache_interval: Duration::from_secs(60),
            reflection_interval: Duration::from_secs(1_800),
            archive_interval: Duration::from_secs(6 * 3_600),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// Bundle of every service config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hybrid-search tuning
    pub search: SearchConfig,
    /// Context-cache tuning
    pub cache: CacheConfig,
    /// Importance scoring and decay tuning
    pub scoring: ScoringConfig,
    /// Graph-extraction tuning
    pub extraction: ExtractionConfig,
    /// Reflection-pipeline tuning
    pub reflection: ReflectionConfig,
    /// Agent-task orchestration tuning
    pub orchestrator: OrchestratorConfig,
    /// Background sweeper intervals
    pub sweepers: SweeperConfig,
}
