//! Search request/response types and strategy weighting.

use crate::types::{Memory, SearchFilters};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Retrieval strategies the hybrid pipeline fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Embedding similarity against the vector index
    Vector,
    /// Relational full-text search
    Fulltext,
    /// Graph nodes whose labels are semantically near the query
    SemanticNode,
    /// Graph traversal from vector-seeded entities
    Graph,
}

impl Strategy {
    /// Stable name used in per-strategy score maps.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Vector => "vector",
            Strategy::Fulltext => "fulltext",
            Strategy::SemanticNode => "semantic",
            Strategy::Graph => "graph",
        }
    }
}

/// Normalized weight vector over retrieval strategies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyWeights {
    /// Weight of the vector strategy
    pub vector: f64,
    /// Weight of the semantic-node strategy
    pub semantic: f64,
    /// Weight of the graph strategy
    pub graph: f64,
    /// Weight of the full-text strategy
    pub fulltext: f64,
}

impl StrategyWeights {
    /// Create a weight vector, normalizing so the components sum to 1.
    #[must_use]
    pub fn new(vector: f64, semantic: f64, graph: f64, fulltext: f64) -> Self {
        let total = vector + semantic + graph + fulltext;
        if total <= 0.0 {
            return Self::default();
        }
        Self {
            vector: vector / total,
            semantic: semantic / total,
            graph: graph / total,
            fulltext: fulltext / total,
        }
    }

    /// Weight for one strategy.
    #[must_use]
    pub fn for_strategy(&self, strategy: Strategy) -> f64 {
        match strategy {
            Strategy::Vector => self.vector,
            Strategy::SemanticNode => self.semantic,
            Strategy::Graph => self.graph,
            Strategy::Fulltext => self.fulltext,
        }
    }

    /// Zero out the graph-backed strategies and renormalize.
    #[must_use]
    pub fn without_graph(self) -> Self {
        Self::new(self.vector, 0.0, 0.0, self.fulltext)
    }
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self::new(0.4, 0.2, 0.2, 0.2)
    }
}

/// Named weight presets a caller may request instead of query analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightProfile {
    /// Even mix favoring vector similarity
    Balanced,
    /// Graph-heavy mix for high-precision answers
    Quality,
    /// Vector + full-text only; skips graph work
    Speed,
    /// Equal weight to every strategy
    Comprehensive,
    /// Graph-led discovery of adjacent context
    Exploratory,
}

impl WeightProfile {
    /// The preset weight vector.
    #[must_use]
    pub fn weights(self) -> StrategyWeights {
        match self {
            WeightProfile::Balanced => StrategyWeights::new(0.4, 0.2, 0.2, 0.2),
            WeightProfile::Quality => StrategyWeights::new(0.35, 0.25, 0.25, 0.15),
            WeightProfile::Speed => StrategyWeights::new(0.7, 0.0, 0.0, 0.3),
            WeightProfile::Comprehensive => StrategyWeights::new(0.25, 0.25, 0.25, 0.25),
            WeightProfile::Exploratory => StrategyWeights::new(0.3, 0.2, 0.4, 0.1),
        }
    }
}

impl std::str::FromStr for WeightProfile {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "balanced" => Ok(WeightProfile::Balanced),
            "quality" => Ok(WeightProfile::Quality),
            "speed" => Ok(WeightProfile::Speed),
            "comprehensive" => Ok(WeightProfile::Comprehensive),
            "exploratory" => Ok(WeightProfile::Exploratory),
            other => Err(crate::Error::validation(
                "weight_profile",
                format!("unknown profile `{other}`"),
            )),
        }
    }
}

/// Options for one retrieval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Result count
    pub k: usize,
    /// Pre-filters applied inside each strategy
    pub filters: SearchFilters,
    /// Preset weight profile; skips query analysis when set
    pub profile: Option<WeightProfile>,
    /// Enable the graph-backed strategies and graph context synthesis
    pub use_graph: bool,
    /// Graph traversal depth; defaults from config, clamped at the cap
    pub graph_depth: Option<u8>,
    /// Rerank the fused candidates with the cross-encoder
    pub rerank: bool,
    /// Bypass the context cache for this request
    pub nocache: bool,
}

impl SearchOptions {
    /// Options returning `k` results with defaults everywhere else.
    #[must_use]
    pub fn with_k(k: usize) -> Self {
        Self {
            k,
            filters: SearchFilters::default(),
            profile: None,
            use_graph: false,
            graph_depth: None,
            rerank: false,
            nocache: false,
        }
    }

    /// Enable graph retrieval at the given depth.
    #[must_use]
    pub fn with_graph(mut self, depth: u8) -> Self {
        self.use_graph = true;
        self.graph_depth = Some(depth);
        self
    }
}

/// One ranked retrieval result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedMemory {
    /// The memory record
    pub memory: Memory,
    /// Final ranking score after importance/recency modulation
    pub score: f64,
    /// Fused strategy score before modulation
    pub fused_score: f64,
    /// Normalized per-strategy contributions, by strategy name
    pub strategy_scores: BTreeMap<String, f64>,
}

/// Graph contribution statistics attached to graph-backed responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSearchStats {
    /// Nodes visited by the traversal
    pub graph_nodes: u64,
    /// Edges traversed
    pub graph_edges: u64,
    /// Vector-seeded entry points into the graph
    pub seed_count: u64,
    /// Depth actually used (post-clamp)
    pub depth: u8,
}

/// Request-level metadata on a response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchMetadata {
    /// Whether this response came from the context cache
    pub cache_hit: bool,
    /// Classified intent, when the analyzer ran
    pub intent: Option<super::analyzer::QueryIntent>,
    /// Weights the fusion step used
    pub weights: Option<StrategyWeights>,
    /// Non-fatal warnings (clamped depth, degraded strategies)
    pub warnings: Vec<String>,
}

/// Full retrieval response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Ranked results, best first
    pub results: Vec<RetrievedMemory>,
    /// Deterministic prompt-ready context block
    pub synthesized_context: String,
    /// Present when the graph strategy contributed
    pub graph_statistics: Option<GraphSearchStats>,
    /// Request-level metadata
    pub metadata: SearchMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_weights_normalize() {
        let w = StrategyWeights::new(2.0, 1.0, 1.0, 0.0);
        assert!((w.vector - 0.5).abs() < 1e-9);
        assert!((w.vector + w.semantic + w.graph + w.fulltext - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_weights_fall_back_to_default() {
        let w = StrategyWeights::new(0.0, 0.0, 0.0, 0.0);
        assert!((w.vector - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_profiles_sum_to_one() {
        for profile in [
            WeightProfile::Balanced,
            WeightProfile::Quality,
            WeightProfile::Speed,
            WeightProfile::Comprehensive,
            WeightProfile::Exploratory,
        ] {
            let w = profile.weights();
            assert!(
                (w.vector + w.semantic + w.graph + w.fulltext - 1.0).abs() < 1e-9,
                "profile {profile:?}"
            );
        }
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(
            WeightProfile::from_str("quality").unwrap(),
            WeightProfile::Quality
        );
        assert!(WeightProfile::from_str("turbo").is_err());
    }

    #[test]
    fn test_without_graph_renormalizes() {
        let w = WeightProfile::Comprehensive.weights().without_graph();
        assert!(w.graph.abs() < 1e-9);
        assert!(w.semantic.abs() < 1e-9);
        assert!((w.vector + w.fulltext - 1.0).abs() < 1e-9);
    }
}
