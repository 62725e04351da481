//! Hybrid retrieval.
//!
//! [`analyzer`] classifies queries into strategy weights, [`fusion`] merges
//! per-strategy candidates into one deterministic ranking, and [`hybrid`]
//! runs the full cache-wrapped pipeline.

pub mod analyzer;
pub mod fusion;
pub mod hybrid;
pub mod types;

pub use analyzer::{QueryAnalysis, QueryAnalyzer, QueryIntent};
pub use hybrid::HybridSearchService;
pub use types::{
    GraphSearchStats, RetrievedMemory, SearchMetadata, SearchOptions, SearchResponse, Strategy,
    StrategyWeights, WeightProfile,
};
