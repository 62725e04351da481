//! Core domain types for the memory engine.
//!
//! Everything persisted or passed across a service boundary lives here:
//! memories and their layers, graph nodes/edges and extracted triples, cost
//! logs and budgets, and the configuration structs that carry the engine's
//! tunable defaults.

mod config;
mod cost;
mod filters;
mod graph;
mod memory;

pub use config::{
    CacheConfig, EngineConfig, ExtractionConfig, OrchestratorConfig, ReflectionConfig,
    ScoringConfig, SearchConfig, SweeperConfig,
};
pub use cost::{Budget, BudgetWindow, CostLog, UsageTotals};
pub use filters::SearchFilters;
pub use graph::{
    GraphEdge, GraphNode, GraphStats, PROP_CONFIDENCE, PROP_OBSERVATION_COUNT,
    PROP_PAGERANK_SCORE, PROP_SOURCE_MEMORY_ID, PROP_SOURCE_MEMORY_IDS, Subgraph, Triple,
};
pub use memory::{ConsolidationStatus, Memory, MemoryDraft, MemoryLayer, Scope};
