//! Graph repository trait.

use crate::error::Result;
use crate::types::{GraphEdge, GraphNode, GraphStats, Scope};
use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Edge traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Follow outgoing edges
    Out,
    /// Follow incoming edges
    In,
    /// Follow both directions
    Both,
}

/// Filter for node listings.
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    /// Substring match on the label (case-insensitive)
    pub label_contains: Option<String>,
    /// Minimum `pagerank_score` property
    pub min_pagerank: Option<f64>,
    /// Order by PageRank descending instead of creation time
    pub order_by_pagerank: bool,
    /// Maximum rows
    pub limit: usize,
}

/// Filter for edge listings.
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    /// Restrict to this relation label
    pub relation: Option<String>,
    /// Maximum rows
    pub limit: usize,
}

/// One node write inside a transactional extraction batch.
#[derive(Debug, Clone)]
pub struct NodeUpsert {
    /// Canonical node key
    pub node_id: String,
    /// Human-readable label
    pub label: String,
    /// Properties to merge
    pub properties: Map<String, Value>,
}

/// One edge write inside a transactional extraction batch.
///
/// Endpoints are referenced by canonical node key; the repository resolves
/// them to internal IDs inside the transaction.
#[derive(Debug, Clone)]
pub struct EdgeInsert {
    /// Canonical key of the source node
    pub source_node_id: String,
    /// Canonical key of the target node
    pub target_node_id: String,
    /// Relation label
    pub relation: String,
    /// Edge properties (`confidence`, `source_memory_id`)
    pub properties: Map<String, Value>,
}

/// Result of applying one extraction batch.
#[derive(Debug, Clone, Default)]
pub struct ExtractionApply {
    /// Nodes created (not counting merges into existing nodes)
    pub nodes_created: u64,
    /// Edges created on first insert
    pub edges_created: u64,
    /// Edges that hit the uniqueness constraint and bumped
    /// `observation_count` instead
    pub edges_observed: u64,
}

/// Nodes, edges, traversal primitives, and statistics.
///
/// Uniqueness invariants enforced here: `(tenant, project, node_id)` per
/// node, and `(tenant, project, source, target, relation)` per edge.
#[async_trait]
pub trait GraphRepository: Send + Sync {
    /// Insert a node or return the existing internal ID for its
    /// `node_id`. Properties are merged: scalars replaced, lists
    /// union-merged.
    async fn upsert_node(
        &self,
        scope: &Scope,
        node_id: &str,
        label: &str,
        properties: &Map<String, Value>,
    ) -> Result<Uuid>;

    /// Insert a directed edge.
    ///
    /// Returns `true` on first insert. On uniqueness conflict returns
    /// `false` and atomically increments `observation_count` on the
    /// existing edge. Concurrent inserts of the same tuple yield at most
    /// one edge.
    async fn insert_edge(
        &self,
        scope: &Scope,
        source_internal_id: Uuid,
        target_internal_id: Uuid,
        relation: &str,
        properties: &Map<String, Value>,
    ) -> Result<bool>;

    /// Fetch a node by canonical key.
    async fn get_node_by_node_id(&self, scope: &Scope, node_id: &str)
    -> Result<Option<GraphNode>>;

    /// Fetch a node by internal ID.
    async fn get_node_by_internal_id(&self, scope: &Scope, id: Uuid) -> Result<Option<GraphNode>>;

    /// List nodes matching a filter.
    async fn list_nodes(&self, scope: &Scope, filter: &NodeFilter) -> Result<Vec<GraphNode>>;

    /// List edges matching a filter.
    async fn list_edges(&self, scope: &Scope, filter: &EdgeFilter) -> Result<Vec<GraphEdge>>;

    /// Neighbors of a node with the connecting edges.
    ///
    /// Ordering is deterministic: `(target_label ASC, relation ASC,
    /// created_at ASC)`.
    async fn neighbors(
        &self,
        scope: &Scope,
        internal_id: Uuid,
        direction: Direction,
        relation_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(GraphEdge, GraphNode)>>;

    /// Nodes whose `source_memory_ids` property references `memory_id`.
    async fn nodes_referencing_memory(
        &self,
        scope: &Scope,
        memory_id: Uuid,
    ) -> Result<Vec<GraphNode>>;

    /// Replace one property on a node.
    async fn set_node_property(
        &self,
        scope: &Scope,
        internal_id: Uuid,
        key: &str,
        value: Value,
    ) -> Result<()>;

    /// Apply one extraction batch transactionally: upsert `nodes`, insert
    /// `edges` (resolving endpoints by canonical key), and mark
    /// `consolidate_memory_ids` as consolidated — all or nothing.
    async fn apply_extraction(
        &self,
        scope: &Scope,
        nodes: &[NodeUpsert],
        edges: &[EdgeInsert],
        consolidate_memory_ids: &[Uuid],
    ) -> Result<ExtractionApply>;

    /// Aggregate statistics for a scope.
    async fn stats(&self, scope: &Scope) -> Result<GraphStats>;

    /// Cheap connectivity check used by readiness probes.
    async fn probe(&self) -> Result<()>;
}
