//! Knowledge-graph entities: nodes, edges, triples, and statistics.

use super::memory::Scope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Property key on nodes holding the memory IDs an entity was extracted from.
pub const PROP_SOURCE_MEMORY_IDS: &str = "source_memory_ids";

/// Property key on nodes holding the latest PageRank score.
pub const PROP_PAGERANK_SCORE: &str = "pagerank_score";

/// Property key on edges counting repeat observations of the same relation.
pub const PROP_OBSERVATION_COUNT: &str = "observation_count";

/// Property key on edges holding the extraction confidence.
pub const PROP_CONFIDENCE: &str = "confidence";

/// Property key on edges holding the memory the relation was extracted from.
pub const PROP_SOURCE_MEMORY_ID: &str = "source_memory_id";

/// A distinct entity (concept, person, component) extracted from memory
/// content.
///
/// `node_id` is the canonical normalized entity name and is unique within a
/// `(tenant, project)` scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Internal node identifier
    pub id: Uuid,
    /// Tenant/project scoping
    pub scope: Scope,
    /// Canonical string key (normalized entity name)
    pub node_id: String,
    /// Human-readable label
    pub label: String,
    /// Arbitrary key/value map (`type`, `pagerank_score`,
    /// `source_memory_ids`, ...)
    pub properties: Map<String, Value>,
    /// Creation time (UTC)
    pub created_at: DateTime<Utc>,
}

impl GraphNode {
    /// Memory IDs recorded in this node's `source_memory_ids` property.
    #[must_use]
    pub fn source_memory_ids(&self) -> Vec<Uuid> {
        self.properties
            .get(PROP_SOURCE_MEMORY_IDS)
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|s| Uuid::parse_str(s).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Latest PageRank score, when one has been computed.
    #[must_use]
    pub fn pagerank_score(&self) -> Option<f64> {
        self.properties.get(PROP_PAGERANK_SCORE).and_then(Value::as_f64)
    }
}

/// A directed relation between two nodes in the same scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Internal edge identifier
    pub id: Uuid,
    /// Tenant/project scoping
    pub scope: Scope,
    /// Internal ID of the source node
    pub source_node_id: Uuid,
    /// Internal ID of the target node
    pub target_node_id: Uuid,
    /// Relation label (free-form lowercased string)
    pub relation: String,
    /// Properties, including `confidence` and optionally `source_memory_id`
    pub properties: Map<String, Value>,
    /// Creation time (UTC)
    pub created_at: DateTime<Utc>,
}

impl GraphEdge {
    /// Extraction confidence, defaulting to 1.0 when unset.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.properties
            .get(PROP_CONFIDENCE)
            .and_then(Value::as_f64)
            .unwrap_or(1.0)
    }

    /// Number of times this relation has been observed.
    #[must_use]
    pub fn observation_count(&self) -> u64 {
        self.properties
            .get(PROP_OBSERVATION_COUNT)
            .and_then(Value::as_u64)
            .unwrap_or(1)
    }
}

/// A `(subject, predicate, object)` relation extracted from memory content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    /// Subject entity (as emitted by extraction, pre-normalization)
    pub subject: String,
    /// Relation label
    pub predicate: String,
    /// Object entity
    pub object: String,
    /// Extraction confidence in [0, 1]
    pub confidence: f64,
}

/// Aggregate statistics over a scope's graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    /// Total nodes in the scope
    pub node_count: u64,
    /// Total edges in the scope
    pub edge_count: u64,
    /// Edge count per relation label
    pub relation_counts: BTreeMap<String, u64>,
    /// Mean degree (out + in) per node
    pub avg_degree: f64,
}

impl GraphStats {
    /// Number of distinct relation labels.
    #[must_use]
    pub fn unique_relations(&self) -> usize {
        self.relation_counts.len()
    }
}

/// A connected fragment of the graph returned by traversal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subgraph {
    /// Nodes visited, in visit order
    pub nodes: Vec<GraphNode>,
    /// Edges traversed, in visit order
    pub edges: Vec<GraphEdge>,
}

impl Subgraph {
    /// Whether the traversal visited anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All memory IDs referenced by visited nodes, deduplicated, in visit
    /// order.
    #[must_use]
    pub fn memory_ids(&self) -> Vec<Uuid> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for node in &self.nodes {
            for id in node.source_memory_ids() {
                if seen.insert(id) {
                    out.push(id);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node_with_props(props: Map<String, Value>) -> GraphNode {
        GraphNode {
            id: Uuid::new_v4(),
            scope: Scope::new("t1", "p1"),
            node_id: "authservice".to_string(),
            label: "AuthService".to_string(),
            properties: props,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_source_memory_ids_parses_valid_uuids() {
        let id = Uuid::new_v4();
        let mut props = Map::new();
        props.insert(
            PROP_SOURCE_MEMORY_IDS.to_string(),
            json!([id.to_string(), "not-a-uuid"]),
        );
        let node = node_with_props(props);
        assert_eq!(node.source_memory_ids(), vec![id]);
    }

    #[test]
    fn test_pagerank_absent_by_default() {
        let node = node_with_props(Map::new());
        assert!(node.pagerank_score().is_none());
    }

    #[test]
    fn test_edge_defaults() {
        let edge = GraphEdge {
            id: Uuid::new_v4(),
            scope: Scope::new("t1", "p1"),
            source_node_id: Uuid::new_v4(),
            target_node_id: Uuid::new_v4(),
            relation: "depends_on".to_string(),
            properties: Map::new(),
            created_at: Utc::now(),
        };
        assert!((edge.confidence() - 1.0).abs() < f64::EPSILON);
        assert_eq!(edge.observation_count(), 1);
    }

    #[test]
    fn test_subgraph_memory_ids_deduplicate() {
        let shared = Uuid::new_v4();
        let mut props = Map::new();
        props.insert(
            PROP_SOURCE_MEMORY_IDS.to_string(),
            json!([shared.to_string()]),
        );
        let subgraph = Subgraph {
            nodes: vec![node_with_props(props.clone()), node_with_props(props)],
            edges: Vec::new(),
        };
        assert_eq!(subgraph.memory_ids(), vec![shared]);
    }
}
