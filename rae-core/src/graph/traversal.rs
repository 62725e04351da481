//! Graph traversal: BFS, subgraphs, GraphRAG expansion, PageRank.

use crate::error::Result;
use crate::repository::{Direction, EdgeFilter, GraphRepository, NodeFilter};
use crate::types::{PROP_PAGERANK_SCORE, Scope, Subgraph};
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Upper bound on nodes visited by a single traversal.
const DEFAULT_MAX_NODES: usize = 500;

/// PageRank damping factor.
const PAGERANK_DAMPING: f64 = 0.85;

/// PageRank iteration count.
const PAGERANK_ITERATIONS: usize = 20;

/// Options for one BFS walk.
#[derive(Debug, Clone)]
pub struct TraversalOptions {
    /// Maximum hops from the seed set
    pub depth: u8,
    /// Edge direction to follow
    pub direction: Direction,
    /// Restrict to one relation label
    pub relation_filter: Option<String>,
    /// Upper bound on visited nodes
    pub max_nodes: usize,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            depth: 2,
            direction: Direction::Both,
            relation_filter: None,
            max_nodes: DEFAULT_MAX_NODES,
        }
    }
}

/// Result of a GraphRAG expansion from memory seeds.
#[derive(Debug, Clone, Default)]
pub struct GraphExpansion {
    /// The visited neighborhood
    pub subgraph: Subgraph,
    /// Number of seed nodes resolved from the input memories
    pub seed_count: usize,
    /// Memory IDs attached to visited nodes, with the hop distance at which
    /// their node was first reached
    pub memory_hits: Vec<(Uuid, u8)>,
}

/// BFS/DFS over the graph repository with depth and edge-type filters.
pub struct GraphTraversalService {
    graph: Arc<dyn GraphRepository>,
}

impl GraphTraversalService {
    /// Create a traversal service over a graph repository.
    #[must_use]
    pub fn new(graph: Arc<dyn GraphRepository>) -> Self {
        Self { graph }
    }

    /// Breadth-first walk from a set of internal node IDs.
    ///
    /// Nodes and edges are returned in visit order; each node and edge
    /// appears once.
    #[instrument(skip(self, seeds), fields(scope = %scope, seeds = seeds.len()))]
    pub async fn bfs(
        &self,
        scope: &Scope,
        seeds: &[Uuid],
        options: &TraversalOptions,
    ) -> Result<Subgraph> {
        let (subgraph, _) = self.bfs_with_hops(scope, seeds, options).await?;
        Ok(subgraph)
    }

    /// BFS that also reports the hop distance each node was first reached
    /// at. Seeds are hop 0.
    async fn bfs_with_hops(
        &self,
        scope: &Scope,
        seeds: &[Uuid],
        options: &TraversalOptions,
    ) -> Result<(Subgraph, HashMap<Uuid, u8>)> {
        let mut subgraph = Subgraph::default();
        let mut hops: HashMap<Uuid, u8> = HashMap::new();
        let mut seen_edges: HashSet<Uuid> = HashSet::new();
        let mut frontier: VecDeque<(Uuid, u8)> = VecDeque::new();

        for seed in seeds {
            if !hops.contains_key(seed) {
                if let Some(node) = self.graph.get_node_by_internal_id(scope, *seed).await? {
                    hops.insert(*seed, 0);
                    subgraph.nodes.push(node);
                    frontier.push_back((*seed, 0));
                }
            }
        }

        while let Some((node_id, hop)) = frontier.pop_front() {
            if hop >= options.depth || subgraph.nodes.len() >= options.max_nodes {
                continue;
            }
            let neighbors = self
                .graph
                .neighbors(
                    scope,
                    node_id,
                    options.direction,
                    options.relation_filter.as_deref(),
                    options.max_nodes,
                )
                .await?;
            for (edge, node) in neighbors {
                if seen_edges.insert(edge.id) {
                    subgraph.edges.push(edge);
                }
                if let std::collections::hash_map::Entry::Vacant(entry) = hops.entry(node.id) {
                    entry.insert(hop + 1);
                    frontier.push_back((node.id, hop + 1));
                    subgraph.nodes.push(node);
                    if subgraph.nodes.len() >= options.max_nodes {
                        break;
                    }
                }
            }
        }

        debug!(
            nodes = subgraph.nodes.len(),
            edges = subgraph.edges.len(),
            "traversal complete"
        );
        Ok((subgraph, hops))
    }

    /// List nodes matching a filter.
    pub async fn list_nodes(
        &self,
        scope: &Scope,
        filter: &NodeFilter,
    ) -> Result<Vec<crate::types::GraphNode>> {
        self.graph.list_nodes(scope, filter).await
    }

    /// Subgraph around a set of canonical node keys.
    pub async fn subgraph_by_node_ids(
        &self,
        scope: &Scope,
        node_ids: &[String],
        depth: u8,
    ) -> Result<Subgraph> {
        let mut seeds = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            if let Some(node) = self.graph.get_node_by_node_id(scope, node_id).await? {
                seeds.push(node.id);
            }
        }
        self.bfs(
            scope,
            &seeds,
            &TraversalOptions {
                depth,
                ..TraversalOptions::default()
            },
        )
        .await
    }

    /// GraphRAG expansion: map memory IDs to the graph entities extracted
    /// from them, walk the neighborhood, and collect the memory IDs
    /// attached to every visited node.
    #[instrument(skip(self, memory_ids), fields(scope = %scope, seeds = memory_ids.len()))]
    pub async fn expand_from_memories(
        &self,
        scope: &Scope,
        memory_ids: &[Uuid],
        depth: u8,
    ) -> Result<GraphExpansion> {
        let mut seed_ids = Vec::new();
        let mut seen = HashSet::new();
        for memory_id in memory_ids {
            for node in self.graph.nodes_referencing_memory(scope, *memory_id).await? {
                if seen.insert(node.id) {
                    seed_ids.push(node.id);
                }
            }
        }
        if seed_ids.is_empty() {
            return Ok(GraphExpansion::default());
        }

        let (subgraph, hops) = self
            .bfs_with_hops(
                scope,
                &seed_ids,
                &TraversalOptions {
                    depth,
                    ..TraversalOptions::default()
                },
            )
            .await?;

        let mut memory_hits = Vec::new();
        let mut hit_seen = HashSet::new();
        for node in &subgraph.nodes {
            let hop = hops.get(&node.id).copied().unwrap_or(depth);
            for id in node.source_memory_ids() {
                if hit_seen.insert(id) {
                    memory_hits.push((id, hop));
                }
            }
        }

        Ok(GraphExpansion {
            subgraph,
            seed_count: seed_ids.len(),
            memory_hits,
        })
    }

    /// Highest normalized PageRank among the entities extracted from a
    /// memory; `None` when the memory maps to no scored node.
    pub async fn max_centrality_for_memory(
        &self,
        scope: &Scope,
        memory_id: Uuid,
    ) -> Result<Option<f64>> {
        let nodes = self.graph.nodes_referencing_memory(scope, memory_id).await?;
        Ok(nodes
            .iter()
            .filter_map(crate::types::GraphNode::pagerank_score)
            .fold(None, |best, s| Some(best.map_or(s, |b: f64| b.max(s)))))
    }

    /// Recompute PageRank for every node in a scope and store the score in
    /// the `pagerank_score` property, normalized so the top node scores 1.
    ///
    /// Returns the number of nodes updated.
    #[instrument(skip(self), fields(scope = %scope))]
    pub async fn recompute_pagerank(&self, scope: &Scope) -> Result<usize> {
        let nodes = self
            .graph
            .list_nodes(scope, &NodeFilter::default())
            .await?;
        if nodes.is_empty() {
            return Ok(0);
        }
        let edges = self
            .graph
            .list_edges(scope, &EdgeFilter::default())
            .await?;

        let index: HashMap<Uuid, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id, i))
            .collect();
        let n = nodes.len();
        let mut out_degree = vec![0usize; n];
        let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); n];
        for edge in &edges {
            if let (Some(&src), Some(&dst)) = (
                index.get(&edge.source_node_id),
                index.get(&edge.target_node_id),
            ) {
                out_degree[src] += 1;
                incoming[dst].push(src);
            }
        }

        let mut rank = vec![1.0 / n as f64; n];
        for _ in 0..PAGERANK_ITERATIONS {
            let dangling: f64 = rank
                .iter()
                .zip(&out_degree)
                .filter(|&(_, &deg)| deg == 0)
                .map(|(r, _)| *r)
                .sum();
            let mut next = vec![(1.0 - PAGERANK_DAMPING) / n as f64; n];
            for (i, sources) in incoming.iter().enumerate() {
                let mut inflow = 0.0;
                for &src in sources {
                    inflow += rank[src] / out_degree[src] as f64;
                }
                next[i] += PAGERANK_DAMPING * (inflow + dangling / n as f64);
            }
            rank = next;
        }

        let max = rank.iter().copied().fold(f64::MIN, f64::max).max(f64::MIN_POSITIVE);
        for (node, score) in nodes.iter().zip(&rank) {
            self.graph
                .set_node_property(scope, node.id, PROP_PAGERANK_SCORE, json!(score / max))
                .await?;
        }
        Ok(n)
    }
}
