//! Knowledge-graph services.
//!
//! [`extraction`] turns batches of episodic memories into triples via the
//! LLM port and persists them through the graph repository. [`traversal`]
//! walks the stored graph: BFS neighborhoods, subgraph extraction, the
//! GraphRAG expansion used by hybrid search, and PageRank recomputation.

pub mod extraction;
pub mod traversal;

pub use extraction::{ExtractionOptions, ExtractionOutcome, GraphExtractionService};
pub use traversal::{GraphExpansion, GraphTraversalService, TraversalOptions};
