#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::module_name_repetitions)]

//! # RAE Core
//!
//! Multi-tenant agentic memory engine: layered memory storage, hybrid
//! GraphRAG retrieval, knowledge-graph extraction, reflection, and
//! cost-governed agent-task orchestration.
//!
//! ## Core Concepts
//!
//! - **Memories**: tenant/project-scoped records in three layers (episodic,
//!   semantic, reflective) with importance and access statistics
//! - **Hybrid search**: vector, full-text, semantic-node, and
//!   graph-traversal strategies fused into one deterministic ranking
//! - **Knowledge graph**: entities and relations extracted from episodic
//!   memories, traversed at query time (GraphRAG)
//! - **Reflection**: clusters of episodes distilled into reflective
//!   memories and meta-insights
//! - **Governance**: per-tenant budgets, a cost ledger, and importance
//!   decay with archival
//!
//! ## Module Organization
//!
//! ### Primary APIs
//! - [`engine`]: wiring facade with start/stop lifecycle
//! - [`store`]: validated memory writes with embedding upkeep
//! - [`search`]: the hybrid retrieval pipeline
//! - [`graph`]: extraction and traversal services
//! - [`reflection`]: the reflection pipeline and hierarchical summarizer
//! - [`orchestrator`]: the `execute_task` path with cost accounting
//!
//! ### Support Modules
//! - [`types`]: domain types and configuration
//! - [`repository`]: storage abstractions (no SQL above this line)
//! - [`ports`]: provider and vector-index contracts
//! - [`cache`]: fingerprint-keyed context cache
//! - [`scoring`]: importance computation and decay
//! - [`sweeper`]: background maintenance tasks
//! - [`telemetry`]: in-process metrics
//!
//! ## Quick Start
//!
//! ```no_run
//! use rae_core::engine::{EnginePorts, MemoryEngine};
//! use rae_core::types::{EngineConfig, MemoryDraft, Scope};
//! use rae_core::search::SearchOptions;
//!
//! # async fn example(ports: EnginePorts) -> rae_core::Result<()> {
//! let engine = MemoryEngine::new(ports, EngineConfig::default());
//! engine.start().await?;
//!
//! let scope = Scope::new("tenant-1", "project-1");
//! let draft = MemoryDraft::episodic(scope.clone(), "User prefers dark mode")
//!     .with_source("user_preference")
//!     .with_importance(0.8);
//! let id = engine.store().store(draft).await?;
//!
//! let response = engine
//!     .search()
//!     .search(&scope, "dark mode preference", &SearchOptions::with_k(5))
//!     .await?;
//! assert!(response.results.iter().any(|r| r.memory.id == id));
//!
//! engine.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod engine;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod ports;
pub mod reflection;
pub mod repository;
pub mod scoring;
pub mod search;
pub mod store;
pub mod sweeper;
pub mod telemetry;
pub mod types;

pub use engine::{EnginePorts, MemoryEngine};
pub use error::{Error, Result};
pub use store::MemoryStore;
