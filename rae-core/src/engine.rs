//! Engine facade: wiring and lifecycle.
//!
//! [`MemoryEngine`] assembles the services over a set of ports and owns the
//! lifecycle contract: `start` probes every critical dependency before the
//! engine reports ready and then spawns the background sweepers; `stop`
//! drains the sweepers within a bounded period.

use crate::cache::ContextCache;
use crate::error::Result;
use crate::graph::{GraphExtractionService, GraphTraversalService};
use crate::orchestrator::{AgentOrchestrator, PricingTable};
use crate::ports::{EmbeddingProvider, LlmProvider, Reranker, VectorIndex};
use crate::reflection::ReflectionPipeline;
use crate::repository::{BudgetRepository, CostRepository, GraphRepository, MemoryRepository};
use crate::search::{HybridSearchService, QueryAnalyzer, SearchResponse};
use crate::scoring::QueryHistory;
use crate::store::MemoryStore;
use crate::sweeper::{BackgroundSweepers, SweeperDeps};
use crate::telemetry::Telemetry;
use crate::types::EngineConfig;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Every external dependency the engine consumes.
#[derive(Clone)]
pub struct EnginePorts {
    /// Memory rows
    pub memories: Arc<dyn MemoryRepository>,
    /// Graph rows
    pub graph: Arc<dyn GraphRepository>,
    /// Cost ledger
    pub costs: Arc<dyn CostRepository>,
    /// Budget rows
    pub budgets: Arc<dyn BudgetRepository>,
    /// Vector index
    pub vectors: Arc<dyn VectorIndex>,
    /// Embedding provider
    pub embedder: Arc<dyn EmbeddingProvider>,
    /// LLM provider
    pub llm: Arc<dyn LlmProvider>,
    /// Optional cross-encoder reranker
    pub reranker: Option<Arc<dyn Reranker>>,
}

/// The assembled memory engine.
pub struct MemoryEngine {
    store: Arc<MemoryStore>,
    search: Arc<HybridSearchService>,
    extraction: Arc<GraphExtractionService>,
    traversal: Arc<GraphTraversalService>,
    reflection: Arc<ReflectionPipeline>,
    orchestrator: Arc<AgentOrchestrator>,
    cache: Arc<ContextCache<SearchResponse>>,
    telemetry: Telemetry,
    ports: EnginePorts,
    config: EngineConfig,
    sweepers: Mutex<Option<BackgroundSweepers>>,
}

impl MemoryEngine {
    /// Wire every service over the given ports.
    #[must_use]
    pub fn new(ports: EnginePorts, config: EngineConfig) -> Self {
        let telemetry = Telemetry::new();
        let cache = Arc::new(ContextCache::new(config.cache.clone()));
        let query_history = Arc::new(QueryHistory::new(config.scoring.query_history_size));
        let traversal = Arc::new(GraphTraversalService::new(Arc::clone(&ports.graph)));

        let analyzer = if config.search.llm_query_analysis {
            QueryAnalyzer::with_llm(Arc::clone(&ports.llm))
        } else {
            QueryAnalyzer::rule_based()
        };

        let search = Arc::new(HybridSearchService::new(
            Arc::clone(&ports.memories),
            Arc::clone(&ports.vectors),
            Arc::clone(&ports.embedder),
            ports.reranker.clone(),
            Arc::clone(&traversal),
            analyzer,
            Arc::clone(&cache),
            query_history,
            telemetry.clone(),
            config.search.clone(),
        ));

        let store = Arc::new(MemoryStore::new(
            Arc::clone(&ports.memories),
            Arc::clone(&ports.vectors),
            Arc::clone(&ports.embedder),
        ));

        let extraction = Arc::new(GraphExtractionService::new(
            Arc::clone(&ports.memories),
            Arc::clone(&ports.graph),
            Arc::clone(&ports.llm),
            Arc::clone(&cache),
            telemetry.clone(),
            config.extraction.clone(),
        ));

        let reflection = Arc::new(ReflectionPipeline::new(
            Arc::clone(&ports.memories),
            Arc::clone(&ports.vectors),
            Some(Arc::clone(&ports.embedder)),
            Arc::clone(&ports.llm),
            Arc::clone(&cache),
            telemetry.clone(),
            config.reflection.clone(),
        ));

        let orchestrator = Arc::new(AgentOrchestrator::new(
            Arc::clone(&search),
            Arc::clone(&store),
            Arc::clone(&ports.memories),
            Arc::clone(&ports.costs),
            Arc::clone(&ports.budgets),
            Arc::clone(&ports.llm),
            PricingTable::builtin(),
            telemetry.clone(),
            config.orchestrator.clone(),
        ));

        Self {
            store,
            search,
            extraction,
            traversal,
            reflection,
            orchestrator,
            cache,
            telemetry,
            ports,
            config,
            sweepers: Mutex::new(None),
        }
    }

    /// Probe every critical dependency and spawn the background sweepers.
    ///
    /// The engine is ready only after this returns `Ok`. Calling `start`
    /// on a started engine is a no-op.
    pub async fn start(&self) -> Result<()> {
        self.probe().await?;
        let mut sweepers = self.sweepers.lock().await;
        if sweepers.is_none() {
            *sweepers = Some(BackgroundSweepers::start(
                SweeperDeps {
                    memories: Arc::clone(&self.ports.memories),
                    traversal: Arc::clone(&self.traversal),
                    cache: Arc::clone(&self.cache),
                    reflection: Arc::clone(&self.reflection),
                    scoring: self.config.scoring.clone(),
                    telemetry: self.telemetry.clone(),
                },
                &self.config.sweepers,
            ));
            info!("memory engine started");
        }
        Ok(())
    }

    /// Probe the relational store, cost ledger, graph store, and vector
    /// index.
    pub async fn probe(&self) -> Result<()> {
        self.ports.memories.probe().await?;
        self.ports.graph.probe().await?;
        self.ports.costs.probe().await?;
        self.ports.vectors.probe().await?;
        Ok(())
    }

    /// Drain and stop the background sweepers.
    pub async fn stop(&self) {
        if let Some(sweepers) = self.sweepers.lock().await.take() {
            sweepers.stop().await;
            info!("memory engine stopped");
        }
    }

    /// Memory storefront.
    #[must_use]
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Hybrid retrieval service.
    #[must_use]
    pub fn search(&self) -> &Arc<HybridSearchService> {
        &self.search
    }

    /// Graph extraction service.
    #[must_use]
    pub fn extraction(&self) -> &Arc<GraphExtractionService> {
        &self.extraction
    }

    /// Graph traversal service.
    #[must_use]
    pub fn traversal(&self) -> &Arc<GraphTraversalService> {
        &self.traversal
    }

    /// Reflection pipeline.
    #[must_use]
    pub fn reflection(&self) -> &Arc<ReflectionPipeline> {
        &self.reflection
    }

    /// Agent-task orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> &Arc<AgentOrchestrator> {
        &self.orchestrator
    }

    /// Context cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ContextCache<SearchResponse>> {
        &self.cache
    }

    /// Metric registry.
    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }
}
