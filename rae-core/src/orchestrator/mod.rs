//! Agent-task orchestration.
//!
//! The one externally visible operation that ties the engine together:
//! budget precheck, hybrid retrieval, reflection injection, the LLM call
//! with token/cost accounting, and a best-effort episodic record of the
//! exchange.

pub mod pricing;

pub use pricing::{ModelPrice, PricingTable};

use crate::error::{Error, Result};
use crate::ports::{CompletionRequest, LlmProvider, estimate_tokens};
use crate::repository::{BudgetRepository, CostRepository, MemoryQuery, MemoryRepository};
use crate::search::{HybridSearchService, SearchOptions, WeightProfile};
use crate::store::MemoryStore;
use crate::telemetry::Telemetry;
use crate::types::{CostLog, MemoryDraft, MemoryLayer, OrchestratorConfig, Scope, SearchFilters};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Options for one agent task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOptions {
    /// Memories to retrieve; engine default when `None`
    pub k: Option<usize>,
    /// Enable graph retrieval
    pub use_graph: bool,
    /// Graph depth; clamped downstream
    pub graph_depth: Option<u8>,
    /// Preset weight profile
    pub weight_profile: Option<WeightProfile>,
    /// Rerank retrieval candidates
    pub rerank: bool,
    /// Model for the answer; provider default when `None`
    pub model: Option<String>,
    /// Completion token cap
    pub max_tokens: u32,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            k: None,
            use_graph: false,
            graph_depth: None,
            weight_profile: None,
            rerank: false,
            model: None,
            max_tokens: 1_024,
        }
    }
}

/// Cost breakdown returned with each task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskCost {
    /// Prompt-side tokens
    pub input_tokens: u64,
    /// Completion-side tokens
    pub output_tokens: u64,
    /// Booked spend; never zero for a real LLM call
    pub total_estimate: f64,
}

/// Result of one orchestrated task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    /// The model's answer
    pub answer: String,
    /// IDs of the memories that backed the answer
    pub used_memories: Vec<Uuid>,
    /// Cost breakdown
    pub cost: TaskCost,
}

/// Single entry point combining retrieval, budget governance, and the LLM
/// call.
pub struct AgentOrchestrator {
    search: Arc<HybridSearchService>,
    store: Arc<MemoryStore>,
    memories: Arc<dyn MemoryRepository>,
    costs: Arc<dyn CostRepository>,
    budgets: Arc<dyn BudgetRepository>,
    llm: Arc<dyn LlmProvider>,
    pricing: PricingTable,
    tenant_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    telemetry: Telemetry,
    config: OrchestratorConfig,
}

impl AgentOrchestrator {
    /// Wire an orchestrator.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        search: Arc<HybridSearchService>,
        store: Arc<MemoryStore>,
        memories: Arc<dyn MemoryRepository>,
        costs: Arc<dyn CostRepository>,
        budgets: Arc<dyn BudgetRepository>,
        llm: Arc<dyn LlmProvider>,
        pricing: PricingTable,
        telemetry: Telemetry,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            search,
            store,
            memories,
            costs,
            budgets,
            llm,
            pricing,
            tenant_locks: Mutex::new(HashMap::new()),
            telemetry,
            config,
        }
    }

    /// Execute one agent task.
    #[instrument(skip(self, prompt, options), fields(scope = %scope))]
    pub async fn execute_task(
        &self,
        scope: &Scope,
        prompt: &str,
        options: &TaskOptions,
    ) -> Result<TaskExecution> {
        scope.validate()?;
        if prompt.trim().is_empty() {
            return Err(Error::validation("prompt", "must not be empty"));
        }

        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.llm.default_model().to_string());

        // 1. Budget precheck, before any provider call. The prospective
        // spend assumes the full completion cap is used.
        let prospective = self.pricing.cost_usd(
            &model,
            estimate_tokens(prompt),
            u64::from(options.max_tokens),
        );
        self.check_budget(&scope.tenant_id, prospective).await?;

        // 2. Retrieval. Failure aborts; no LLM call is made.
        let k = options.k.unwrap_or(self.config.default_k);
        let search_options = SearchOptions {
            k,
            filters: SearchFilters::default(),
            profile: options.weight_profile,
            use_graph: options.use_graph,
            graph_depth: options.graph_depth,
            rerank: options.rerank,
            nocache: false,
        };
        let retrieval = self.search.search(scope, prompt, &search_options).await?;
        let used_memories: Vec<Uuid> =
            retrieval.results.iter().map(|r| r.memory.id).collect();

        // Embedding spend is booked for the retrieval regardless of how the
        // rest of the task goes; cache hits book a zero-cost marker row.
        if retrieval.metadata.cache_hit {
            self.record_cost(scope, "none", "cache_hit", 0, 0, 0.0).await;
        } else {
            let embed_tokens = estimate_tokens(prompt);
            let embed_cost = self.pricing.cost_usd("embedding", embed_tokens, 0);
            self.record_cost(scope, "embedding", "embedding", embed_tokens, 0, embed_cost)
                .await;
        }

        // 3. Reflection injection, bounded by the token budget.
        let system = self.reflection_preamble(scope).await;

        // 4. The LLM call.
        let full_prompt = if retrieval.synthesized_context.is_empty() {
            prompt.to_string()
        } else {
            format!("{}\n\n{prompt}", retrieval.synthesized_context)
        };
        let mut request = CompletionRequest::new(&model, full_prompt)
            .with_max_tokens(options.max_tokens);
        if let Some(system) = system {
            request = request.with_system(system);
        }
        let completion = match timeout(self.config.llm_timeout, self.llm.complete(&request)).await
        {
            Ok(Ok(completion)) => completion,
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(Error::Timeout("llm completion".to_string())),
        };

        // 5. Cost accounting: computed here even when the provider reports
        // zero, and written atomically with the budget counters.
        let total_cost =
            self.pricing
                .cost_usd(&model, completion.input_tokens, completion.output_tokens);
        self.record_cost(
            scope,
            &model,
            "completion",
            completion.input_tokens,
            completion.output_tokens,
            total_cost,
        )
        .await;
        self.telemetry.counter("agent_tasks_completed").increment();

        // 6. Post-hoc episodic record; failure is logged, never fatal.
        if self.config.post_hoc_memory {
            self.record_exchange(scope, prompt, &completion.text, &used_memories, total_cost)
                .await;
        }

        info!(
            memories = used_memories.len(),
            cost_usd = total_cost,
            "agent task complete"
        );
        Ok(TaskExecution {
            answer: completion.text,
            used_memories,
            cost: TaskCost {
                input_tokens: completion.input_tokens,
                output_tokens: completion.output_tokens,
                total_estimate: total_cost,
            },
        })
    }

    /// Per-tenant budget gate.
    async fn check_budget(&self, tenant_id: &str, prospective_usd: f64) -> Result<()> {
        let lock = self.tenant_lock(tenant_id);
        let _guard = lock.lock().await;

        let budget = self
            .budgets
            .roll_over(tenant_id, Utc::now())
            .await
            .map_err(|e| e.into_service_error("relational-store"))?;
        if let Some(budget) = budget {
            if let Some((window, usage, limit)) = budget.would_exceed(prospective_usd) {
                self.telemetry.counter("budget_rejections").increment();
                return Err(Error::BudgetExceeded {
                    usage_usd: usage,
                    limit_usd: limit,
                    window: window.to_string(),
                });
            }
        }
        Ok(())
    }

    fn tenant_lock(&self, tenant_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.tenant_locks.lock();
        Arc::clone(
            locks
                .entry(tenant_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Write a cost log under the tenant lock. Logging failures degrade to
    /// a warning; the task itself is unaffected.
    async fn record_cost(
        &self,
        scope: &Scope,
        model: &str,
        operation: &str,
        input_tokens: u64,
        output_tokens: u64,
        total_cost_usd: f64,
    ) {
        let log = CostLog {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id.clone(),
            project_id: scope.project_id.clone(),
            model: model.to_string(),
            operation: operation.to_string(),
            input_tokens,
            output_tokens,
            total_cost_usd,
            timestamp: Utc::now(),
        };
        let lock = self.tenant_lock(&scope.tenant_id);
        let _guard = lock.lock().await;
        if let Err(err) = self.costs.record(&log).await {
            warn!(error = %err, operation, "cost log write failed");
            self.telemetry.counter("cost_log_failures").increment();
        }
    }

    /// Recent reflective memories concatenated under the token budget.
    async fn reflection_preamble(&self, scope: &Scope) -> Option<String> {
        let reflections = match self
            .memories
            .list_by_layer(
                scope,
                MemoryLayer::Reflective,
                &MemoryQuery::with_limit(self.config.reflection_candidates),
            )
            .await
        {
            Ok(reflections) => reflections,
            Err(err) => {
                warn!(error = %err, "reflection injection skipped");
                return None;
            }
        };
        if reflections.is_empty() {
            return None;
        }

        let mut preamble = String::from("Relevant insights from prior work:\n");
        let mut budget = self.config.reflection_token_budget;
        let mut any = false;
        for reflection in reflections {
            let tokens = estimate_tokens(&reflection.content);
            if tokens > budget {
                break;
            }
            budget -= tokens;
            preamble.push_str(&format!("- {}\n", reflection.content));
            any = true;
        }
        any.then_some(preamble)
    }

    /// Store an episodic record of the exchange for later reflection.
    async fn record_exchange(
        &self,
        scope: &Scope,
        prompt: &str,
        answer: &str,
        used_memories: &[Uuid],
        cost_usd: f64,
    ) {
        let content = format!(
            "Task: {prompt}\nAnswer: {answer}\nMemories used: {}\nCost: {cost_usd:.6} USD",
            used_memories
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        let draft = MemoryDraft::episodic(scope.clone(), content)
            .with_source("agent_exchange")
            .with_tags(vec!["agent_task".to_string()]);
        if let Err(err) = self.store.store(draft).await {
            warn!(error = %err, "post-hoc exchange record failed");
            self.telemetry.counter("post_hoc_record_failures").increment();
        } else {
            debug!("post-hoc exchange recorded");
        }
    }
}
