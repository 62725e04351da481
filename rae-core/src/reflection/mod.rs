//! Reflection pipeline.
//!
//! Periodically distills clusters of episodic memories into reflective
//! memories, optionally aggregates a run's reflections into a meta-insight,
//! and offers a hierarchical map-reduce summarizer for large retrospectives.

pub mod clustering;
mod hierarchical;

pub use hierarchical::{HierarchicalStats, HierarchicalSummary};

use crate::cache::ContextCache;
use crate::error::Result;
use crate::ports::{
    CompletionRequest, EmbeddingProvider, LlmProvider, VectorIndex, VectorPayload,
};
use crate::repository::MemoryRepository;
use crate::search::SearchResponse;
use crate::telemetry::Telemetry;
use crate::types::{
    ConsolidationStatus, Memory, MemoryDraft, MemoryLayer, ReflectionConfig, Scope,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Kind of insight a reflection captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReflectionType {
    /// A non-obvious takeaway
    Insight,
    /// A recurring behavior across episodes
    Pattern,
    /// A plain condensation of the episodes
    Summary,
}

#[derive(Debug, Deserialize)]
struct LlmReflection {
    summary: String,
    #[serde(default)]
    key_insights: Vec<String>,
    #[serde(default)]
    reflection_type: Option<ReflectionType>,
}

/// Counters for one pipeline run over one scope.
#[derive(Debug, Clone, Default)]
pub struct ReflectionOutcome {
    /// Episodes fetched for clustering
    pub episodes_scanned: usize,
    /// Clusters meeting the minimum size
    pub clusters_eligible: usize,
    /// Reflective memories written
    pub reflections_created: usize,
    /// Meta-insights written
    pub meta_insights_created: usize,
}

/// Clusters recent episodes and writes reflective memories.
pub struct ReflectionPipeline {
    memories: Arc<dyn MemoryRepository>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    llm: Arc<dyn LlmProvider>,
    cache: Arc<ContextCache<SearchResponse>>,
    telemetry: Telemetry,
    pub(crate) config: ReflectionConfig,
}

impl ReflectionPipeline {
    /// Wire a pipeline. Passing no embedder selects the time-window
    /// clustering fallback.
    #[must_use]
    pub fn new(
        memories: Arc<dyn MemoryRepository>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        llm: Arc<dyn LlmProvider>,
        cache: Arc<ContextCache<SearchResponse>>,
        telemetry: Telemetry,
        config: ReflectionConfig,
    ) -> Self {
        Self {
            memories,
            vectors,
            embedder,
            llm,
            cache,
            telemetry,
            config,
        }
    }

    pub(crate) fn memories(&self) -> &Arc<dyn MemoryRepository> {
        &self.memories
    }

    pub(crate) fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    /// Run the pipeline for every scope with stored memories.
    pub async fn run(&self) -> Result<ReflectionOutcome> {
        let scopes = self
            .memories
            .list_scopes()
            .await
            .map_err(|e| e.into_service_error("relational-store"))?;
        let mut total = ReflectionOutcome::default();
        for scope in scopes {
            let outcome = self.run_for_scope(&scope).await?;
            total.episodes_scanned += outcome.episodes_scanned;
            total.clusters_eligible += outcome.clusters_eligible;
            total.reflections_created += outcome.reflections_created;
            total.meta_insights_created += outcome.meta_insights_created;
        }
        Ok(total)
    }

    /// Run the pipeline for one scope.
    #[instrument(skip(self), fields(scope = %scope))]
    pub async fn run_for_scope(&self, scope: &Scope) -> Result<ReflectionOutcome> {
        let episodes = self
            .memories
            .find_unconsolidated_episodes(scope, None, self.config.max_memories)
            .await
            .map_err(|e| e.into_service_error("relational-store"))?;
        let mut outcome = ReflectionOutcome {
            episodes_scanned: episodes.len(),
            ..ReflectionOutcome::default()
        };
        if episodes.len() < self.config.min_episodes {
            return Ok(outcome);
        }

        let clusters = self.cluster(&episodes).await;
        let mut created_reflection_ids = Vec::new();
        for cluster in clusters {
            if cluster.len() < self.config.min_cluster_size {
                continue;
            }
            outcome.clusters_eligible += 1;
            let members: Vec<&Memory> = cluster.iter().map(|&i| &episodes[i]).collect();
            match self.reflect_on_cluster(scope, &members).await {
                Ok(id) => {
                    created_reflection_ids.push(id);
                    outcome.reflections_created += 1;
                }
                Err(err) => {
                    warn!(error = %err, "reflection cluster skipped");
                    self.telemetry.counter("reflection_cluster_failures").increment();
                }
            }
        }

        if created_reflection_ids.len() >= self.config.min_reflections_for_meta {
            match self.meta_insight(scope, &created_reflection_ids).await {
                Ok(()) => outcome.meta_insights_created += 1,
                Err(err) => {
                    warn!(error = %err, "meta-insight skipped");
                }
            }
        }

        if outcome.reflections_created > 0 {
            self.cache.invalidate(&scope.tenant_id, Some(&scope.project_id));
        }
        info!(
            reflections = outcome.reflections_created,
            meta_insights = outcome.meta_insights_created,
            "reflection run complete"
        );
        Ok(outcome)
    }

    /// Cluster episodes: embeddings when available, time windows otherwise.
    async fn cluster(&self, episodes: &[Memory]) -> Vec<clustering::Cluster> {
        if let Some(embedder) = &self.embedder {
            match clustering::cluster_by_embedding(
                embedder.as_ref(),
                episodes,
                self.config.cluster_similarity_threshold,
            )
            .await
            {
                Ok(clusters) => return clusters,
                Err(err) => {
                    warn!(error = %err, "embedding clustering degraded to time windows");
                }
            }
        }
        clustering::cluster_by_time_window(episodes, self.config.fallback_window)
    }

    /// Summarize one cluster into a reflective memory.
    ///
    /// The reflective row and its parents' consolidation marking commit in
    /// one transaction; the vector commit follows.
    async fn reflect_on_cluster(&self, scope: &Scope, members: &[&Memory]) -> Result<Uuid> {
        let reflection = self.summarize_cluster(members).await?;
        let parent_ids: Vec<Uuid> = members.iter().map(|m| m.id).collect();

        let mut content = reflection.summary;
        if !reflection.key_insights.is_empty() {
            content.push_str("\nKey insights:\n");
            for insight in &reflection.key_insights {
                content.push_str(&format!("- {insight}\n"));
            }
        }

        let mut draft = MemoryDraft::episodic(scope.clone(), content)
            .with_source("reflection")
            .with_importance(self.config.reflection_importance);
        draft.layer = MemoryLayer::Reflective;
        draft.parent_ids = parent_ids;
        if let Some(kind) = reflection.reflection_type {
            draft.tags = vec![format!("reflection:{}", json!(kind).as_str().unwrap_or("summary"))];
        }
        draft.validate()?;

        let mut memory = draft.into_memory(Utc::now());
        memory.consolidation_status = ConsolidationStatus::Consolidated;
        memory.embedding_ref = Some(memory.id.to_string());

        let id = self
            .memories
            .store_reflection(&memory)
            .await
            .map_err(|e| e.into_service_error("relational-store"))?;

        if let Some(embedder) = &self.embedder {
            let embedding = embedder
                .embed_text(&memory.content)
                .await
                .map_err(|e| e.into_service_error("embedding-provider"))?;
            self.vectors
                .upsert(
                    scope,
                    id,
                    &embedding,
                    &VectorPayload {
                        layer: MemoryLayer::Reflective,
                        tags: memory.tags.clone(),
                        created_at: memory.created_at,
                    },
                )
                .await
                .map_err(|e| e.into_service_error("vector-index"))?;
        }

        debug!(%id, parents = memory.parent_ids.len(), "reflection stored");
        Ok(id)
    }

    async fn summarize_cluster(&self, members: &[&Memory]) -> Result<LlmReflection> {
        let mut prompt = String::from(
            "Reflect on the following related agent memories. Produce a concise \
             summary, the key insights worth keeping, and classify the \
             reflection as insight, pattern, or summary.\n\n",
        );
        for member in members {
            prompt.push_str(&format!("- {}\n", member.content));
        }

        let schema = json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string"},
                "key_insights": {"type": "array", "items": {"type": "string"}},
                "reflection_type": {
                    "type": "string",
                    "enum": ["insight", "pattern", "summary"]
                }
            },
            "required": ["summary"]
        });
        let request = CompletionRequest::new(&self.config.model, prompt)
            .with_system("You distill agent experience into durable insights.")
            .with_max_tokens(self.config.max_tokens)
            .with_json_schema(schema);
        let completion = self.llm.complete(&request).await?;
        serde_json::from_str(&completion.text)
            .map_err(|e| crate::Error::ProviderOutputInvalid(e.to_string()))
    }

    /// Aggregate a run's reflections into one meta-insight whose parents
    /// are the reflections themselves.
    async fn meta_insight(&self, scope: &Scope, reflection_ids: &[Uuid]) -> Result<()> {
        let reflections = self
            .memories
            .get_batch(reflection_ids, scope)
            .await
            .map_err(|e| e.into_service_error("relational-store"))?;
        if reflections.is_empty() {
            return Ok(());
        }
        let members: Vec<&Memory> = reflections.iter().collect();
        let summary = self.summarize_cluster(&members).await?;

        let mut draft = MemoryDraft::episodic(scope.clone(), summary.summary)
            .with_source("meta_insight")
            .with_importance(self.config.reflection_importance);
        draft.layer = MemoryLayer::Reflective;
        draft.parent_ids = reflection_ids.to_vec();
        draft.validate()?;

        let mut memory = draft.into_memory(Utc::now());
        memory.consolidation_status = ConsolidationStatus::Consolidated;

        self.memories
            .store_reflection(&memory)
            .await
            .map_err(|e| e.into_service_error("relational-store"))?;
        Ok(())
    }
}
