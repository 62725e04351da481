//! Triple extraction from episodic memories.
//!
//! Fetches unconsolidated episodes, asks the LLM for
//! `{triples, entities}` in JSON, normalizes entity names into canonical
//! node keys, and (optionally) persists the result: one transaction per
//! batch covering nodes, edges, and consolidation marking. A failed batch
//! is skipped — its memories stay unconsolidated — and the invocation still
//! returns the partial result.

use crate::cache::ContextCache;
use crate::error::Result;
use crate::ports::{CompletionRequest, LlmProvider};
use crate::repository::{EdgeInsert, GraphRepository, MemoryRepository, NodeUpsert};
use crate::search::SearchResponse;
use crate::telemetry::Telemetry;
use crate::types::{
    ExtractionConfig, Memory, PROP_CONFIDENCE, PROP_SOURCE_MEMORY_ID, PROP_SOURCE_MEMORY_IDS,
    Scope, Triple,
};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{Map, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Options for one extraction invocation.
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    /// Maximum episodic memories to process
    pub limit: usize,
    /// Confidence floor for keeping triples
    pub min_confidence: f64,
    /// Persist nodes/edges and mark memories consolidated
    pub auto_store: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            min_confidence: 0.5,
            auto_store: true,
        }
    }
}

/// An extracted entity with its canonical node key.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct ExtractedEntity {
    /// Canonical node key (normalized name)
    pub node_id: String,
    /// Display label as emitted by the model
    pub label: String,
    /// Entity type/category
    pub entity_type: String,
}

/// Aggregate counters for one invocation.
#[derive(Debug, Clone, Default, serde::Serialize, Deserialize)]
pub struct ExtractionStatistics {
    /// Memories whose batch completed
    pub memories_processed: u64,
    /// Distinct entities returned
    pub entities_count: u64,
    /// Triples kept after the confidence filter
    pub triples_count: u64,
    /// Batches skipped on provider failure
    pub batches_failed: u64,
}

/// Result of one extraction invocation.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    /// Kept triples across all successful batches
    pub triples: Vec<Triple>,
    /// Distinct entities across all successful batches
    pub entities: Vec<ExtractedEntity>,
    /// Aggregate counters
    pub statistics: ExtractionStatistics,
}

#[derive(Debug, Deserialize)]
struct LlmTriple {
    subject: String,
    predicate: String,
    object: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct LlmEntity {
    name: String,
    #[serde(default)]
    entity_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LlmExtraction {
    #[serde(default)]
    triples: Vec<LlmTriple>,
    #[serde(default)]
    entities: Vec<LlmEntity>,
}

/// Normalize an entity name into its canonical node key: lowercase,
/// punctuation stripped, whitespace collapsed to single spaces.
#[must_use]
pub fn normalize_entity(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Turns episodic memories into graph triples and persists them.
pub struct GraphExtractionService {
    memories: Arc<dyn MemoryRepository>,
    graph: Arc<dyn GraphRepository>,
    llm: Arc<dyn LlmProvider>,
    cache: Arc<ContextCache<SearchResponse>>,
    telemetry: Telemetry,
    config: ExtractionConfig,
}

impl GraphExtractionService {
    /// Wire an extraction service.
    #[must_use]
    pub fn new(
        memories: Arc<dyn MemoryRepository>,
        graph: Arc<dyn GraphRepository>,
        llm: Arc<dyn LlmProvider>,
        cache: Arc<ContextCache<SearchResponse>>,
        telemetry: Telemetry,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            memories,
            graph,
            llm,
            cache,
            telemetry,
            config,
        }
    }

    /// Run one extraction invocation for a scope.
    #[instrument(skip(self, options), fields(scope = %scope))]
    pub async fn extract(
        &self,
        scope: &Scope,
        options: &ExtractionOptions,
    ) -> Result<ExtractionOutcome> {
        scope.validate()?;
        let episodes = self
            .memories
            .find_unconsolidated_episodes(scope, None, options.limit)
            .await
            .map_err(|e| e.into_service_error("relational-store"))?;
        if episodes.is_empty() {
            return Ok(ExtractionOutcome::default());
        }

        let batches: Vec<Vec<Memory>> = episodes
            .chunks(self.config.batch_size.max(1))
            .map(<[Memory]>::to_vec)
            .collect();

        let batch_results: Vec<Option<BatchResult>> = stream::iter(batches)
            .map(|batch| async move { self.process_batch(scope, &batch, options).await })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .collect()
            .await;

        let mut outcome = ExtractionOutcome::default();
        let mut entity_keys: BTreeMap<String, ExtractedEntity> = BTreeMap::new();
        let mut stored_any = false;
        for result in batch_results {
            match result {
                Some(batch) => {
                    outcome.statistics.memories_processed += batch.memories_processed;
                    outcome.triples.extend(batch.triples);
                    for entity in batch.entities {
                        entity_keys.entry(entity.node_id.clone()).or_insert(entity);
                    }
                    stored_any |= batch.stored;
                }
                None => {
                    outcome.statistics.batches_failed += 1;
                    self.telemetry.counter("graph_extraction_batch_failures").increment();
                }
            }
        }
        outcome.entities = entity_keys.into_values().collect();
        outcome.statistics.entities_count = outcome.entities.len() as u64;
        outcome.statistics.triples_count = outcome.triples.len() as u64;

        if stored_any {
            // Readers must not see stale retrieval results once the graph
            // has new knowledge.
            self.cache.invalidate(&scope.tenant_id, Some(&scope.project_id));
        }

        info!(
            triples = outcome.statistics.triples_count,
            entities = outcome.statistics.entities_count,
            failed_batches = outcome.statistics.batches_failed,
            "graph extraction complete"
        );
        Ok(outcome)
    }

    /// Process one batch: LLM call, filtering, optional transactional store.
    ///
    /// Returns `None` when the provider call fails; the batch's memories
    /// stay unconsolidated for a later attempt.
    async fn process_batch(
        &self,
        scope: &Scope,
        batch: &[Memory],
        options: &ExtractionOptions,
    ) -> Option<BatchResult> {
        let extraction = match self.extract_batch_triples(batch).await {
            Ok(extraction) => extraction,
            Err(err) => {
                warn!(error = %err, batch_size = batch.len(), "extraction batch skipped");
                return None;
            }
        };

        let triples: Vec<Triple> = extraction
            .triples
            .into_iter()
            .filter(|t| t.confidence >= options.min_confidence)
            .map(|t| Triple {
                subject: t.subject,
                predicate: t.predicate.to_lowercase().replace(char::is_whitespace, "_"),
                object: t.object,
                confidence: t.confidence.clamp(0.0, 1.0),
            })
            .filter(|t| {
                !normalize_entity(&t.subject).is_empty() && !normalize_entity(&t.object).is_empty()
            })
            .collect();

        let mut entities: Vec<ExtractedEntity> = extraction
            .entities
            .into_iter()
            .filter_map(|e| {
                let node_id = normalize_entity(&e.name);
                if node_id.is_empty() {
                    None
                } else {
                    Some(ExtractedEntity {
                        node_id,
                        label: e.name,
                        entity_type: e.entity_type.unwrap_or_else(|| "concept".to_string()),
                    })
                }
            })
            .collect();
        // Triple endpoints are entities too, even when the model omits them
        // from the entity list.
        for triple in &triples {
            for name in [&triple.subject, &triple.object] {
                let node_id = normalize_entity(name);
                if !entities.iter().any(|e| e.node_id == node_id) {
                    entities.push(ExtractedEntity {
                        node_id,
                        label: name.clone(),
                        entity_type: "concept".to_string(),
                    });
                }
            }
        }

        // Even an empty batch is stored when auto_store is on: its memories
        // were processed and must move to consolidated.
        let mut stored = false;
        if options.auto_store {
            if let Err(err) = self.store_batch(scope, batch, &triples, &entities).await {
                warn!(error = %err, "extraction store failed");
                return None;
            }
            stored = true;
        }

        Some(BatchResult {
            memories_processed: batch.len() as u64,
            triples,
            entities,
            stored,
        })
    }

    async fn extract_batch_triples(&self, batch: &[Memory]) -> Result<LlmExtraction> {
        let mut prompt = String::from(
            "Extract a knowledge graph from the following memories. Emit every \
             distinct entity and every (subject, predicate, object) relation \
             you can support from the text, with a confidence in [0, 1].\n\n",
        );
        for memory in batch {
            prompt.push_str(&format!("[{}] {}\n", memory.id, memory.content));
        }

        let schema = json!({
            "type": "object",
            "properties": {
                "triples": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "subject": {"type": "string"},
                            "predicate": {"type": "string"},
                            "object": {"type": "string"},
                            "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
                        },
                        "required": ["subject", "predicate", "object", "confidence"]
                    }
                },
                "entities": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "entity_type": {"type": "string"}
                        },
                        "required": ["name"]
                    }
                }
            },
            "required": ["triples", "entities"]
        });

        let request = CompletionRequest::new(&self.config.model, prompt)
            .with_system("You extract knowledge graphs from agent memories.")
            .with_max_tokens(self.config.max_tokens)
            .with_json_schema(schema);
        let completion = self.llm.complete(&request).await?;
        serde_json::from_str(&completion.text)
            .map_err(|e| crate::Error::ProviderOutputInvalid(e.to_string()))
    }

    /// Persist one batch transactionally: nodes, edges, consolidation.
    async fn store_batch(
        &self,
        scope: &Scope,
        batch: &[Memory],
        triples: &[Triple],
        entities: &[ExtractedEntity],
    ) -> Result<()> {
        let nodes: Vec<NodeUpsert> = entities
            .iter()
            .map(|entity| {
                let mut properties = Map::new();
                properties.insert("type".to_string(), json!(entity.entity_type));
                properties.insert(
                    PROP_SOURCE_MEMORY_IDS.to_string(),
                    json!(mentioning_memories(batch, &entity.label)),
                );
                NodeUpsert {
                    node_id: entity.node_id.clone(),
                    label: entity.label.clone(),
                    properties,
                }
            })
            .collect();

        let edges: Vec<EdgeInsert> = triples
            .iter()
            .map(|triple| {
                let mut properties = Map::new();
                properties.insert(PROP_CONFIDENCE.to_string(), json!(triple.confidence));
                if let Some(source) = attributed_memory(batch, triple) {
                    properties.insert(
                        PROP_SOURCE_MEMORY_ID.to_string(),
                        json!(source.to_string()),
                    );
                }
                EdgeInsert {
                    source_node_id: normalize_entity(&triple.subject),
                    target_node_id: normalize_entity(&triple.object),
                    relation: triple.predicate.clone(),
                    properties,
                }
            })
            .collect();

        let memory_ids: Vec<Uuid> = batch.iter().map(|m| m.id).collect();
        let applied = self
            .graph
            .apply_extraction(scope, &nodes, &edges, &memory_ids)
            .await
            .map_err(|e| e.into_service_error("relational-store"))?;
        debug!(
            nodes_created = applied.nodes_created,
            edges_created = applied.edges_created,
            edges_observed = applied.edges_observed,
            "extraction batch stored"
        );
        Ok(())
    }
}

struct BatchResult {
    memories_processed: u64,
    triples: Vec<Triple>,
    entities: Vec<ExtractedEntity>,
    stored: bool,
}

/// IDs of batch memories that mention an entity, as strings; falls back to
/// the whole batch when the mention is paraphrased out of the text.
fn mentioning_memories(batch: &[Memory], label: &str) -> Vec<String> {
    let needle = label.to_lowercase();
    let mentions: Vec<String> = batch
        .iter()
        .filter(|m| m.content.to_lowercase().contains(&needle))
        .map(|m| m.id.to_string())
        .collect();
    if mentions.is_empty() {
        batch.iter().map(|m| m.id.to_string()).collect()
    } else {
        mentions
    }
}

/// The memory a triple is attributed to: the first batch member mentioning
/// its subject or object, else the first batch member.
fn attributed_memory(batch: &[Memory], triple: &Triple) -> Option<Uuid> {
    let subject = triple.subject.to_lowercase();
    let object = triple.object.to_lowercase();
    batch
        .iter()
        .find(|m| {
            let content = m.content.to_lowercase();
            content.contains(&subject) || content.contains(&object)
        })
        .or_else(|| batch.first())
        .map(|m| m.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_entity() {
        assert_eq!(normalize_entity("AuthService"), "authservice");
        assert_eq!(normalize_entity("  Encryption   Service! "), "encryption service");
        assert_eq!(normalize_entity("v2.1-beta"), "v2 1 beta");
        assert_eq!(normalize_entity("!!!"), "");
    }

    #[test]
    fn test_attribution_prefers_mentioning_memory() {
        use crate::types::{MemoryDraft, Scope};
        let now = chrono::Utc::now();
        let scope = Scope::new("t1", "p1");
        let unrelated = MemoryDraft::episodic(scope.clone(), "deployed the dashboard")
            .into_memory(now);
        let relevant =
            MemoryDraft::episodic(scope, "AuthService depends on EncryptionService")
                .into_memory(now);
        let batch = vec![unrelated.clone(), relevant.clone()];

        let triple = Triple {
            subject: "AuthService".to_string(),
            predicate: "depends_on".to_string(),
            object: "EncryptionService".to_string(),
            confidence: 0.9,
        };
        assert_eq!(attributed_memory(&batch, &triple), Some(relevant.id));

        let off_topic = Triple {
            subject: "Nothing".to_string(),
            predicate: "relates_to".to_string(),
            object: "Nowhere".to_string(),
            confidence: 0.9,
        };
        assert_eq!(attributed_memory(&batch, &off_topic), Some(unrelated.id));
    }

    #[test]
    fn test_mentioning_memories_fallback() {
        use crate::types::{MemoryDraft, Scope};
        let now = chrono::Utc::now();
        let scope = Scope::new("t1", "p1");
        let memory = MemoryDraft::episodic(scope, "we rolled back the release").into_memory(now);
        let batch = vec![memory.clone()];

        assert_eq!(
            mentioning_memories(&batch, "release"),
            vec![memory.id.to_string()]
        );
        assert_eq!(
            mentioning_memories(&batch, "ghost entity"),
            vec![memory.id.to_string()]
        );
    }
}
