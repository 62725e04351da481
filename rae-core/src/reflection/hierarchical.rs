//! Hierarchical map-reduce summarization.
//!
//! Splits arbitrarily many episodes into fixed-size buckets, summarizes
//! each bucket via the LLM, then summarizes the summaries recursively until
//! a single text remains. Carries no cluster structure and marks nothing
//! consolidated; it serves large retrospective reads.

use super::ReflectionPipeline;
use crate::error::Result;
use crate::ports::CompletionRequest;
use crate::types::{MemoryLayer, Scope};
use crate::repository::MemoryQuery;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Counters for one hierarchical run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchicalStats {
    /// Episodes consumed at the leaf level
    pub episodes: usize,
    /// Reduction levels run (0 for a single-bucket input)
    pub levels: u32,
    /// LLM summarization calls made
    pub llm_calls: u64,
}

/// Result of a hierarchical summarization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchicalSummary {
    /// The final root summary
    pub summary: String,
    /// Run counters
    pub statistics: HierarchicalStats,
}

impl ReflectionPipeline {
    /// Map-reduce summarize up to `limit` episodic memories of a scope.
    #[instrument(skip(self), fields(scope = %scope))]
    pub async fn hierarchical_summary(
        &self,
        scope: &Scope,
        limit: usize,
    ) -> Result<HierarchicalSummary> {
        scope.validate()?;
        let episodes = self
            .memories()
            .list_by_layer(scope, MemoryLayer::Episodic, &MemoryQuery::with_limit(limit))
            .await
            .map_err(|e| e.into_service_error("relational-store"))?;

        let mut stats = HierarchicalStats {
            episodes: episodes.len(),
            ..HierarchicalStats::default()
        };
        if episodes.is_empty() {
            return Ok(HierarchicalSummary {
                summary: String::new(),
                statistics: stats,
            });
        }

        let bucket_size = self.config.bucket_size.max(2);
        let mut level: Vec<String> = episodes.into_iter().map(|m| m.content).collect();

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(bucket_size));
            for bucket in level.chunks(bucket_size) {
                next.push(self.summarize_bucket(bucket, &mut stats).await?);
            }
            stats.levels += 1;
            level = next;
        }

        // A single leaf still gets one condensation pass.
        let summary = if stats.levels == 0 {
            self.summarize_bucket(&level, &mut stats).await?
        } else {
            level.remove(0)
        };

        Ok(HierarchicalSummary {
            summary,
            statistics: stats,
        })
    }

    async fn summarize_bucket(
        &self,
        texts: &[String],
        stats: &mut HierarchicalStats,
    ) -> Result<String> {
        let mut prompt =
            String::from("Condense the following notes into one faithful summary paragraph:\n\n");
        for text in texts {
            prompt.push_str(&format!("- {text}\n"));
        }
        let request = CompletionRequest::new(&self.config.model, prompt)
            .with_system("You write faithful, compact summaries.")
            .with_max_tokens(self.config.max_tokens);
        let completion = self.llm().complete(&request).await?;
        stats.llm_calls += 1;
        Ok(completion.text.trim().to_string())
    }
}
