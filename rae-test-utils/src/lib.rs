#![allow(clippy::cast_precision_loss)]

//! Deterministic mock providers and fixtures for engine tests.
//!
//! The embedding mock produces token-bag vectors, so texts sharing words
//! land near each other — enough signal for retrieval tests without any
//! model. The LLM mock replays scripted responses in order. None of these
//! belong in production wiring.

use async_trait::async_trait;
use parking_lot::Mutex;
use rae_core::error::{Error, Result};
use rae_core::ports::{
    Completion, CompletionRequest, EmbeddingProvider, LlmProvider, RerankCandidate, Reranker,
    estimate_tokens,
};
use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Deterministic token-bag embedding provider.
///
/// Each token hashes to a pseudo-random unit direction; a text's embedding
/// is the normalized sum of its token directions. Shared vocabulary means
/// higher cosine similarity.
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    /// Create a provider with the given dimension.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn token_direction(&self, token: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let mut seed = hasher.finish();

        let mut direction = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let value = ((seed >> 16) as f32) / 32_768.0 - 1.0;
            direction.push(value);
        }
        direction
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut sum = vec![0.0f32; self.dimension];
        let mut tokens = 0usize;
        for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            tokens += 1;
            for (s, d) in sum.iter_mut().zip(self.token_direction(token)) {
                *s += d;
            }
        }
        if tokens == 0 {
            sum[0] = 1.0;
        }
        normalize(sum)
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(64)
    }
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let magnitude = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in &mut vector {
            *x /= magnitude;
        }
    }
    vector
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-token-bag"
    }
}

/// An embedding provider that always fails; for degradation tests.
pub struct FailingEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
    async fn embed_text(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::unavailable("embedding-provider", "mock outage"))
    }

    fn dimension(&self) -> usize {
        64
    }

    fn model_name(&self) -> &str {
        "mock-failing"
    }
}

/// LLM mock replaying scripted responses in FIFO order.
///
/// When the script runs dry it answers with `fallback` (default `"ok"`),
/// which deliberately fails JSON-schema requests so unscripted structured
/// calls surface as `ProviderOutputInvalid` in tests.
pub struct ScriptedLlmProvider {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    fallback: String,
    calls: Mutex<Vec<CompletionRequest>>,
}

enum ScriptedResponse {
    Text(String),
    Failure(Error),
}

impl ScriptedLlmProvider {
    /// Create an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: "ok".to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replace the dry-script fallback text.
    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Queue a text response.
    pub fn push_response(&self, text: impl Into<String>) {
        self.responses
            .lock()
            .push_back(ScriptedResponse::Text(text.into()));
    }

    /// Queue a JSON response.
    pub fn push_json(&self, value: serde_json::Value) {
        self.push_response(value.to_string());
    }

    /// Queue a failure.
    pub fn push_failure(&self) {
        self.responses
            .lock()
            .push_back(ScriptedResponse::Failure(Error::unavailable(
                "llm-provider",
                "mock outage",
            )));
    }

    /// Requests seen so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().clone()
    }
}

impl Default for ScriptedLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlmProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.calls.lock().push(request.clone());
        let next = self.responses.lock().pop_front();
        let text = match next {
            Some(ScriptedResponse::Text(text)) => text,
            Some(ScriptedResponse::Failure(err)) => return Err(err),
            None => self.fallback.clone(),
        };
        if request.json_schema.is_some() && serde_json::from_str::<serde_json::Value>(&text).is_err()
        {
            return Err(Error::ProviderOutputInvalid(format!(
                "scripted response is not JSON: {text}"
            )));
        }
        let prompt_len = request.prompt.len() + request.system.as_deref().map_or(0, str::len);
        Ok(Completion {
            input_tokens: estimate_tokens(&"x".repeat(prompt_len)),
            output_tokens: estimate_tokens(&text),
            text,
        })
    }

    fn default_model(&self) -> &str {
        "default"
    }
}

/// Reranker that returns candidates in descending original score.
pub struct PassthroughReranker;

#[async_trait]
impl Reranker for PassthroughReranker {
    async fn rerank(
        &self,
        _query: &str,
        mut candidates: Vec<RerankCandidate>,
        k: usize,
    ) -> Result<Vec<RerankCandidate>> {
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(k);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rae_core::ports::cosine_similarity;

    #[tokio::test]
    async fn test_shared_tokens_raise_similarity() {
        let provider = MockEmbeddingProvider::default();
        let a = provider.embed_text("user prefers dark mode").await.unwrap();
        let b = provider.embed_text("dark mode preference").await.unwrap();
        let c = provider.embed_text("quarterly revenue report").await.unwrap();

        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[tokio::test]
    async fn test_embedding_is_deterministic() {
        let provider = MockEmbeddingProvider::default();
        let a = provider.embed_text("stable input").await.unwrap();
        let b = provider.embed_text("stable input").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_scripted_llm_replays_in_order() {
        let llm = ScriptedLlmProvider::new();
        llm.push_response("first");
        llm.push_response("second");

        let request = CompletionRequest::new("default", "hello");
        assert_eq!(llm.complete(&request).await.unwrap().text, "first");
        assert_eq!(llm.complete(&request).await.unwrap().text, "second");
        assert_eq!(llm.complete(&request).await.unwrap().text, "ok");
        assert_eq!(llm.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_llm_schema_guard() {
        let llm = ScriptedLlmProvider::new();
        let request = CompletionRequest::new("default", "hello")
            .with_json_schema(serde_json::json!({"type": "object"}));
        let err = llm.complete(&request).await.unwrap_err();
        assert!(matches!(err, Error::ProviderOutputInvalid(_)));
    }

    #[tokio::test]
    async fn test_token_counts_populated() {
        let llm = ScriptedLlmProvider::new();
        llm.push_response("a response");
        let completion = llm
            .complete(&CompletionRequest::new("default", "some prompt"))
            .await
            .unwrap();
        assert!(completion.input_tokens > 0);
        assert!(completion.output_tokens > 0);
    }
}
