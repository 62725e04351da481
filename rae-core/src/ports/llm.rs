//! LLM provider port.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One text-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// System prompt, prepended by the provider
    pub system: Option<String>,
    /// User prompt
    pub prompt: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token cap
    pub max_tokens: u32,
    /// When set, the returned text is guaranteed to parse against this JSON
    /// schema or the call fails with
    /// [`crate::Error::ProviderOutputInvalid`]
    pub json_schema: Option<Value>,
}

impl CompletionRequest {
    /// Create a plain-text request with default sampling.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            temperature: 0.2,
            max_tokens: 1_024,
            json_schema: None,
        }
    }

    /// Set the system prompt.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Require schema-conformant JSON output.
    #[must_use]
    pub fn with_json_schema(mut self, schema: Value) -> Self {
        self.json_schema = Some(schema);
        self
    }

    /// Set the completion token cap.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Completion result with token accounting.
///
/// Token counts are always populated: providers that do not report them
/// estimate via [`estimate_tokens`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text; schema-conformant JSON when a schema was requested
    pub text: String,
    /// Prompt-side tokens
    pub input_tokens: u64,
    /// Completion-side tokens
    pub output_tokens: u64,
}

/// Text-completion provider.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one completion.
    ///
    /// # Errors
    ///
    /// [`crate::Error::DependencyUnavailable`] when the provider is
    /// unreachable; [`crate::Error::ProviderOutputInvalid`] when a requested
    /// schema cannot be satisfied.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Model used when the caller does not specify one.
    fn default_model(&self) -> &str;
}

/// Tokenizer heuristic for providers that do not report counts.
///
/// Approximates one token per four characters, with a floor of one token
/// for non-empty text.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    (text.len() as u64).div_ceil(4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_floor() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_request_builder() {
        let request = CompletionRequest::new("default", "hello")
            .with_system("you are terse")
            .with_max_tokens(64)
            .with_json_schema(serde_json::json!({"type": "object"}));
        assert_eq!(request.max_tokens, 64);
        assert!(request.system.is_some());
        assert!(request.json_schema.is_some());
    }
}
