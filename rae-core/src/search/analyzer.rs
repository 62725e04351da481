//! Query analysis: intent classification and strategy weighting.
//!
//! The analyzer is LLM-backed when constructed with a provider and degrades
//! gracefully: any provider failure falls back to a rule-based classifier
//! over lexical features. When the caller requests a named weight profile
//! the analyzer is skipped entirely.

use super::types::StrategyWeights;
use crate::ports::{CompletionRequest, LlmProvider};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Classified query intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    /// Asking for a specific fact
    Factual,
    /// Asking for an explanation or concept
    Conceptual,
    /// Looking for a known item
    Navigational,
    /// Asking how to do something
    Procedural,
    /// Open-ended browsing
    Exploratory,
    /// Asking about connections between entities
    Relational,
}

impl QueryIntent {
    /// Default weight vector for this intent.
    #[must_use]
    pub fn weights(self) -> StrategyWeights {
        match self {
            QueryIntent::Factual => StrategyWeights::new(0.35, 0.15, 0.15, 0.35),
            QueryIntent::Conceptual => StrategyWeights::new(0.45, 0.25, 0.15, 0.15),
            QueryIntent::Navigational => StrategyWeights::new(0.3, 0.1, 0.2, 0.4),
            QueryIntent::Procedural => StrategyWeights::new(0.4, 0.15, 0.15, 0.3),
            QueryIntent::Exploratory => StrategyWeights::new(0.3, 0.2, 0.3, 0.2),
            QueryIntent::Relational => StrategyWeights::new(0.25, 0.2, 0.4, 0.15),
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "factual" => Some(QueryIntent::Factual),
            "conceptual" => Some(QueryIntent::Conceptual),
            "navigational" => Some(QueryIntent::Navigational),
            "procedural" => Some(QueryIntent::Procedural),
            "exploratory" => Some(QueryIntent::Exploratory),
            "relational" => Some(QueryIntent::Relational),
            _ => None,
        }
    }
}

/// Analyzer output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// Classified intent
    pub intent: QueryIntent,
    /// Classifier confidence in [0, 1]
    pub confidence: f64,
    /// Weight vector for the fusion step
    pub weights: StrategyWeights,
}

#[derive(Deserialize)]
struct LlmClassification {
    intent: String,
    confidence: f64,
}

/// Lexical feature patterns for the rule-based classifier.
struct Lexicon {
    procedural: Regex,
    conceptual: Regex,
    factual: Regex,
    relational: Regex,
    navigational: Regex,
    numeric: Regex,
}

impl Lexicon {
    // The patterns are fixed strings; compilation cannot fail.
    #[allow(clippy::unwrap_used)]
    fn new() -> Self {
        Self {
            procedural: Regex::new(r"\bhow (do|to|can|should|would)\b").unwrap(),
            conceptual: Regex::new(r"\b(why|explain|meaning of|understand)\b").unwrap(),
            factual: Regex::new(r"\b(what is|what are|who is|when did|define)\b").unwrap(),
            relational: Regex::new(
                r"\b(depend(s|encies|ency)?|related|relationship|connect(s|ed|ion)?|between|impact(s)?)\b",
            )
            .unwrap(),
            navigational: Regex::new(r"\b(where|find|locate|show me|look up)\b").unwrap(),
            numeric: Regex::new(r"\d").unwrap(),
        }
    }
}

/// LLM-backed query classifier with a rule-based fallback.
pub struct QueryAnalyzer {
    llm: Option<Arc<dyn LlmProvider>>,
    lexicon: Lexicon,
}

impl QueryAnalyzer {
    /// Rule-based analyzer.
    #[must_use]
    pub fn rule_based() -> Self {
        Self {
            llm: None,
            lexicon: Lexicon::new(),
        }
    }

    /// LLM-backed analyzer; failures degrade to the rule path.
    #[must_use]
    pub fn with_llm(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm: Some(llm),
            lexicon: Lexicon::new(),
        }
    }

    /// Classify a query and produce strategy weights.
    pub async fn analyze(&self, query: &str) -> QueryAnalysis {
        if let Some(llm) = &self.llm {
            match self.analyze_with_llm(llm.as_ref(), query).await {
                Ok(analysis) => return analysis,
                Err(err) => {
                    warn!(error = %err, "query analyzer falling back to rules");
                }
            }
        }
        self.classify_by_rules(query)
    }

    async fn analyze_with_llm(
        &self,
        llm: &dyn LlmProvider,
        query: &str,
    ) -> crate::Result<QueryAnalysis> {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "intent": {
                    "type": "string",
                    "enum": [
                        "factual", "conceptual", "navigational",
                        "procedural", "exploratory", "relational"
                    ]
                },
                "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
            },
            "required": ["intent", "confidence"]
        });
        let request = CompletionRequest::new(
            llm.default_model(),
            format!("Classify the retrieval intent of this query: {query}"),
        )
        .with_system("You classify search queries for a memory retrieval system.")
        .with_max_tokens(128)
        .with_json_schema(schema);

        let completion = llm.complete(&request).await?;
        let parsed: LlmClassification = serde_json::from_str(&completion.text)
            .map_err(|e| crate::Error::ProviderOutputInvalid(e.to_string()))?;
        let intent = QueryIntent::from_name(&parsed.intent).ok_or_else(|| {
            crate::Error::ProviderOutputInvalid(format!("unknown intent `{}`", parsed.intent))
        })?;
        Ok(QueryAnalysis {
            intent,
            confidence: parsed.confidence.clamp(0.0, 1.0),
            weights: intent.weights(),
        })
    }

    /// Rule-based classification over lexical features.
    #[must_use]
    pub fn classify_by_rules(&self, query: &str) -> QueryAnalysis {
        let lower = query.to_lowercase();
        let lex = &self.lexicon;

        let (intent, confidence) = if lex.procedural.is_match(&lower) {
            (QueryIntent::Procedural, 0.8)
        } else if lex.relational.is_match(&lower) {
            (QueryIntent::Relational, 0.75)
        } else if lex.factual.is_match(&lower) {
            (QueryIntent::Factual, 0.8)
        } else if lex.conceptual.is_match(&lower) {
            (QueryIntent::Conceptual, 0.7)
        } else if lex.navigational.is_match(&lower) {
            (QueryIntent::Navigational, 0.7)
        } else if query.contains('?') || lex.numeric.is_match(&lower) {
            (QueryIntent::Factual, 0.5)
        } else if has_proper_noun(query) {
            (QueryIntent::Navigational, 0.5)
        } else {
            (QueryIntent::Exploratory, 0.4)
        };

        QueryAnalysis {
            intent,
            confidence,
            weights: intent.weights(),
        }
    }
}

/// A capitalized token after the first word suggests a named entity.
fn has_proper_noun(query: &str) -> bool {
    query
        .split_whitespace()
        .skip(1)
        .any(|word| word.chars().next().is_some_and(char::is_uppercase))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> QueryAnalyzer {
        QueryAnalyzer::rule_based()
    }

    #[tokio::test]
    async fn test_procedural_classification() {
        let analysis = analyzer().analyze("how do I rotate credentials").await;
        assert_eq!(analysis.intent, QueryIntent::Procedural);
    }

    #[tokio::test]
    async fn test_relational_classification() {
        let analysis = analyzer().analyze("authentication dependencies").await;
        assert_eq!(analysis.intent, QueryIntent::Relational);
        assert!(analysis.weights.graph > analysis.weights.fulltext);
    }

    #[tokio::test]
    async fn test_factual_classification() {
        let analysis = analyzer().analyze("what is the retention window").await;
        assert_eq!(analysis.intent, QueryIntent::Factual);
    }

    #[tokio::test]
    async fn test_exploratory_default() {
        let analysis = analyzer().analyze("recent deployment context").await;
        assert_eq!(analysis.intent, QueryIntent::Exploratory);
    }

    #[tokio::test]
    async fn test_proper_noun_navigational() {
        let analysis = analyzer().analyze("notes about AuthService").await;
        assert_eq!(analysis.intent, QueryIntent::Navigational);
    }

    #[test]
    fn test_intent_weights_sum_to_one() {
        for intent in [
            QueryIntent::Factual,
            QueryIntent::Conceptual,
            QueryIntent::Navigational,
            QueryIntent::Procedural,
            QueryIntent::Exploratory,
            QueryIntent::Relational,
        ] {
            let w = intent.weights();
            assert!((w.vector + w.semantic + w.graph + w.fulltext - 1.0).abs() < 1e-9);
        }
    }
}
