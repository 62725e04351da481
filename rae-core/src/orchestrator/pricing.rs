//! Model pricing and cost computation.

use std::collections::HashMap;

/// Smallest cost booked for any real model call.
///
/// Keeps `total_estimate` strictly positive even for one-token calls
/// against cheap models.
const MIN_BOOKED_COST_USD: f64 = 1e-8;

/// USD per million tokens, input and output side.
#[derive(Debug, Clone, Copy)]
pub struct ModelPrice {
    /// Prompt-side rate
    pub input_usd_per_mtok: f64,
    /// Completion-side rate
    pub output_usd_per_mtok: f64,
}

/// Model-name-keyed pricing with a fallback rate for unknown models.
#[derive(Debug, Clone)]
pub struct PricingTable {
    prices: HashMap<String, ModelPrice>,
    fallback: ModelPrice,
}

impl PricingTable {
    /// Built-in table covering the commonly routed models.
    #[must_use]
    pub fn builtin() -> Self {
        let mut prices = HashMap::new();
        prices.insert(
            "gpt-4o".to_string(),
            ModelPrice {
                input_usd_per_mtok: 2.50,
                output_usd_per_mtok: 10.00,
            },
        );
        prices.insert(
            "gpt-4o-mini".to_string(),
            ModelPrice {
                input_usd_per_mtok: 0.15,
                output_usd_per_mtok: 0.60,
            },
        );
        prices.insert(
            "claude-sonnet".to_string(),
            ModelPrice {
                input_usd_per_mtok: 3.00,
                output_usd_per_mtok: 15.00,
            },
        );
        prices.insert(
            "claude-haiku".to_string(),
            ModelPrice {
                input_usd_per_mtok: 0.80,
                output_usd_per_mtok: 4.00,
            },
        );
        prices.insert(
            "embedding".to_string(),
            ModelPrice {
                input_usd_per_mtok: 0.02,
                output_usd_per_mtok: 0.0,
            },
        );
        Self {
            prices,
            fallback: ModelPrice {
                input_usd_per_mtok: 1.00,
                output_usd_per_mtok: 3.00,
            },
        }
    }

    /// Register or replace one model's rates.
    pub fn set(&mut self, model: impl Into<String>, price: ModelPrice) {
        self.prices.insert(model.into(), price);
    }

    /// Rates for a model, falling back for unknown names.
    #[must_use]
    pub fn price(&self, model: &str) -> ModelPrice {
        self.prices.get(model).copied().unwrap_or(self.fallback)
    }

    /// Cost of one call in USD. Strictly positive whenever any tokens
    /// flowed.
    #[must_use]
    pub fn cost_usd(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        if input_tokens == 0 && output_tokens == 0 {
            return 0.0;
        }
        let price = self.price(model);
        let cost = (input_tokens as f64 / 1e6) * price.input_usd_per_mtok
            + (output_tokens as f64 / 1e6) * price.output_usd_per_mtok;
        cost.max(MIN_BOOKED_COST_USD)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_rates() {
        let table = PricingTable::builtin();
        let cost = table.cost_usd("gpt-4o", 1_000_000, 1_000_000);
        assert!((cost - 12.50).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_uses_fallback() {
        let table = PricingTable::builtin();
        let cost = table.cost_usd("mystery-model", 1_000_000, 0);
        assert!((cost - 1.00).abs() < 1e-9);
    }

    #[test]
    fn test_cost_never_zero_for_real_calls() {
        let table = PricingTable::builtin();
        assert!(table.cost_usd("embedding", 1, 0) > 0.0);
        assert!(table.cost_usd("gpt-4o-mini", 0, 1) > 0.0);
    }

    #[test]
    fn test_zero_tokens_zero_cost() {
        let table = PricingTable::builtin();
        assert!(table.cost_usd("gpt-4o", 0, 0).abs() < f64::EPSILON);
    }
}
