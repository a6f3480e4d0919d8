// src/core/cost.rs — Round cost accounting

use serde::{Deserialize, Serialize};

use crate::collab::TokenUsage;
use crate::infra::config::{ComponentPricing, PricingSettings};

/// $/Mtok pricing for one cycle component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl ModelPricing {
    pub const FREE: ModelPricing = ModelPricing {
        input_per_mtok: 0.0,
        output_per_mtok: 0.0,
    };

    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        let input = (usage.input_tokens as f64 / 1_000_000.0) * self.input_per_mtok;
        let output = (usage.output_tokens as f64 / 1_000_000.0) * self.output_per_mtok;
        input + output
    }
}

/// Pricing for the three LLM-backed components of a round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub agent: ModelPricing,
    pub judge: ModelPricing,
    pub improver: ModelPricing,
}

impl PricingConfig {
    /// Same pricing for every component.
    pub fn uniform(pricing: ModelPricing) -> Self {
        Self {
            agent: pricing,
            judge: pricing,
            improver: pricing,
        }
    }
}

impl From<&PricingSettings> for PricingConfig {
    fn from(settings: &PricingSettings) -> Self {
        let component = |c: &ComponentPricing| ModelPricing {
            input_per_mtok: c.input_per_mtok,
            output_per_mtok: c.output_per_mtok,
        };
        Self {
            agent: component(&settings.agent),
            judge: component(&settings.judge),
            improver: component(&settings.improver),
        }
    }
}

/// Token usage of one round, split by component.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RoundUsage {
    pub agent: TokenUsage,
    pub judge: TokenUsage,
    pub improver: TokenUsage,
}

/// USD cost of one round, split by component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundCost {
    pub agent: f64,
    pub judge: f64,
    pub improver: f64,
    pub total: f64,
}

/// Turn per-component token usage into a cost breakdown.
/// Without pricing the breakdown is all zeros.
pub fn compute_round_cost(usage: &RoundUsage, pricing: Option<&PricingConfig>) -> RoundCost {
    let Some(pricing) = pricing else {
        return RoundCost::default();
    };
    let agent = pricing.agent.cost(&usage.agent);
    let judge = pricing.judge.cost(&usage.judge);
    let improver = pricing.improver.cost(&usage.improver);
    RoundCost {
        agent,
        judge,
        improver,
        total: agent + judge + improver,
    }
}

/// Heuristic $/Mtok lookup by model name, for callers that don't carry an
/// exact pricing table.
pub fn model_pricing(model: &str) -> ModelPricing {
    let (input_per_mtok, output_per_mtok) = match model {
        // Anthropic
        m if m.contains("claude-opus") => (15.0, 75.0),
        m if m.contains("claude-sonnet") => (3.0, 15.0),
        m if m.contains("claude-haiku") || m.contains("haiku") => (0.8, 4.0),

        // OpenAI
        m if m.contains("gpt-4.1-mini") => (0.4, 1.6),
        m if m.contains("gpt-4.1") => (2.0, 8.0),
        m if m.contains("gpt-4o-mini") => (0.15, 0.6),
        m if m.contains("gpt-4o") => (2.5, 10.0),

        // Google Gemini
        m if m.contains("gemini-2.5-pro") => (1.25, 10.0),
        m if m.contains("gemini-2.5-flash") => (0.15, 0.6),

        // Local models (free)
        m if m.contains("llama")
            || m.contains("mistral")
            || m.contains("gemma")
            || m.contains("qwen")
            || m.contains("deepseek") =>
        {
            (0.0, 0.0)
        }

        // Default: assume moderate pricing
        _ => (1.0, 3.0),
    };
    ModelPricing {
        input_per_mtok,
        output_per_mtok,
    }
}
