// src/core/types.rs — Cycle domain types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::termination::TerminationCheck;
use crate::history::RoundRecord;
use crate::prompt::AgentPrompt;

/// Which prompt field a suggestion edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    SystemPrompt,
    UserPrompt,
    Parameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionPriority {
    High,
    Medium,
    Low,
}

/// A proposed edit to one prompt field.
///
/// Suggestions are ephemeral: they exist between the improver call and the
/// round decision. Once applied they are counted in the round record and
/// never mutated again.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub priority: SuggestionPriority,
    pub current_value: String,
    pub suggested_value: String,
    pub reasoning: String,
    pub expected_improvement: String,
    #[serde(default)]
    pub approved: bool,
    /// Human-edited replacement text; wins over `suggested_value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

impl Suggestion {
    pub fn new(
        kind: SuggestionKind,
        current_value: impl Into<String>,
        suggested_value: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            priority: SuggestionPriority::Medium,
            current_value: current_value.into(),
            suggested_value: suggested_value.into(),
            reasoning: String::new(),
            expected_improvement: String::new(),
            approved: false,
            modified: None,
        }
    }

    pub fn with_priority(mut self, priority: SuggestionPriority) -> Self {
        self.priority = priority;
        self
    }

    /// The text that actually replaces `current_value`.
    pub fn effective_value(&self) -> &str {
        self.modified.as_deref().unwrap_or(&self.suggested_value)
    }
}

/// Read-only view of the run handed to termination checks.
#[derive(Debug, Clone, Default)]
pub struct CycleContext {
    pub current_round: u32,
    pub latest_score: Option<f64>,
    /// Scores of persisted rounds, oldest first. Truncated on rollback.
    pub previous_scores: Vec<f64>,
    pub total_cost: f64,
    pub history: Vec<RoundRecord>,
}

/// What the cycle yields between rounds.
#[derive(Debug, Clone)]
pub struct RoundYield {
    pub round_result: RoundRecord,
    /// All generated suggestions, unapproved.
    pub pending_suggestions: Vec<Suggestion>,
    pub termination: TerminationCheck,
    pub context: CycleContext,
}

/// The decision a caller supplies to resume the cycle.
#[derive(Debug, Clone)]
pub enum RoundDecision {
    Continue { approved: Vec<Suggestion> },
    Stop,
    Rollback { to_round: u32 },
}

/// One step of the state machine: either another suspension point or the
/// final result.
#[derive(Debug)]
pub enum CycleStep {
    AwaitingDecision(Box<RoundYield>),
    Complete(ImprovementCycleResult),
}

/// Final aggregate returned when the cycle completes.
#[derive(Debug, Clone)]
pub struct ImprovementCycleResult {
    pub session_id: String,
    pub rounds_completed: u32,
    pub final_score: Option<f64>,
    pub total_cost: f64,
    pub termination_reason: String,
    pub final_prompt: AgentPrompt,
    pub history_path: Option<PathBuf>,
}
