// src/prompt/apply.rs — Applying approved suggestions to a prompt
//
// Each suggestion replaces the first textual occurrence of its
// `current_value` in the target field. A suggestion whose `current_value`
// cannot be found is skipped and recorded, never raised as an error, so a
// stale suggestion from an earlier round cannot wedge the cycle.

use serde_json::Value;

use super::{compile_template, AgentPrompt};
use crate::core::types::{Suggestion, SuggestionKind};
use crate::infra::errors::{CycleError, Result};

/// Key in `custom_fields` that `Parameters` suggestions target.
pub const PARAMETERS_FIELD: &str = "parameters";

#[derive(Debug, Clone)]
pub struct SkippedSuggestion {
    pub suggestion: Suggestion,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    pub applied: Vec<Suggestion>,
    pub skipped: Vec<SkippedSuggestion>,
}

impl ApplyOutcome {
    pub fn applied_count(&self) -> u32 {
        self.applied.len() as u32
    }
}

/// Replace the first occurrence of `needle` in `haystack`.
/// Returns `None` when the needle is absent.
fn replace_first(haystack: &str, needle: &str, replacement: &str) -> Option<String> {
    let idx = haystack.find(needle)?;
    let mut out = String::with_capacity(haystack.len() - needle.len() + replacement.len());
    out.push_str(&haystack[..idx]);
    out.push_str(replacement);
    out.push_str(&haystack[idx + needle.len()..]);
    Some(out)
}

/// Apply a batch of approved suggestions to the working prompt, in order.
pub fn apply_suggestions(prompt: &mut AgentPrompt, approved: &[Suggestion]) -> Result<ApplyOutcome> {
    let mut outcome = ApplyOutcome::default();

    for suggestion in approved {
        let replacement = suggestion.effective_value();

        match suggestion.kind {
            SuggestionKind::SystemPrompt => {
                match replace_first(&prompt.system, &suggestion.current_value, replacement) {
                    Some(updated) => {
                        prompt.system = updated;
                        outcome.applied.push(suggestion.clone());
                    }
                    None => outcome.skipped.push(SkippedSuggestion {
                        suggestion: suggestion.clone(),
                        reason: "current value not found in system prompt".into(),
                    }),
                }
            }
            SuggestionKind::UserPrompt => {
                if prompt.user_template.is_empty() {
                    return Err(CycleError::SuggestionApply(format!(
                        "prompt '{}' has no user template to edit",
                        prompt.id
                    )));
                }
                match replace_first(&prompt.user_template, &suggestion.current_value, replacement) {
                    Some(updated) => {
                        // The edited template must still compile.
                        compile_template(&updated)?;
                        prompt.user_template = updated;
                        outcome.applied.push(suggestion.clone());
                    }
                    None => outcome.skipped.push(SkippedSuggestion {
                        suggestion: suggestion.clone(),
                        reason: "current value not found in user template".into(),
                    }),
                }
            }
            SuggestionKind::Parameters => {
                let updated = prompt
                    .custom_fields
                    .get(PARAMETERS_FIELD)
                    .and_then(Value::as_str)
                    .and_then(|text| replace_first(text, &suggestion.current_value, replacement));
                match updated {
                    Some(text) => {
                        prompt
                            .custom_fields
                            .insert(PARAMETERS_FIELD.into(), Value::String(text));
                        outcome.applied.push(suggestion.clone());
                    }
                    None => outcome.skipped.push(SkippedSuggestion {
                        suggestion: suggestion.clone(),
                        reason: "current value not found in parameters".into(),
                    }),
                }
            }
        }
    }

    Ok(outcome)
}
