// src/prompt/serialize.rs — Prompt record round-trip
//
// A `PromptRecord` is the persistable form of an `AgentPrompt` as it appears
// inside a history file. Core identity fields live at the top level; any
// extra fields ride in a nested `customFields` bag. On deserialize the core
// fields always win over same-named bag entries, so a hand-edited history
// file cannot spoof the prompt's identity.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{compile_template, parse_version, AgentPrompt};
use crate::infra::errors::{CycleError, Result};

pub const CORE_FIELDS: [&str; 4] = ["id", "version", "system", "userTemplate"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptRecord {
    pub id: String,
    pub version: String,
    pub system: String,
    pub user_template: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub custom_fields: Map<String, Value>,
}

/// Convert a live prompt into its persistable record.
pub fn serialize_prompt(prompt: &AgentPrompt) -> Result<PromptRecord> {
    parse_version(&prompt.version).ok_or_else(|| {
        CycleError::PromptInvalidFormat(format!(
            "prompt '{}' has invalid version '{}'",
            prompt.id, prompt.version
        ))
    })?;

    Ok(PromptRecord {
        id: prompt.id.clone(),
        version: prompt.version.clone(),
        system: prompt.system.clone(),
        user_template: prompt.user_template.clone(),
        custom_fields: prompt.custom_fields.clone(),
    })
}

/// Rebuild a live prompt from a record.
///
/// Validates the version, compiles the template, and strips any core-field
/// names that an untrusted file smuggled into `customFields`.
pub fn deserialize_prompt(record: &PromptRecord) -> Result<AgentPrompt> {
    if record.id.is_empty() {
        return Err(CycleError::PromptInvalidFormat(
            "prompt record has an empty id".into(),
        ));
    }
    parse_version(&record.version).ok_or_else(|| {
        CycleError::PromptInvalidFormat(format!(
            "prompt record '{}' has invalid version '{}'",
            record.id, record.version
        ))
    })?;
    compile_template(&record.user_template)?;

    let mut custom_fields = record.custom_fields.clone();
    for field in CORE_FIELDS {
        custom_fields.remove(field);
    }

    Ok(AgentPrompt {
        id: record.id.clone(),
        version: record.version.clone(),
        system: record.system.clone(),
        user_template: record.user_template.clone(),
        custom_fields,
    })
}

/// Parse a record out of raw JSON, shape-checking the core fields.
pub fn prompt_record_from_value(value: Value) -> Result<PromptRecord> {
    serde_json::from_value(value)
        .map_err(|e| CycleError::PromptInvalidFormat(format!("malformed prompt record: {e}")))
}
