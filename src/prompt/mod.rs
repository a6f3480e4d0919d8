// src/prompt/mod.rs — Agent prompt: template rendering and versioning

pub mod apply;
pub mod serialize;

use minijinja::Environment;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::infra::errors::{CycleError, Result};

/// A templated agent prompt under improvement.
///
/// `version` always parses as three non-negative integers (`x.y.z`).
/// `user_template` is a minijinja template rendered per test input; the
/// system text is passed to the agent as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentPrompt {
    pub id: String,
    pub version: String,
    pub system: String,
    pub user_template: String,
    /// Domain-specific extras (model parameters, labels). Preserved across
    /// serialization under a nested `customFields` bag.
    pub custom_fields: Map<String, Value>,
}

impl AgentPrompt {
    pub fn new(
        id: impl Into<String>,
        system: impl Into<String>,
        user_template: impl Into<String>,
    ) -> Result<Self> {
        let prompt = Self {
            id: id.into(),
            version: "1.0.0".into(),
            system: system.into(),
            user_template: user_template.into(),
            custom_fields: Map::new(),
        };
        compile_template(&prompt.user_template)?;
        Ok(prompt)
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Result<Self> {
        let version = version.into();
        parse_version(&version).ok_or_else(|| {
            CycleError::PromptInvalidFormat(format!("invalid semver version '{version}'"))
        })?;
        self.version = version;
        Ok(self)
    }

    pub fn with_custom_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom_fields.insert(key.into(), value);
        self
    }

    /// Render the user template against one test input.
    pub fn render<S: Serialize>(&self, input: S) -> Result<String> {
        let mut env = Environment::new();
        env.add_template("user", &self.user_template)
            .map_err(|e| CycleError::TemplateCompile(e.to_string()))?;
        let tmpl = env
            .get_template("user")
            .map_err(|e| CycleError::TemplateCompile(e.to_string()))?;
        tmpl.render(input)
            .map_err(|e| CycleError::TemplateCompile(e.to_string()))
    }
}

/// Check that a template compiles without rendering it.
pub fn compile_template(template: &str) -> Result<()> {
    let mut env = Environment::new();
    env.add_template("check", template)
        .map_err(|e| CycleError::TemplateCompile(e.to_string()))
}

/// Parse a `x.y.z` semver string into its components.
pub fn parse_version(version: &str) -> Option<(u64, u64, u64)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionBump {
    Major,
    Minor,
    Patch,
}

/// Bump a semver string. `Major` resets minor and patch; `Minor` resets
/// patch; `Patch` changes only the patch component.
pub fn bump_version(version: &str, bump: VersionBump) -> Result<String> {
    let (major, minor, patch) = parse_version(version).ok_or_else(|| {
        CycleError::SuggestionApply(format!("cannot bump invalid version '{version}'"))
    })?;
    let bumped = match bump {
        VersionBump::Major => (major + 1, 0, 0),
        VersionBump::Minor => (major, minor + 1, 0),
        VersionBump::Patch => (major, minor, patch + 1),
    };
    Ok(format!("{}.{}.{}", bumped.0, bumped.1, bumped.2))
}
