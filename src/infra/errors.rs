// src/infra/errors.rs — Error types for promptcycle

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CycleError {
    // Configuration errors (bad arguments, bad decisions)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Concurrent session modification: {0}")]
    ConcurrentModification(String),

    // History file errors
    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // Prompt errors
    #[error("Invalid prompt format: {0}")]
    PromptInvalidFormat(String),

    #[error("Template failed to compile: {0}")]
    TemplateCompile(String),

    #[error("Failed to apply suggestion: {0}")]
    SuggestionApply(String),

    // Collaborator passthrough
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CycleError {
    /// True for errors the caller can fix by changing inputs, as opposed
    /// to I/O or collaborator failures.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CycleError::InvalidConfig(_) | CycleError::SchemaValidation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_config_error() {
        assert!(CycleError::InvalidConfig("x".into()).is_config_error());
        assert!(CycleError::SchemaValidation("x".into()).is_config_error());
        assert!(!CycleError::TemplateCompile("x".into()).is_config_error());
    }

    #[test]
    fn test_display_includes_path() {
        let err = CycleError::FileWrite {
            path: PathBuf::from("/tmp/history.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = format!("{err}");
        assert!(msg.contains("/tmp/history.json"));
        assert!(msg.contains("denied"));
    }
}
