// src/history/persist.rs — History persistence
//
// Saves are serialized per session through a dedicated writer task: every
// save (auto or explicit) is a job on one queue, so overlapping triggers can
// never interleave partial writes to the same file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::{ImprovementHistory, SaveErrorHandler, SCHEMA_VERSION};
use crate::infra::errors::{CycleError, Result};

pub const REQUIRED_FIELDS: [&str; 7] = [
    "schemaVersion",
    "sessionId",
    "startedAt",
    "initialPrompt",
    "currentPrompt",
    "rounds",
    "totalCost",
];

/// Write a history file: pretty-printed JSON, 2-space indent. Missing
/// parent directories are created.
pub async fn save_history(history: &ImprovementHistory, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(history)
        .map_err(|e| CycleError::SchemaValidation(format!("history not serializable: {e}")))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CycleError::FileWrite {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
    }

    tokio::fs::write(path, json)
        .await
        .map_err(|source| CycleError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
}

/// Load and validate a history file. Malformed JSON, missing required
/// fields, and schema-version mismatches are all rejected outright; there
/// is no migration path.
pub async fn load_history(path: &Path) -> Result<ImprovementHistory> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CycleError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| CycleError::SchemaValidation(format!("malformed history file: {e}")))?;

    let object = value
        .as_object()
        .ok_or_else(|| CycleError::SchemaValidation("history file is not a JSON object".into()))?;

    for field in REQUIRED_FIELDS {
        if !object.contains_key(field) {
            return Err(CycleError::SchemaValidation(format!(
                "history file missing required field '{field}'"
            )));
        }
    }

    let found_version = object
        .get("schemaVersion")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("<non-string>");
    if found_version != SCHEMA_VERSION {
        return Err(CycleError::SchemaValidation(format!(
            "unsupported schema version '{found_version}' (expected '{SCHEMA_VERSION}')"
        )));
    }

    serde_json::from_value(value)
        .map_err(|e| CycleError::SchemaValidation(format!("invalid history file: {e}")))
}

struct SaveJob {
    history: ImprovementHistory,
    path: PathBuf,
    /// Present for explicit saves; the result is delivered to the caller.
    ack: Option<oneshot::Sender<Result<()>>>,
    /// For fire-and-forget saves: where failures are reported.
    on_error: Option<Arc<SaveErrorHandler>>,
}

/// Per-session write queue. Jobs run strictly in enqueue order on a
/// dedicated task; the task exits when the owning session is dropped.
pub(crate) struct SessionWriter {
    tx: mpsc::UnboundedSender<SaveJob>,
}

impl SessionWriter {
    pub(crate) fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SaveJob>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = save_history(&job.history, &job.path).await;
                match job.ack {
                    Some(ack) => {
                        let _ = ack.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            match &job.on_error {
                                Some(handler) => handler(&e),
                                None => tracing::warn!("history auto-save failed: {e}"),
                            }
                        }
                    }
                }
            }
        });
        Self { tx }
    }

    /// Fire-and-forget save.
    pub(crate) fn enqueue(
        &self,
        history: ImprovementHistory,
        path: PathBuf,
        on_error: Option<Arc<SaveErrorHandler>>,
    ) {
        let job = SaveJob {
            history,
            path,
            ack: None,
            on_error,
        };
        if self.tx.send(job).is_err() {
            tracing::warn!("history writer task is gone; auto-save dropped");
        }
    }

    /// Explicit save: queued behind any pending writes, result awaited.
    pub(crate) async fn write_and_wait(
        &self,
        history: ImprovementHistory,
        path: PathBuf,
    ) -> Result<()> {
        let (ack, done) = oneshot::channel();
        let job = SaveJob {
            history,
            path,
            ack: Some(ack),
            on_error: None,
        };
        self.tx
            .send(job)
            .map_err(|_| CycleError::Other(anyhow::anyhow!("history writer task terminated")))?;
        done.await
            .map_err(|_| CycleError::Other(anyhow::anyhow!("history writer task terminated")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::serialize::serialize_prompt;
    use crate::prompt::AgentPrompt;

    fn history() -> ImprovementHistory {
        let prompt = AgentPrompt::new("p", "system", "{{ q }}").unwrap();
        ImprovementHistory::new(serialize_prompt(&prompt).unwrap())
    }

    #[tokio::test]
    async fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/history.json");
        save_history(&history(), &path).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_save_is_pretty_printed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        save_history(&history(), &path).await.unwrap();
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(raw.contains("\n  \"schemaVersion\": \"1.1.0\""));
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        let result = load_history(&path).await;
        assert!(matches!(result, Err(CycleError::SchemaValidation(_))));
    }

    #[tokio::test]
    async fn test_load_rejects_missing_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut value = serde_json::to_value(history()).unwrap();
        value.as_object_mut().unwrap().remove("sessionId");
        tokio::fs::write(&path, value.to_string()).await.unwrap();
        let err = load_history(&path).await.unwrap_err();
        assert!(err.to_string().contains("sessionId"));
    }

    #[tokio::test]
    async fn test_load_rejects_wrong_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut value = serde_json::to_value(history()).unwrap();
        value["schemaVersion"] = serde_json::json!("2.0.0");
        tokio::fs::write(&path, value.to_string()).await.unwrap();
        let err = load_history(&path).await.unwrap_err();
        assert!(err.to_string().contains("2.0.0"));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_history(&dir.path().join("absent.json")).await;
        assert!(matches!(result, Err(CycleError::FileRead { .. })));
    }

    #[tokio::test]
    async fn test_writer_orders_overlapping_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let writer = SessionWriter::spawn();

        let mut first = history();
        first.total_cost = 1.0;
        let mut second = first.clone();
        second.total_cost = 2.0;

        writer.enqueue(first, path.clone(), None);
        writer.write_and_wait(second, path.clone()).await.unwrap();

        let loaded = load_history(&path).await.unwrap();
        assert!((loaded.total_cost - 2.0).abs() < f64::EPSILON);
    }
}
