// src/history/mod.rs — Improvement history and session management
//
// `ImprovementHistory` is the schema-versioned record persisted to disk.
// `ImprovementSession` is its exclusive in-memory owner: all mutation goes
// through `add_round`/`complete`, guarded against re-entrant use, with
// best-effort auto-save after every mutation.

pub mod persist;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::cost::RoundCost;
use crate::infra::errors::{CycleError, Result};
use crate::prompt::serialize::{serialize_prompt, PromptRecord};
use crate::prompt::AgentPrompt;
use self::persist::SessionWriter;

/// Pinned on save; loads require an exact match.
pub const SCHEMA_VERSION: &str = "1.1.0";

/// One completed round as persisted. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundRecord {
    pub round: u32,
    pub completed_at: DateTime<Utc>,
    pub avg_score: f64,
    pub passed: u32,
    pub failed: u32,
    pub total_tests: u32,
    pub suggestions_generated: u32,
    pub suggestions_approved: u32,
    /// The prompt as it was *before* this round's suggestions were applied.
    /// Rollback targets restore from here.
    pub prompt_snapshot: PromptRecord,
    pub prompt_version_after: String,
    pub cost: RoundCost,
    /// `None` only for the first round of a session.
    pub score_delta: Option<f64>,
}

/// The full persisted run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImprovementHistory {
    pub schema_version: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub initial_prompt: PromptRecord,
    pub current_prompt: PromptRecord,
    pub rounds: Vec<RoundRecord>,
    pub total_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
}

impl ImprovementHistory {
    pub fn new(initial_prompt: PromptRecord) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.into(),
            session_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            current_prompt: initial_prompt.clone(),
            initial_prompt,
            rounds: Vec::new(),
            total_cost: 0.0,
            completed_at: None,
            termination_reason: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Callback invoked when a background auto-save fails.
pub type SaveErrorHandler = dyn Fn(&CycleError) + Send + Sync;

#[derive(Default, Clone)]
pub struct SessionOptions {
    /// When set, every mutation triggers a background save to this path.
    pub auto_save_path: Option<PathBuf>,
    /// Auto-save failures are delivered here; defaults to a `tracing::warn!`.
    pub on_save_error: Option<Arc<SaveErrorHandler>>,
}

/// Live owner of an [`ImprovementHistory`].
pub struct ImprovementSession {
    history: Mutex<ImprovementHistory>,
    writer: SessionWriter,
    options: SessionOptions,
}

impl ImprovementSession {
    fn with_history(history: ImprovementHistory, options: SessionOptions) -> Self {
        Self {
            history: Mutex::new(history),
            writer: SessionWriter::spawn(),
            options,
        }
    }

    /// Non-blocking lock for mutation: a held guard means another mutation
    /// is already in flight on this session.
    fn lock_for_mutation(&self, op: &str) -> Result<MutexGuard<'_, ImprovementHistory>> {
        self.history.try_lock().map_err(|_| {
            CycleError::ConcurrentModification(format!(
                "{op} invoked while another session mutation is in flight"
            ))
        })
    }

    fn read(&self) -> MutexGuard<'_, ImprovementHistory> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn session_id(&self) -> String {
        self.read().session_id.clone()
    }

    pub fn rounds_completed(&self) -> u32 {
        self.read().rounds.len() as u32
    }

    pub fn is_completed(&self) -> bool {
        self.read().is_completed()
    }

    pub fn total_cost(&self) -> f64 {
        self.read().total_cost
    }

    pub fn history_path(&self) -> Option<PathBuf> {
        self.options.auto_save_path.clone()
    }

    /// Cloned view of the current history.
    pub fn snapshot(&self) -> ImprovementHistory {
        self.read().clone()
    }

    /// Append a completed round and advance `current_prompt`.
    pub fn add_round(&self, record: RoundRecord, updated_snapshot: PromptRecord) -> Result<()> {
        let snapshot = {
            let mut history = self.lock_for_mutation("add_round")?;
            if history.is_completed() {
                return Err(CycleError::InvalidConfig(format!(
                    "cannot add round {} to a completed session",
                    record.round
                )));
            }
            history.total_cost += record.cost.total;
            history.current_prompt = updated_snapshot;
            history.rounds.push(record);
            history.clone()
        };
        self.auto_save(snapshot);
        Ok(())
    }

    /// Mark the session complete. Terminal for appends; the file can still
    /// be resumed later.
    pub fn complete(&self, reason: impl Into<String>) -> Result<()> {
        let snapshot = {
            let mut history = self.lock_for_mutation("complete")?;
            history.completed_at = Some(Utc::now());
            history.termination_reason = Some(reason.into());
            history.clone()
        };
        self.auto_save(snapshot);
        Ok(())
    }

    /// Fire-and-forget save. Failures are reported through the error
    /// handler (or a log line), never to the mutating caller.
    fn auto_save(&self, snapshot: ImprovementHistory) {
        let Some(path) = self.options.auto_save_path.clone() else {
            return;
        };
        self.writer
            .enqueue(snapshot, path, self.options.on_save_error.clone());
    }

    /// Explicit save to the configured path, awaiting durability.
    pub async fn save(&self) -> Result<()> {
        let path = self.options.auto_save_path.clone().ok_or_else(|| {
            CycleError::InvalidConfig("save requires a configured history path".into())
        })?;
        self.save_to(&path).await
    }

    /// Explicit save to an arbitrary path, awaiting durability.
    pub async fn save_to(&self, path: &std::path::Path) -> Result<()> {
        let snapshot = self.snapshot();
        self.writer.write_and_wait(snapshot, path.to_path_buf()).await
    }

    /// Wait for every pending write (auto-saves included) to land.
    /// A session with no configured path has nothing to flush.
    pub async fn flush(&self) -> Result<()> {
        match self.options.auto_save_path {
            Some(_) => self.save().await,
            None => Ok(()),
        }
    }
}

/// Create a fresh session around an initial prompt.
pub fn create_session(prompt: &AgentPrompt, options: SessionOptions) -> Result<ImprovementSession> {
    let record = serialize_prompt(prompt)?;
    Ok(ImprovementSession::with_history(
        ImprovementHistory::new(record),
        options,
    ))
}

/// Resume a session from a persisted history file. Clears the completion
/// marker so the cycle can append further rounds; round numbering resumes
/// from `rounds.len()`.
pub async fn resume_session(
    path: &std::path::Path,
    mut options: SessionOptions,
) -> Result<ImprovementSession> {
    let mut history = persist::load_history(path).await?;
    history.completed_at = None;
    history.termination_reason = None;
    if options.auto_save_path.is_none() {
        options.auto_save_path = Some(path.to_path_buf());
    }
    Ok(ImprovementSession::with_history(history, options))
}
