// src/core/cycle.rs — The improvement cycle state machine
//
// Running → AwaitingDecision → (Running | Completed | Error). The await
// between rounds is the only suspension point: `start()` runs round 1 and
// yields, `advance(decision)` consumes the caller's decision and either
// completes or runs the next round and yields again.

use std::path::PathBuf;
use std::sync::Arc;

use super::cost::PricingConfig;
use super::executor::RoundExecutor;
use super::termination::{check_termination, TerminationCheck, TerminationCondition};
use super::types::{
    CycleContext, CycleStep, ImprovementCycleResult, RoundDecision, RoundYield, Suggestion,
};
use crate::collab::{AgentFactory, EvalSuite, Improver, Judge, TestCase};
use crate::history::{
    create_session, ImprovementSession, RoundRecord, SaveErrorHandler, SessionOptions,
};
use crate::infra::errors::{CycleError, Result};
use crate::prompt::apply::apply_suggestions;
use crate::prompt::serialize::{deserialize_prompt, serialize_prompt, PromptRecord};
use crate::prompt::{bump_version, AgentPrompt, VersionBump};

/// Everything a cycle needs. Collaborators are injected; the engine never
/// owns an LLM client.
pub struct CycleConfig {
    pub prompt: AgentPrompt,
    pub test_cases: Vec<TestCase>,
    /// Evaluated in order with OR semantics after every round.
    pub terminate_when: Vec<TerminationCondition>,
    pub agent_factory: Arc<dyn AgentFactory>,
    pub eval_suite: Arc<dyn EvalSuite>,
    pub judge: Arc<dyn Judge>,
    pub improver: Arc<dyn Improver>,
    pub pricing: Option<PricingConfig>,
    /// Version bump applied when at least one suggestion lands in a round.
    pub bump: Option<VersionBump>,
    /// When set, the session auto-saves here after every round.
    pub history_path: Option<PathBuf>,
    pub on_save_error: Option<Arc<SaveErrorHandler>>,
    /// Resume an existing session instead of starting fresh. The working
    /// prompt is taken from the session's `current_prompt` and round
    /// numbering continues from `rounds.len()`.
    pub session: Option<ImprovementSession>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleState {
    Running,
    AwaitingDecision,
    Completed,
    Error,
}

struct PendingRound {
    record: RoundRecord,
    termination: TerminationCheck,
}

/// The resumable cycle state machine. See [`CycleStep`] for the protocol.
pub struct ImprovementCycle {
    executor: RoundExecutor,
    session: ImprovementSession,
    working_prompt: AgentPrompt,
    test_cases: Vec<TestCase>,
    terminate_when: Vec<TerminationCondition>,
    bump: Option<VersionBump>,
    /// Monotonic across rollbacks; never reset.
    round: u32,
    previous_scores: Vec<f64>,
    state: CycleState,
    pending: Option<PendingRound>,
}

impl ImprovementCycle {
    pub fn new(config: CycleConfig) -> Result<Self> {
        if config.terminate_when.is_empty() {
            return Err(CycleError::InvalidConfig(
                "at least one termination condition is required".into(),
            ));
        }
        if config.test_cases.is_empty() {
            return Err(CycleError::InvalidConfig(
                "at least one test case is required".into(),
            ));
        }

        let (session, working_prompt) = match config.session {
            Some(session) => {
                let prompt = deserialize_prompt(&session.snapshot().current_prompt)?;
                (session, prompt)
            }
            None => {
                let options = SessionOptions {
                    auto_save_path: config.history_path.clone(),
                    on_save_error: config.on_save_error.clone(),
                };
                (create_session(&config.prompt, options)?, config.prompt)
            }
        };

        let snapshot = session.snapshot();
        let round = snapshot.rounds.len() as u32;
        let previous_scores = snapshot.rounds.iter().map(|r| r.avg_score).collect();

        Ok(Self {
            executor: RoundExecutor::new(
                config.agent_factory,
                config.eval_suite,
                config.judge,
                config.improver,
                config.pricing,
            ),
            session,
            working_prompt,
            test_cases: config.test_cases,
            terminate_when: config.terminate_when,
            bump: config.bump,
            round,
            previous_scores,
            state: CycleState::Running,
            pending: None,
        })
    }

    pub fn session_id(&self) -> String {
        self.session.session_id()
    }

    /// Run the first round. Must be called exactly once, before `advance`.
    pub async fn start(&mut self) -> Result<CycleStep> {
        if self.state != CycleState::Running || self.pending.is_some() {
            return Err(CycleError::InvalidConfig(
                "cycle already started; use advance()".into(),
            ));
        }
        self.run_round().await
    }

    /// Consume a decision for the pending round and either complete the
    /// cycle or run the next round.
    pub async fn advance(&mut self, decision: RoundDecision) -> Result<CycleStep> {
        match self.state {
            CycleState::Completed => {
                return Err(CycleError::InvalidConfig("cycle already completed".into()))
            }
            CycleState::Error => {
                return Err(CycleError::InvalidConfig(
                    "cycle cannot be advanced after an error".into(),
                ))
            }
            CycleState::Running => {
                return Err(CycleError::InvalidConfig(
                    "no round is awaiting a decision".into(),
                ))
            }
            CycleState::AwaitingDecision => {}
        }
        let pending = self
            .pending
            .take()
            .ok_or_else(|| CycleError::InvalidConfig("no round is awaiting a decision".into()))?;

        match decision {
            RoundDecision::Stop => self.finish(pending).await,
            RoundDecision::Continue { approved } => self.continue_round(pending, approved).await,
            RoundDecision::Rollback { to_round } => self.rollback(pending, to_round).await,
        }
    }

    async fn finish(&mut self, pending: PendingRound) -> Result<CycleStep> {
        let snapshot = serialize_prompt(&self.working_prompt)?;
        self.persist_round(pending.record, snapshot)?;

        let reason = if pending.termination.should_stop {
            pending.termination.reason
        } else {
            "User requested stop".to_string()
        };
        tracing::info!(round = self.round, %reason, "cycle complete");
        self.session.complete(reason.clone())?;
        self.session.flush().await?;
        self.state = CycleState::Completed;
        Ok(CycleStep::Complete(self.final_result(reason)))
    }

    async fn continue_round(
        &mut self,
        pending: PendingRound,
        approved: Vec<Suggestion>,
    ) -> Result<CycleStep> {
        let mut record = pending.record;
        record.suggestions_approved = approved.len() as u32;

        let outcome = match apply_suggestions(&mut self.working_prompt, &approved) {
            Ok(outcome) => outcome,
            Err(e) => return self.fail(e).await,
        };
        for skipped in &outcome.skipped {
            tracing::debug!(
                reason = %skipped.reason,
                kind = ?skipped.suggestion.kind,
                "suggestion skipped"
            );
        }

        if !outcome.applied.is_empty() {
            if let Some(bump) = self.bump {
                self.working_prompt.version =
                    match bump_version(&self.working_prompt.version, bump) {
                        Ok(version) => version,
                        Err(e) => return self.fail(e).await,
                    };
            }
        }
        record.prompt_version_after = self.working_prompt.version.clone();

        tracing::info!(
            round = record.round,
            applied = outcome.applied.len(),
            skipped = outcome.skipped.len(),
            version = %self.working_prompt.version,
            "suggestions applied"
        );

        let snapshot = serialize_prompt(&self.working_prompt)?;
        self.persist_round(record, snapshot)?;
        self.state = CycleState::Running;
        self.run_round().await
    }

    async fn rollback(&mut self, pending: PendingRound, to_round: u32) -> Result<CycleStep> {
        let completed = self.session.rounds_completed();
        if to_round < 1 || to_round > completed {
            // Invalid target: keep the pending round so the caller can
            // retry with a different decision.
            let err = CycleError::InvalidConfig(format!(
                "rollback round {to_round} not found (completed rounds: 1..={completed})"
            ));
            self.pending = Some(pending);
            return Err(err);
        }

        let target = self.session.snapshot().rounds[(to_round - 1) as usize]
            .prompt_snapshot
            .clone();

        // The interrupted round still enters the audit trail; the round
        // counter keeps incrementing past it.
        self.persist_round(pending.record, target.clone())?;

        self.working_prompt = deserialize_prompt(&target)?;
        self.previous_scores.truncate((to_round - 1) as usize);

        tracing::info!(
            to_round,
            version = %self.working_prompt.version,
            "rolled back to pre-change snapshot"
        );

        self.state = CycleState::Running;
        self.run_round().await
    }

    async fn run_round(&mut self) -> Result<CycleStep> {
        self.round += 1;
        let last_score = self.previous_scores.last().copied();

        tracing::info!(round = self.round, "executing round");
        let outcome = match self
            .executor
            .execute_round(&self.working_prompt, &self.test_cases, self.round, last_score)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return self.fail(e).await,
        };

        let context = self.build_context(&outcome.record);
        let termination = check_termination(&self.terminate_when, &context);

        // Yielded suggestions are pending: approval is the caller's call.
        let pending_suggestions: Vec<Suggestion> = outcome
            .suggestions
            .into_iter()
            .map(|mut s| {
                s.approved = false;
                s
            })
            .collect();

        self.pending = Some(PendingRound {
            record: outcome.record.clone(),
            termination: termination.clone(),
        });
        self.state = CycleState::AwaitingDecision;

        Ok(CycleStep::AwaitingDecision(Box::new(RoundYield {
            round_result: outcome.record,
            pending_suggestions,
            termination,
            context,
        })))
    }

    /// Close the record, then propagate. Every terminated run, success or
    /// failure, gets a completion entry in its history.
    async fn fail(&mut self, error: CycleError) -> Result<CycleStep> {
        self.state = CycleState::Error;
        if let Err(complete_err) = self.session.complete(format!("Error: {error}")) {
            tracing::warn!("could not record error completion: {complete_err}");
        }
        if let Err(flush_err) = self.session.flush().await {
            tracing::warn!("could not flush history after error: {flush_err}");
        }
        Err(error)
    }

    /// Context for termination checks: the pending round counts as history,
    /// its cost counts toward the total.
    fn build_context(&self, pending_record: &RoundRecord) -> CycleContext {
        let snapshot = self.session.snapshot();
        let mut history = snapshot.rounds;
        history.push(pending_record.clone());
        CycleContext {
            current_round: self.round,
            latest_score: Some(pending_record.avg_score),
            previous_scores: self.previous_scores.clone(),
            total_cost: snapshot.total_cost + pending_record.cost.total,
            history,
        }
    }

    fn persist_round(&mut self, record: RoundRecord, updated_snapshot: PromptRecord) -> Result<()> {
        let score = record.avg_score;
        self.session.add_round(record, updated_snapshot)?;
        self.previous_scores.push(score);
        Ok(())
    }

    fn final_result(&self, termination_reason: String) -> ImprovementCycleResult {
        ImprovementCycleResult {
            session_id: self.session.session_id(),
            rounds_completed: self.session.rounds_completed(),
            final_score: self.previous_scores.last().copied(),
            total_cost: self.session.total_cost(),
            termination_reason,
            final_prompt: self.working_prompt.clone(),
            history_path: self.session.history_path(),
        }
    }
}

/// Build a cycle for human-in-the-loop driving.
pub fn run_improvement_cycle(config: CycleConfig) -> Result<ImprovementCycle> {
    ImprovementCycle::new(config)
}

/// Fully automatic driver: stop when a condition matches, otherwise approve
/// every suggestion and continue. The decision point is the only seam
/// between this and interactive review.
pub async fn run_improvement_cycle_auto(config: CycleConfig) -> Result<ImprovementCycleResult> {
    let mut cycle = ImprovementCycle::new(config)?;
    let mut step = cycle.start().await?;
    loop {
        match step {
            CycleStep::Complete(result) => return Ok(result),
            CycleStep::AwaitingDecision(round) => {
                step = if round.termination.should_stop {
                    cycle.advance(RoundDecision::Stop).await?
                } else {
                    let approved = round
                        .pending_suggestions
                        .into_iter()
                        .map(|mut s| {
                            s.approved = true;
                            s
                        })
                        .collect();
                    cycle.advance(RoundDecision::Continue { approved }).await?
                };
            }
        }
    }
}
