// src/collab/mod.rs — Collaborator interfaces
//
// The cycle engine never calls a language model itself. Agent execution,
// judging, and suggestion generation are injected through these traits and
// consumed as `Arc<dyn …>` instances owned by the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::types::Suggestion;
use crate::prompt::AgentPrompt;

/// Token counts for one collaborator call (or an aggregate of calls).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A single test case in the evaluation suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub input: serde_json::Value,
    pub expected: Option<String>,
}

impl TestCase {
    pub fn new(id: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            input,
            expected: None,
        }
    }
}

/// Judge verdict for one test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestVerdict {
    pub test_id: String,
    /// 0-100 scale.
    pub score: f64,
    pub passed: bool,
    pub feedback: Option<String>,
}

/// Report produced by one full run of the evaluation suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    /// Average score across all verdicts, 0-100.
    pub avg_score: f64,
    pub passed: u32,
    pub failed: u32,
    pub total_tests: u32,
    pub verdicts: Vec<TestVerdict>,
    pub agent_usage: TokenUsage,
    pub judge_usage: TokenUsage,
}

/// Suggestions plus the tokens spent generating them.
#[derive(Debug, Clone)]
pub struct ImproverOutput {
    pub suggestions: Vec<Suggestion>,
    pub usage: TokenUsage,
}

/// An agent instance built from a prompt. Opaque to the engine: only the
/// eval suite interacts with it.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Execute the agent against one rendered input.
    async fn execute(&self, input: &str) -> anyhow::Result<String>;
}

/// Builds an agent from the current prompt at the start of each round.
pub trait AgentFactory: Send + Sync {
    fn build(&self, prompt: &AgentPrompt) -> anyhow::Result<Arc<dyn Agent>>;
}

/// Scores one agent output against its test case.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, test: &TestCase, output: &str) -> anyhow::Result<TestVerdict>;
}

/// Runs the full test suite against an agent and aggregates verdicts.
/// Parallelism across test cases, if any, lives here, not in the engine.
#[async_trait]
pub trait EvalSuite: Send + Sync {
    async fn run(
        &self,
        agent: Arc<dyn Agent>,
        judge: Arc<dyn Judge>,
        test_cases: &[TestCase],
    ) -> anyhow::Result<EvalReport>;
}

/// Generates edit suggestions from an evaluation report.
#[async_trait]
pub trait Improver: Send + Sync {
    async fn suggest(
        &self,
        prompt: &AgentPrompt,
        report: &EvalReport,
    ) -> anyhow::Result<ImproverOutput>;
}
