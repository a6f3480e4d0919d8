// src/core/executor.rs — Round execution
//
// One execute→evaluate→suggest pass. The executor has no side effects of its
// own: everything observable happens inside the injected collaborators, and
// the output is a candidate round record the state machine persists once the
// caller decides what to do with it.

use std::sync::Arc;

use chrono::Utc;

use super::cost::{compute_round_cost, PricingConfig, RoundUsage};
use super::types::Suggestion;
use crate::collab::{AgentFactory, EvalReport, EvalSuite, Improver, Judge, TestCase};
use crate::history::RoundRecord;
use crate::infra::errors::Result;
use crate::prompt::serialize::serialize_prompt;
use crate::prompt::AgentPrompt;

pub struct RoundExecutor {
    agent_factory: Arc<dyn AgentFactory>,
    eval_suite: Arc<dyn EvalSuite>,
    judge: Arc<dyn Judge>,
    improver: Arc<dyn Improver>,
    pricing: Option<PricingConfig>,
}

/// Everything one round produced, before any decision was made about it.
pub struct RoundOutcome {
    /// Candidate record. `suggestions_approved` and `prompt_version_after`
    /// are finalized at decision time.
    pub record: RoundRecord,
    pub report: EvalReport,
    pub suggestions: Vec<Suggestion>,
}

impl RoundExecutor {
    pub fn new(
        agent_factory: Arc<dyn AgentFactory>,
        eval_suite: Arc<dyn EvalSuite>,
        judge: Arc<dyn Judge>,
        improver: Arc<dyn Improver>,
        pricing: Option<PricingConfig>,
    ) -> Self {
        Self {
            agent_factory,
            eval_suite,
            judge,
            improver,
            pricing,
        }
    }

    /// Run one round against the current prompt.
    ///
    /// The prompt is snapshotted *before* any suggestion is applied; rollback
    /// restores from that snapshot.
    pub async fn execute_round(
        &self,
        prompt: &AgentPrompt,
        test_cases: &[TestCase],
        round: u32,
        last_score: Option<f64>,
    ) -> Result<RoundOutcome> {
        let prompt_snapshot = serialize_prompt(prompt)?;

        let agent = self.agent_factory.build(prompt)?;
        let report = self
            .eval_suite
            .run(agent, self.judge.clone(), test_cases)
            .await?;

        tracing::debug!(
            round,
            avg_score = report.avg_score,
            passed = report.passed,
            failed = report.failed,
            "evaluation complete"
        );

        let improver_output = self.improver.suggest(prompt, &report).await?;

        let usage = RoundUsage {
            agent: report.agent_usage,
            judge: report.judge_usage,
            improver: improver_output.usage,
        };
        let cost = compute_round_cost(&usage, self.pricing.as_ref());
        let score_delta = last_score.map(|last| report.avg_score - last);

        let record = RoundRecord {
            round,
            completed_at: Utc::now(),
            avg_score: report.avg_score,
            passed: report.passed,
            failed: report.failed,
            total_tests: report.total_tests,
            suggestions_generated: improver_output.suggestions.len() as u32,
            suggestions_approved: 0,
            prompt_snapshot,
            prompt_version_after: prompt.version.clone(),
            cost,
            score_delta,
        };

        Ok(RoundOutcome {
            record,
            report,
            suggestions: improver_output.suggestions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{Agent, ImproverOutput, TestVerdict, TokenUsage};
    use crate::core::cost::ModelPricing;
    use crate::core::types::SuggestionKind;
    use async_trait::async_trait;

    struct FixedAgent;

    #[async_trait]
    impl Agent for FixedAgent {
        async fn execute(&self, _input: &str) -> anyhow::Result<String> {
            Ok("output".into())
        }
    }

    struct FixedFactory;

    impl AgentFactory for FixedFactory {
        fn build(&self, _prompt: &AgentPrompt) -> anyhow::Result<Arc<dyn Agent>> {
            Ok(Arc::new(FixedAgent))
        }
    }

    struct FixedJudge;

    #[async_trait]
    impl Judge for FixedJudge {
        async fn judge(&self, test: &TestCase, _output: &str) -> anyhow::Result<TestVerdict> {
            Ok(TestVerdict {
                test_id: test.id.clone(),
                score: 80.0,
                passed: true,
                feedback: None,
            })
        }
    }

    struct FixedSuite {
        score: f64,
    }

    #[async_trait]
    impl EvalSuite for FixedSuite {
        async fn run(
            &self,
            _agent: Arc<dyn Agent>,
            _judge: Arc<dyn Judge>,
            test_cases: &[TestCase],
        ) -> anyhow::Result<EvalReport> {
            Ok(EvalReport {
                avg_score: self.score,
                passed: test_cases.len() as u32,
                failed: 0,
                total_tests: test_cases.len() as u32,
                verdicts: vec![],
                agent_usage: TokenUsage {
                    input_tokens: 1_000_000,
                    output_tokens: 0,
                },
                judge_usage: TokenUsage::default(),
            })
        }
    }

    struct FixedImprover;

    #[async_trait]
    impl Improver for FixedImprover {
        async fn suggest(
            &self,
            _prompt: &AgentPrompt,
            _report: &EvalReport,
        ) -> anyhow::Result<ImproverOutput> {
            Ok(ImproverOutput {
                suggestions: vec![Suggestion::new(SuggestionKind::SystemPrompt, "a", "b")],
                usage: TokenUsage {
                    input_tokens: 0,
                    output_tokens: 1_000_000,
                },
            })
        }
    }

    fn executor(pricing: Option<PricingConfig>) -> RoundExecutor {
        RoundExecutor::new(
            Arc::new(FixedFactory),
            Arc::new(FixedSuite { score: 75.0 }),
            Arc::new(FixedJudge),
            Arc::new(FixedImprover),
            pricing,
        )
    }

    fn prompt() -> AgentPrompt {
        AgentPrompt::new("p", "system", "{{ q }}").unwrap()
    }

    fn cases() -> Vec<TestCase> {
        vec![TestCase::new("t1", serde_json::json!({"q": "hi"}))]
    }

    #[tokio::test]
    async fn test_first_round_has_no_delta() {
        let outcome = executor(None)
            .execute_round(&prompt(), &cases(), 1, None)
            .await
            .unwrap();
        assert_eq!(outcome.record.round, 1);
        assert!(outcome.record.score_delta.is_none());
        assert_eq!(outcome.record.suggestions_generated, 1);
    }

    #[tokio::test]
    async fn test_delta_against_last_score() {
        let outcome = executor(None)
            .execute_round(&prompt(), &cases(), 2, Some(70.0))
            .await
            .unwrap();
        assert_eq!(outcome.record.score_delta, Some(5.0));
    }

    #[tokio::test]
    async fn test_cost_zero_without_pricing() {
        let outcome = executor(None)
            .execute_round(&prompt(), &cases(), 1, None)
            .await
            .unwrap();
        assert_eq!(outcome.record.cost.total, 0.0);
    }

    #[tokio::test]
    async fn test_cost_from_pricing() {
        let pricing = PricingConfig::uniform(ModelPricing {
            input_per_mtok: 3.0,
            output_per_mtok: 15.0,
        });
        let outcome = executor(Some(pricing))
            .execute_round(&prompt(), &cases(), 1, None)
            .await
            .unwrap();
        // agent: 1M input × $3; improver: 1M output × $15
        assert!((outcome.record.cost.agent - 3.0).abs() < 1e-9);
        assert!((outcome.record.cost.improver - 15.0).abs() < 1e-9);
        assert!((outcome.record.cost.total - 18.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_snapshot_is_pre_change() {
        let p = prompt();
        let outcome = executor(None)
            .execute_round(&p, &cases(), 1, None)
            .await
            .unwrap();
        assert_eq!(
            outcome.record.prompt_snapshot,
            serialize_prompt(&p).unwrap()
        );
        assert_eq!(outcome.record.prompt_version_after, p.version);
    }
}
