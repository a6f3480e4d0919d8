// src/core/termination.rs — Termination condition algebra
//
// Leaf predicates over the cycle context plus combinators. Composites are
// `Custom` conditions wrapping a closure over their inner conditions, so the
// enum stays closed and dispatch stays an exhaustive match.

use std::fmt;
use std::sync::Arc;

use super::types::CycleContext;
use crate::infra::errors::{CycleError, Result};

pub type CustomCheck = dyn Fn(&CycleContext) -> anyhow::Result<bool> + Send + Sync;

#[derive(Clone)]
pub enum TerminationCondition {
    TargetScore {
        threshold: f64,
    },
    MaxRounds {
        count: u32,
    },
    MaxCost {
        max_usd: f64,
    },
    NoImprovement {
        consecutive_rounds: u32,
        min_delta: f64,
    },
    Custom {
        check: Arc<CustomCheck>,
        description: String,
    },
}

impl fmt::Debug for TerminationCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

impl TerminationCondition {
    pub fn description(&self) -> String {
        match self {
            Self::TargetScore { threshold } => format!("target score >= {threshold}"),
            Self::MaxRounds { count } => format!("max {count} rounds"),
            Self::MaxCost { max_usd } => format!("max cost ${max_usd}"),
            Self::NoImprovement {
                consecutive_rounds,
                min_delta,
            } => format!("no improvement (> {min_delta}) for {consecutive_rounds} rounds"),
            Self::Custom { description, .. } => description.clone(),
        }
    }
}

/// Outcome of evaluating a condition (or a condition list) against a context.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminationCheck {
    pub should_stop: bool,
    pub reason: String,
}

impl TerminationCheck {
    fn stop(reason: impl Into<String>) -> Self {
        Self {
            should_stop: true,
            reason: reason.into(),
        }
    }

    fn keep_going(reason: impl Into<String>) -> Self {
        Self {
            should_stop: false,
            reason: reason.into(),
        }
    }
}

// ─── Leaf constructors ──────────────────────────────────────────

/// Stop once the latest score reaches `threshold` (0-100 scale).
pub fn target_score(threshold: f64) -> Result<TerminationCondition> {
    if !threshold.is_finite() || !(0.0..=100.0).contains(&threshold) {
        return Err(CycleError::InvalidConfig(format!(
            "target_score threshold must be in [0, 100], got {threshold}"
        )));
    }
    Ok(TerminationCondition::TargetScore { threshold })
}

/// Stop once `count` rounds have completed.
pub fn max_rounds(count: u32) -> Result<TerminationCondition> {
    if count < 1 {
        return Err(CycleError::InvalidConfig(
            "max_rounds count must be at least 1".into(),
        ));
    }
    Ok(TerminationCondition::MaxRounds { count })
}

/// Stop once accumulated cost reaches `max_usd`.
pub fn max_cost(max_usd: f64) -> Result<TerminationCondition> {
    if !max_usd.is_finite() || max_usd <= 0.0 {
        return Err(CycleError::InvalidConfig(format!(
            "max_cost must be positive, got {max_usd}"
        )));
    }
    Ok(TerminationCondition::MaxCost { max_usd })
}

/// Stop after `consecutive_rounds` rounds without improvement.
pub fn no_improvement(consecutive_rounds: u32) -> Result<TerminationCondition> {
    no_improvement_with_delta(consecutive_rounds, 0.0)
}

/// Like [`no_improvement`], but a round only counts as improving when its
/// score delta exceeds `min_delta`.
pub fn no_improvement_with_delta(
    consecutive_rounds: u32,
    min_delta: f64,
) -> Result<TerminationCondition> {
    if consecutive_rounds < 1 {
        return Err(CycleError::InvalidConfig(
            "no_improvement consecutive_rounds must be at least 1".into(),
        ));
    }
    if !min_delta.is_finite() || min_delta < 0.0 {
        return Err(CycleError::InvalidConfig(format!(
            "no_improvement min_delta must be >= 0, got {min_delta}"
        )));
    }
    Ok(TerminationCondition::NoImprovement {
        consecutive_rounds,
        min_delta,
    })
}

/// Arbitrary user predicate. A predicate error is treated as "not met":
/// user-supplied checks must never halt the cycle.
pub fn custom<F>(check: F, description: impl Into<String>) -> TerminationCondition
where
    F: Fn(&CycleContext) -> anyhow::Result<bool> + Send + Sync + 'static,
{
    TerminationCondition::Custom {
        check: Arc::new(check),
        description: description.into(),
    }
}

// ─── Combinators ────────────────────────────────────────────────

/// Terminates only when every inner condition terminates.
/// Short-circuits on the first non-terminating one; empty is never met.
pub fn all(conditions: Vec<TerminationCondition>) -> TerminationCondition {
    let description = compose_description("all of", &conditions);
    TerminationCondition::Custom {
        check: Arc::new(move |ctx| {
            if conditions.is_empty() {
                return Ok(false);
            }
            for condition in &conditions {
                if !check_condition(condition, ctx).should_stop {
                    return Ok(false);
                }
            }
            Ok(true)
        }),
        description,
    }
}

/// Terminates when any inner condition terminates.
/// Short-circuits on the first terminating one; empty is never met.
pub fn any(conditions: Vec<TerminationCondition>) -> TerminationCondition {
    let description = compose_description("any of", &conditions);
    TerminationCondition::Custom {
        check: Arc::new(move |ctx| {
            for condition in &conditions {
                if check_condition(condition, ctx).should_stop {
                    return Ok(true);
                }
            }
            Ok(false)
        }),
        description,
    }
}

/// Inverts a condition.
pub fn not(condition: TerminationCondition) -> TerminationCondition {
    let description = format!("not ({})", condition.description());
    TerminationCondition::Custom {
        check: Arc::new(move |ctx| Ok(!check_condition(&condition, ctx).should_stop)),
        description,
    }
}

fn compose_description(label: &str, conditions: &[TerminationCondition]) -> String {
    let inner: Vec<String> = conditions.iter().map(|c| c.description()).collect();
    format!("{label} [{}]", inner.join(", "))
}

// ─── Evaluation ─────────────────────────────────────────────────

/// Evaluate one condition against a context. Pure for leaf conditions;
/// `Custom` purity is up to the caller's closure.
pub fn check_condition(condition: &TerminationCondition, ctx: &CycleContext) -> TerminationCheck {
    match condition {
        TerminationCondition::TargetScore { threshold } => match ctx.latest_score {
            Some(score) if score >= *threshold => TerminationCheck::stop(format!(
                "Target score reached: {score:.1} >= {threshold:.1}"
            )),
            Some(score) => TerminationCheck::keep_going(format!(
                "Score {score:.1} below target {threshold:.1}"
            )),
            None => TerminationCheck::keep_going("No score yet"),
        },

        TerminationCondition::MaxRounds { count } => {
            if ctx.current_round >= *count {
                TerminationCheck::stop(format!(
                    "Maximum rounds reached: {} >= {count}",
                    ctx.current_round
                ))
            } else {
                TerminationCheck::keep_going(format!(
                    "Round {} of {count}",
                    ctx.current_round
                ))
            }
        }

        TerminationCondition::MaxCost { max_usd } => {
            if ctx.total_cost >= *max_usd {
                TerminationCheck::stop(format!(
                    "Maximum cost reached: ${:.4} >= ${max_usd:.4}",
                    ctx.total_cost
                ))
            } else {
                TerminationCheck::keep_going(format!(
                    "Cost ${:.4} under ${max_usd:.4}",
                    ctx.total_cost
                ))
            }
        }

        TerminationCondition::NoImprovement {
            consecutive_rounds,
            min_delta,
        } => {
            // Streak of non-improving rounds ending at the most recent one.
            // A round with no delta (the first ever) or an improving round
            // ends the scan.
            let mut streak: u32 = 0;
            for record in ctx.history.iter().rev() {
                match record.score_delta {
                    Some(delta) if delta <= *min_delta => streak += 1,
                    _ => break,
                }
            }
            if streak >= *consecutive_rounds {
                TerminationCheck::stop(format!(
                    "No improvement for {streak} consecutive rounds"
                ))
            } else {
                TerminationCheck::keep_going(format!(
                    "Non-improving streak {streak} of {consecutive_rounds}"
                ))
            }
        }

        TerminationCondition::Custom { check, description } => match check(ctx) {
            Ok(true) => TerminationCheck::stop(format!("Condition met: {description}")),
            Ok(false) => TerminationCheck::keep_going(format!("Condition not met: {description}")),
            Err(e) => TerminationCheck::keep_going(format!(
                "Condition '{description}' failed ({e}); treated as not met"
            )),
        },
    }
}

/// Evaluate an ordered condition list with OR semantics: the first matching
/// condition's result wins. An empty list is distinguished from "none met".
pub fn check_termination(
    conditions: &[TerminationCondition],
    ctx: &CycleContext,
) -> TerminationCheck {
    if conditions.is_empty() {
        return TerminationCheck::keep_going("No termination conditions specified");
    }
    for condition in conditions {
        let result = check_condition(condition, ctx);
        if result.should_stop {
            return result;
        }
    }
    TerminationCheck::keep_going("No termination conditions met")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cost::RoundCost;
    use crate::history::RoundRecord;
    use crate::prompt::serialize::{serialize_prompt, PromptRecord};
    use crate::prompt::AgentPrompt;

    fn snapshot() -> PromptRecord {
        serialize_prompt(&AgentPrompt::new("p", "sys", "{{ q }}").unwrap()).unwrap()
    }

    fn record(round: u32, score: f64, delta: Option<f64>) -> RoundRecord {
        RoundRecord {
            round,
            completed_at: chrono::Utc::now(),
            avg_score: score,
            passed: 1,
            failed: 0,
            total_tests: 1,
            suggestions_generated: 0,
            suggestions_approved: 0,
            prompt_snapshot: snapshot(),
            prompt_version_after: "1.0.0".into(),
            cost: RoundCost::default(),
            score_delta: delta,
        }
    }

    fn ctx_with_deltas(deltas: &[Option<f64>]) -> CycleContext {
        let mut history = Vec::new();
        let mut score = 50.0;
        for (i, delta) in deltas.iter().enumerate() {
            score += delta.unwrap_or(0.0);
            history.push(record(i as u32 + 1, score, *delta));
        }
        CycleContext {
            current_round: deltas.len() as u32,
            latest_score: history.last().map(|r| r.avg_score),
            previous_scores: history.iter().map(|r| r.avg_score).collect(),
            total_cost: 0.0,
            history,
        }
    }

    // ─── constructor validation ─────────────────────────────────

    #[test]
    fn test_target_score_range() {
        assert!(target_score(0.0).is_ok());
        assert!(target_score(100.0).is_ok());
        assert!(target_score(-0.1).is_err());
        assert!(target_score(100.1).is_err());
        assert!(target_score(f64::NAN).is_err());
    }

    #[test]
    fn test_max_rounds_validation() {
        assert!(max_rounds(1).is_ok());
        assert!(max_rounds(0).is_err());
    }

    #[test]
    fn test_max_cost_validation() {
        assert!(max_cost(0.001).is_ok());
        assert!(max_cost(0.0).is_err());
        assert!(max_cost(-1.0).is_err());
        assert!(max_cost(f64::INFINITY).is_err());
    }

    #[test]
    fn test_no_improvement_validation() {
        assert!(no_improvement(1).is_ok());
        assert!(no_improvement(0).is_err());
        assert!(no_improvement_with_delta(2, -0.5).is_err());
    }

    // ─── leaf conditions ────────────────────────────────────────

    #[test]
    fn test_target_score_met() {
        let cond = target_score(90.0).unwrap();
        let mut ctx = CycleContext {
            latest_score: Some(92.0),
            ..Default::default()
        };
        assert!(check_condition(&cond, &ctx).should_stop);
        ctx.latest_score = Some(89.9);
        assert!(!check_condition(&cond, &ctx).should_stop);
        ctx.latest_score = None;
        assert!(!check_condition(&cond, &ctx).should_stop);
    }

    #[test]
    fn test_max_rounds_reason_mentions_maximum_rounds() {
        let cond = max_rounds(3).unwrap();
        let ctx = CycleContext {
            current_round: 3,
            ..Default::default()
        };
        let result = check_condition(&cond, &ctx);
        assert!(result.should_stop);
        assert!(result.reason.contains("Maximum rounds"));
    }

    #[test]
    fn test_max_cost_met_at_threshold() {
        let cond = max_cost(0.5).unwrap();
        let ctx = CycleContext {
            total_cost: 0.5,
            ..Default::default()
        };
        assert!(check_condition(&cond, &ctx).should_stop);
    }

    #[test]
    fn test_no_improvement_streak() {
        let cond = no_improvement(2).unwrap();
        // round 1 (no delta), then two flat rounds
        let ctx = ctx_with_deltas(&[None, Some(0.0), Some(0.0)]);
        assert!(check_condition(&cond, &ctx).should_stop);
    }

    #[test]
    fn test_no_improvement_reset_by_improving_round() {
        let cond = no_improvement(2).unwrap();
        // flat, flat, improvement, flat: streak ends at 1
        let ctx = ctx_with_deltas(&[None, Some(0.0), Some(0.0), Some(5.0), Some(0.0)]);
        assert!(!check_condition(&cond, &ctx).should_stop);
    }

    #[test]
    fn test_no_improvement_stops_at_first_round() {
        let cond = no_improvement(2).unwrap();
        // only the first round exists; its delta is None
        let ctx = ctx_with_deltas(&[None]);
        assert!(!check_condition(&cond, &ctx).should_stop);
    }

    #[test]
    fn test_no_improvement_with_min_delta() {
        let cond = no_improvement_with_delta(2, 1.0).unwrap();
        // gains of 0.5 don't clear the 1.0 bar
        let ctx = ctx_with_deltas(&[None, Some(0.5), Some(0.5)]);
        assert!(check_condition(&cond, &ctx).should_stop);
    }

    // ─── custom conditions ──────────────────────────────────────

    #[test]
    fn test_custom_condition() {
        let cond = custom(|ctx| Ok(ctx.current_round >= 2), "round at least 2");
        let mut ctx = CycleContext::default();
        assert!(!check_condition(&cond, &ctx).should_stop);
        ctx.current_round = 2;
        let result = check_condition(&cond, &ctx);
        assert!(result.should_stop);
        assert!(result.reason.contains("round at least 2"));
    }

    #[test]
    fn test_custom_error_treated_as_not_met() {
        let cond = custom(|_| anyhow::bail!("boom"), "explosive");
        let result = check_condition(&cond, &CycleContext::default());
        assert!(!result.should_stop);
        assert!(result.reason.contains("boom"));
        assert!(result.reason.contains("not met"));
    }

    // ─── combinators ────────────────────────────────────────────

    #[test]
    fn test_all_requires_every_condition() {
        let ctx = CycleContext {
            current_round: 5,
            latest_score: Some(50.0),
            ..Default::default()
        };
        let both = all(vec![max_rounds(3).unwrap(), target_score(90.0).unwrap()]);
        assert!(!check_condition(&both, &ctx).should_stop);

        let both = all(vec![max_rounds(3).unwrap(), target_score(40.0).unwrap()]);
        assert!(check_condition(&both, &ctx).should_stop);
    }

    #[test]
    fn test_any_short_circuits() {
        let ctx = CycleContext {
            current_round: 5,
            ..Default::default()
        };
        let either = any(vec![target_score(90.0).unwrap(), max_rounds(3).unwrap()]);
        assert!(check_condition(&either, &ctx).should_stop);
    }

    #[test]
    fn test_empty_combinators_never_terminate() {
        let ctx = CycleContext::default();
        assert!(!check_condition(&all(vec![]), &ctx).should_stop);
        assert!(!check_condition(&any(vec![]), &ctx).should_stop);
    }

    #[test]
    fn test_not_inverts() {
        let ctx = CycleContext {
            current_round: 5,
            ..Default::default()
        };
        let inverted = not(max_rounds(3).unwrap());
        assert!(!check_condition(&inverted, &ctx).should_stop);
        let inverted = not(max_rounds(10).unwrap());
        assert!(check_condition(&inverted, &ctx).should_stop);
    }

    #[test]
    fn test_nested_composition() {
        let ctx = CycleContext {
            current_round: 4,
            latest_score: Some(95.0),
            ..Default::default()
        };
        let cond = all(vec![
            any(vec![target_score(90.0).unwrap(), max_rounds(10).unwrap()]),
            not(max_rounds(100).unwrap()),
        ]);
        assert!(check_condition(&cond, &ctx).should_stop);
    }

    // ─── check_termination ──────────────────────────────────────

    #[test]
    fn test_termination_or_semantics_first_match_wins() {
        let ctx = CycleContext {
            current_round: 5,
            latest_score: Some(95.0),
            ..Default::default()
        };
        // Both satisfied; the first listed condition's reason is reported.
        let conditions = vec![target_score(90.0).unwrap(), max_rounds(3).unwrap()];
        let result = check_termination(&conditions, &ctx);
        assert!(result.should_stop);
        assert!(result.reason.contains("Target score"));

        let conditions = vec![max_rounds(3).unwrap(), target_score(90.0).unwrap()];
        let result = check_termination(&conditions, &ctx);
        assert!(result.reason.contains("Maximum rounds"));
    }

    #[test]
    fn test_termination_empty_vs_none_met() {
        let ctx = CycleContext::default();
        let empty = check_termination(&[], &ctx);
        assert!(!empty.should_stop);
        assert!(empty.reason.contains("specified"));

        let none_met = check_termination(&[max_rounds(10).unwrap()], &ctx);
        assert!(!none_met.should_stop);
        assert!(none_met.reason.contains("met"));
    }

    #[test]
    fn test_check_termination_is_pure() {
        let ctx = ctx_with_deltas(&[None, Some(0.0)]);
        let conditions = vec![max_rounds(5).unwrap(), no_improvement(3).unwrap()];
        let a = check_termination(&conditions, &ctx);
        let b = check_termination(&conditions, &ctx);
        assert_eq!(a, b);
    }
}
