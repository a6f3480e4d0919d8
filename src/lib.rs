// src/lib.rs — Library root for promptcycle
//
// Iterative agent-prompt improvement: run a test suite against an agent
// built from the current prompt, score it, collect edit suggestions, apply
// what the caller approves, and decide whether to keep going. The engine
// orchestrates injected collaborators (agent factory, judge, eval suite,
// improver) and persists the whole run as a resumable, schema-versioned
// history file.

pub mod collab;
pub mod core;
pub mod history;
pub mod infra;
pub mod prompt;

pub use crate::collab::{
    Agent, AgentFactory, EvalReport, EvalSuite, Improver, ImproverOutput, Judge, TestCase,
    TestVerdict, TokenUsage,
};
pub use crate::core::cost::{
    compute_round_cost, model_pricing, ModelPricing, PricingConfig, RoundCost,
};
pub use crate::core::cycle::{
    run_improvement_cycle, run_improvement_cycle_auto, CycleConfig, ImprovementCycle,
};
pub use crate::core::termination::{
    all, any, check_condition, check_termination, custom, max_cost, max_rounds, no_improvement,
    no_improvement_with_delta, not, target_score, TerminationCheck, TerminationCondition,
};
pub use crate::core::types::{
    CycleContext, CycleStep, ImprovementCycleResult, RoundDecision, RoundYield, Suggestion,
    SuggestionKind, SuggestionPriority,
};
pub use crate::history::persist::{load_history, save_history};
pub use crate::history::{
    create_session, resume_session, ImprovementHistory, ImprovementSession, RoundRecord,
    SaveErrorHandler, SessionOptions, SCHEMA_VERSION,
};
pub use crate::infra::config::Settings;
pub use crate::infra::errors::CycleError;
pub use crate::prompt::serialize::{deserialize_prompt, serialize_prompt, PromptRecord};
pub use crate::prompt::{bump_version, AgentPrompt, VersionBump};
