pub mod catalog;
pub mod fanout;
pub mod invocation;
pub mod model_map;
pub mod output_parse;
pub mod prompt;
pub mod token_budget;
pub mod types;

pub use catalog::FileAgentCatalog;
pub use fanout::{run_agents, run_verifiers, AgentRunReport, FanoutMode, VerifierOutcome, VerifierStatus};
pub use invocation::{AgentInvoker, InvocationRequest};
pub use model_map::{resolve_model, ModelId, DEFAULT_MODEL};
pub use output_parse::{
    classify_exit, extract_json, extract_primary_output, parse_verification_output,
    validate_schema, Recommendation, VerificationSummary,
};
pub use types::{
    AgentCatalog, AgentDefinition, AgentError, AgentRunner, InvocationOutcome, OutcomeKind,
    RunnerRequest, RunnerOutput,
};
