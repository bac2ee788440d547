use crate::shared::errors::ErrorCode;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent {agent} not found")]
    AgentNotFound { agent: String },
    #[error("unknown model `{model}`; expected one of: claude-opus-4-5, claude-sonnet-4-5, gpt-5-2-codex")]
    UnknownModel { model: String },
    #[error("prompt estimated at {estimated_tokens} tokens exceeds {limit} token limit for {model}")]
    TokenBudgetExceeded {
        estimated_tokens: u64,
        limit: u64,
        model: String,
    },
    #[error("agent `{agent}` execution failed after {execution_time_ms}ms: {reason}")]
    ExecutionFailed {
        agent: String,
        reason: String,
        execution_time_ms: u64,
    },
    #[error("agent `{agent}` timed out after {execution_time_ms}ms")]
    Timeout {
        agent: String,
        execution_time_ms: u64,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl AgentError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AgentError::AgentNotFound { .. } => ErrorCode::new("NOT_FOUND_AGENT", 404),
            AgentError::UnknownModel { .. } => ErrorCode::new("VALIDATION_MODEL", 400),
            AgentError::TokenBudgetExceeded { .. } => {
                ErrorCode::new("TOKEN_BUDGET_EXCEEDED", 400)
            }
            AgentError::ExecutionFailed { .. } => {
                ErrorCode::new("AGENT_EXECUTION_FAILED", 500)
            }
            AgentError::Timeout { .. } => ErrorCode::new("AGENT_EXECUTION_TIMEOUT", 500),
            AgentError::Io { .. } => ErrorCode::new("STORAGE_WRITE_FAILED", 500),
        }
    }
}

/// An agent description: `content` is a Markdown document used verbatim as
/// the agent system prompt by the runner; `model` is a logical model id.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    pub model: Option<String>,
    pub content: String,
    pub file_path: PathBuf,
    pub last_modified: Option<String>,
}

/// External agent definition store.
pub trait AgentCatalog: Send + Sync {
    fn list_agents(&self) -> Vec<AgentDefinition>;
    fn get_agent(&self, name: &str) -> Option<AgentDefinition>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerRequest {
    pub agent: String,
    pub prompt: String,
    pub cwd: PathBuf,
    pub extra_args: Vec<String>,
    /// API model name, already resolved through the model map.
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub execution_time_ms: u64,
    pub has_result: bool,
    pub result_json: Option<serde_json::Value>,
}

/// External process that actually launches an agent binary. The core never
/// spawns anything itself; a timeout surfaces as exit 124 and SIGTERM as
/// exit 143 in the returned output.
pub trait AgentRunner: Send + Sync {
    fn execute(&self, request: &RunnerRequest) -> Result<RunnerOutput, AgentError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    /// Timed out (exit 124) but still produced a result.
    Partial,
    /// The agent itself reported failure (`is_error: true` in its envelope).
    AgentError,
    /// The process failed without a usable result.
    ProcessError,
}

/// Per-invocation result. The pipeline never propagates agent-level
/// failures as errors; they land here so a fan-out can record partial
/// failures without aborting. `error_code` keeps the failure's machine
/// taxonomy (`NOT_FOUND_AGENT`, `AGENT_EXECUTION_TIMEOUT`, …) so the
/// operation surface reports the right class instead of a blanket 500.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOutcome {
    pub agent: String,
    pub kind: OutcomeKind,
    pub success: bool,
    pub stdout: Option<String>,
    pub output_file: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub warning: Option<String>,
}

impl InvocationOutcome {
    pub fn failure(agent: &str, kind: OutcomeKind, error: String) -> Self {
        Self {
            agent: agent.to_string(),
            kind,
            success: false,
            stdout: None,
            output_file: None,
            error: Some(error),
            error_code: None,
            warning: None,
        }
    }

    /// Failure carrying both the human message and the machine code of a
    /// typed agent error.
    pub fn from_agent_error(agent: &str, kind: OutcomeKind, error: &AgentError) -> Self {
        Self {
            error_code: Some(error.code()),
            ..Self::failure(agent, kind, error.to_string())
        }
    }
}
