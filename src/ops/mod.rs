pub mod agents;
pub mod args;
pub mod status;
pub mod validate;
pub mod workflow;

use crate::agent::invocation::AgentInvoker;
use crate::agent::types::{AgentCatalog, AgentError, AgentRunner};
use crate::definition::error::DefinitionError;
use crate::executor::engine::WorkflowExecutor;
use crate::executor::error::ExecutorError;
use crate::session::SessionStore;
use crate::shared::errors::{user_message, ErrorCode};
use crate::state::model::WorkflowStatus;
use crate::state::store::{StateStoreError, WorkflowStateStore};
use std::path::Path;

pub use args::{
    ContinueArgs, RejectArgs, RunAgentArgs, RunAgentsArgs, RunVerifiersArgs, StartArgs,
    StatusArgs, StepArgs,
};

/// Everything an operation needs: the base directory, the state store, and
/// the external collaborators.
pub struct OperationContext<'a> {
    pub base: &'a Path,
    pub store: &'a WorkflowStateStore,
    pub catalog: &'a dyn AgentCatalog,
    pub runner: &'a dyn AgentRunner,
    pub sessions: Option<&'a dyn SessionStore>,
}

impl<'a> OperationContext<'a> {
    pub(crate) fn executor(&self) -> WorkflowExecutor<'a> {
        WorkflowExecutor::new(self.store, self.catalog, self.runner, self.sessions, self.base)
    }

    pub(crate) fn invoker(&self) -> AgentInvoker<'a> {
        AgentInvoker::new(self.catalog, self.runner, self.sessions, self.base)
    }
}

/// What every operation hands back to the client: a text body and an error
/// flag, nothing else.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResponse {
    pub text: String,
    pub is_error: bool,
}

impl OperationResponse {
    pub fn ok(text: String) -> Self {
        Self {
            text,
            is_error: false,
        }
    }

    pub fn from_error(error: &OperationError) -> Self {
        Self {
            text: user_message(error.code(), &error.to_string()),
            is_error: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("{0}")]
    Validation(String),
    #[error("workflow `{workflow_id}` is not at a checkpoint (status: {status})")]
    NotAtCheckpoint {
        workflow_id: String,
        status: WorkflowStatus,
    },
    /// An invocation outcome rendered at the boundary, keeping the code the
    /// pipeline attached (missing agent, timeout, budget, …).
    #[error("{message}")]
    Invocation { code: ErrorCode, message: String },
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    State(#[from] StateStoreError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl OperationError {
    pub fn validation(message: impl Into<String>) -> Self {
        OperationError::Validation(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            OperationError::Validation(_) => ErrorCode::new("VALIDATION_ARGUMENT", 400),
            OperationError::NotAtCheckpoint { .. } => {
                ErrorCode::new("WORKFLOW_INVALID_TRANSITION", 400)
            }
            OperationError::Invocation { code, .. } => *code,
            OperationError::Definition(err) => err.code(),
            OperationError::State(err) => err.code(),
            OperationError::Executor(err) => err.code(),
            OperationError::Agent(err) => err.code(),
        }
    }
}

/// Boundary wrapper: operations never leak errors, they render them.
pub(crate) fn respond(result: Result<String, OperationError>) -> OperationResponse {
    match result {
        Ok(text) => OperationResponse::ok(text),
        Err(err) => OperationResponse::from_error(&err),
    }
}
