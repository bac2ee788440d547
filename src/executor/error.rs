use crate::shared::errors::ErrorCode;
use crate::state::model::Phase;
use crate::state::store::StateStoreError;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("workflow definition `{name}` has no phases")]
    EmptyDefinition { name: String },
    #[error("workflow `{workflow_id}` is in phase `{phase}` but the definition has no such phase")]
    MissingPhase { workflow_id: String, phase: Phase },
    #[error("no artifact recorded for phase `{phase}` iteration {iteration}")]
    MissingArtifact { phase: Phase, iteration: u32 },
    #[error(transparent)]
    State(#[from] StateStoreError),
}

impl ExecutorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ExecutorError::EmptyDefinition { .. } => {
                ErrorCode::new("WORKFLOW_EMPTY_DEFINITION", 400)
            }
            ExecutorError::MissingPhase { .. } => ErrorCode::new("WORKFLOW_MISSING_PHASE", 400),
            ExecutorError::MissingArtifact { .. } => {
                ErrorCode::new("WORKFLOW_MISSING_ARTIFACT", 400)
            }
            ExecutorError::State(err) => err.code(),
        }
    }
}
