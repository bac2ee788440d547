pub mod model;
pub mod paths;
pub mod store;

pub use model::{
    AgentRunRecord, ArtifactRecord, ArtifactType, CheckpointDecision, CheckpointRecord,
    FeedbackRecord, Phase, StateUpdate, WorkflowState, WorkflowStatus,
};
pub use paths::StatePaths;
pub use store::{StateStoreError, WorkflowStateStore};
