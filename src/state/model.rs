use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named workflow stage. The order here is the canonical phase order; a
/// workflow only moves forward along it except through an operator reject
/// with `restart_from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Planning,
    Implementation,
    TestingSetup,
    TestingExecution,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::Implementation => "implementation",
            Phase::TestingSetup => "testing-setup",
            Phase::TestingExecution => "testing-execution",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim() {
            "planning" => Ok(Phase::Planning),
            "implementation" => Ok(Phase::Implementation),
            "testing-setup" => Ok(Phase::TestingSetup),
            "testing-execution" => Ok(Phase::TestingExecution),
            _ => Err(
                "phase must be one of: planning, implementation, testing-setup, testing-execution"
                    .to_string(),
            ),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowStatus {
    Idle,
    Working,
    Reviewing,
    Verifying,
    Checkpoint,
    Complete,
    Rejected,
}

impl WorkflowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Idle => "idle",
            WorkflowStatus::Working => "working",
            WorkflowStatus::Reviewing => "reviewing",
            WorkflowStatus::Verifying => "verifying",
            WorkflowStatus::Checkpoint => "checkpoint",
            WorkflowStatus::Complete => "complete",
            WorkflowStatus::Rejected => "rejected",
        }
    }

    /// Terminal or paused statuses refuse a plain `step`.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Checkpoint | WorkflowStatus::Complete | WorkflowStatus::Rejected
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactType {
    Plan,
    Review,
    Verification,
    Implementation,
    TestResult,
}

impl ArtifactType {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactType::Plan => "plan",
            ArtifactType::Review => "review",
            ArtifactType::Verification => "verification",
            ArtifactType::Implementation => "implementation",
            ArtifactType::TestResult => "test-result",
        }
    }
}

impl std::fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointDecision {
    Continue,
    Iterate,
    Approve,
    Reject,
}

impl CheckpointDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointDecision::Continue => "continue",
            CheckpointDecision::Iterate => "iterate",
            CheckpointDecision::Approve => "approve",
            CheckpointDecision::Reject => "reject",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim() {
            "continue" => Ok(CheckpointDecision::Continue),
            "iterate" => Ok(CheckpointDecision::Iterate),
            "approve" => Ok(CheckpointDecision::Approve),
            "reject" => Ok(CheckpointDecision::Reject),
            _ => Err("decision must be one of: continue, iterate, approve, reject".to_string()),
        }
    }
}

impl std::fmt::Display for CheckpointDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ArtifactRecord {
    pub iteration: u32,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub file: String,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FeedbackRecord {
    pub iteration: u32,
    pub reviewer: String,
    pub feedback_file: String,
    #[serde(default)]
    pub addressed: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CheckpointRecord {
    pub iteration: u32,
    pub decision: CheckpointDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub decided_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AgentRunRecord {
    pub agent: String,
    pub iteration: u32,
    #[serde(default)]
    pub context_files: Vec<String>,
    pub output_file: String,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The persisted authority for one workflow. One JSON document per id under
/// the state directory; the store's cache is an acceleration layer only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkflowState {
    pub workflow_id: String,
    pub phase: Phase,
    pub iteration: u32,
    pub status: WorkflowStatus,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub artifacts: Vec<ArtifactRecord>,
    #[serde(default)]
    pub feedback_history: Vec<FeedbackRecord>,
    #[serde(default)]
    pub checkpoints_passed: Vec<CheckpointRecord>,
    #[serde(default)]
    pub agent_runs: Vec<AgentRunRecord>,
    #[serde(default)]
    pub reviewer_verifier_map: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_artifact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_message: Option<String>,
}

impl WorkflowState {
    pub fn new(workflow_id: &str, phase: Phase, now: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            phase,
            iteration: 1,
            status: WorkflowStatus::Idle,
            created_at: now.to_string(),
            updated_at: now.to_string(),
            artifacts: Vec::new(),
            feedback_history: Vec::new(),
            checkpoints_passed: Vec::new(),
            agent_runs: Vec::new(),
            reviewer_verifier_map: BTreeMap::new(),
            current_artifact: None,
            checkpoint_message: None,
        }
    }
}

/// Partial update applied through `WorkflowStateStore::update`. Fields left
/// `None` keep their current value.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub phase: Option<Phase>,
    pub iteration: Option<u32>,
    pub status: Option<WorkflowStatus>,
    pub current_artifact: Option<String>,
    pub checkpoint_message: Option<String>,
    pub clear_checkpoint_message: bool,
    pub reviewer_verifier_map: Option<BTreeMap<String, String>>,
}

impl StateUpdate {
    pub fn status(status: WorkflowStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply(self, state: &mut WorkflowState) {
        if let Some(phase) = self.phase {
            state.phase = phase;
        }
        if let Some(iteration) = self.iteration {
            state.iteration = iteration;
        }
        if let Some(status) = self.status {
            state.status = status;
        }
        if let Some(current_artifact) = self.current_artifact {
            state.current_artifact = Some(current_artifact);
        }
        if let Some(message) = self.checkpoint_message {
            state.checkpoint_message = Some(message);
        }
        if self.clear_checkpoint_message {
            state.checkpoint_message = None;
        }
        if let Some(map) = self.reviewer_verifier_map {
            state.reviewer_verifier_map = map;
        }
    }
}
