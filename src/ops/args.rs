//! Closed argument records for the operation surface. Every operation takes
//! one of these; validation against the documented limits happens in
//! `validate` before any work starts.

#[derive(Debug, Clone, Default)]
pub struct StartArgs {
    pub definition_file: Option<String>,
    pub use_default: bool,
    pub workflow_id: Option<String>,
    pub input_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StepArgs {
    pub workflow_id: String,
    pub definition_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContinueArgs {
    pub workflow_id: String,
    /// One of `continue`, `iterate`, `approve`; `reject` has its own
    /// operation.
    pub decision: String,
    pub feedback: Option<String>,
    pub next_phase: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RejectArgs {
    pub workflow_id: String,
    pub reason: String,
    pub required_changes: Vec<String>,
    /// A phase name, or `current` for the phase the workflow is in.
    pub restart_from: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StatusArgs {
    pub workflow_id: String,
    pub verbose: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunAgentArgs {
    pub agent: String,
    pub prompt: String,
    pub cwd: Option<String>,
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub extra_args: Vec<String>,
    pub context_files: Vec<String>,
    pub context_globs: Vec<String>,
    pub context_data: Option<serde_json::Value>,
    pub output_file: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RunAgentsArgs {
    pub agents: Vec<String>,
    pub prompt: String,
    pub context_files: Vec<String>,
    pub fail_fast: bool,
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RunVerifiersArgs {
    /// `(reviewer, review_file)` pairs.
    pub reviews: Vec<(String, String)>,
    pub artifact_file: String,
    /// Workflow whose reviewer→verifier overrides apply, when any.
    pub workflow_id: Option<String>,
    pub output_dir: Option<String>,
}
