use crate::agent::invocation::{AgentInvoker, InvocationRequest};
use crate::agent::types::{AgentCatalog, AgentRunner, InvocationOutcome};
use crate::definition::interpolate::{interpolate, InterpolationContext};
use crate::definition::model::{PhaseDefinition, WorkflowDefinition};
use crate::executor::error::ExecutorError;
use crate::session::SessionStore;
use crate::state::model::{StateUpdate, WorkflowState, WorkflowStatus};
use crate::state::store::WorkflowStateStore;
use std::path::{Path, PathBuf};
use std::thread;

/// Outcome of one `execute_step` call: the refreshed state plus an
/// operator-facing description of what happened.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub message: String,
    pub state: WorkflowState,
}

/// The phase state machine. Consumes a definition plus the persisted state,
/// decides the next transition, fans out to the agent pipeline, and records
/// everything through the state store.
pub struct WorkflowExecutor<'a> {
    pub(crate) store: &'a WorkflowStateStore,
    pub(crate) invoker: AgentInvoker<'a>,
    pub(crate) base: PathBuf,
}

impl<'a> WorkflowExecutor<'a> {
    pub fn new(
        store: &'a WorkflowStateStore,
        catalog: &'a dyn AgentCatalog,
        runner: &'a dyn AgentRunner,
        sessions: Option<&'a dyn SessionStore>,
        base: &Path,
    ) -> Self {
        Self {
            store,
            invoker: AgentInvoker::new(catalog, runner, sessions, base),
            base: base.to_path_buf(),
        }
    }

    /// Create state in the definition's first phase and mark it working.
    pub fn start_workflow(
        &self,
        definition: &WorkflowDefinition,
        workflow_id: &str,
        input_file: Option<&str>,
    ) -> Result<WorkflowState, ExecutorError> {
        let first_phase = definition
            .first_phase()
            .ok_or_else(|| ExecutorError::EmptyDefinition {
                name: definition.name.clone(),
            })?;
        self.store.create(workflow_id, first_phase)?;
        let update = StateUpdate {
            status: Some(WorkflowStatus::Working),
            current_artifact: input_file.map(str::to_string),
            ..StateUpdate::default()
        };
        Ok(self.store.update(workflow_id, update)?)
    }

    /// Decide and run the next transition purely from the current state and
    /// the matching phase definition.
    pub fn execute_step(
        &self,
        definition: &WorkflowDefinition,
        workflow_id: &str,
    ) -> Result<StepReport, ExecutorError> {
        let state = self.store.get(workflow_id)?;
        let phase = definition
            .phase(state.phase)
            .ok_or_else(|| ExecutorError::MissingPhase {
                workflow_id: workflow_id.to_string(),
                phase: state.phase,
            })?;

        match phase {
            PhaseDefinition::Iterative(iterative) => match state.status {
                WorkflowStatus::Idle | WorkflowStatus::Working => {
                    self.run_creator(definition, iterative, &state)
                }
                WorkflowStatus::Reviewing => self.run_reviewers(definition, iterative, &state),
                WorkflowStatus::Verifying => self.run_verifiers(definition, iterative, &state),
                WorkflowStatus::Checkpoint => Ok(self.checkpoint_report(&state)),
                WorkflowStatus::Complete => Ok(StepReport {
                    message: format!(
                        "Workflow `{workflow_id}` is complete; nothing left to execute."
                    ),
                    state,
                }),
                WorkflowStatus::Rejected => Ok(StepReport {
                    message: format!(
                        "Workflow `{workflow_id}` was rejected; restart it to continue."
                    ),
                    state,
                }),
            },
            PhaseDefinition::TestExecution(test_phase) => match state.status {
                WorkflowStatus::Idle | WorkflowStatus::Working => {
                    self.run_tester(definition, test_phase, &state)
                }
                WorkflowStatus::Verifying => self.run_fixer(definition, test_phase, &state),
                WorkflowStatus::Checkpoint => Ok(self.checkpoint_report(&state)),
                WorkflowStatus::Complete => Ok(StepReport {
                    message: format!(
                        "Workflow `{workflow_id}` is complete; nothing left to execute."
                    ),
                    state,
                }),
                WorkflowStatus::Rejected => Ok(StepReport {
                    message: format!(
                        "Workflow `{workflow_id}` was rejected; restart it to continue."
                    ),
                    state,
                }),
                WorkflowStatus::Reviewing => Ok(StepReport {
                    message: format!(
                        "Workflow `{workflow_id}` has no review stage in a test-execution phase."
                    ),
                    state,
                }),
            },
        }
    }

    /// A step taken while paused reports the pending decision instead of
    /// acting.
    fn checkpoint_report(&self, state: &WorkflowState) -> StepReport {
        let mut message = state
            .checkpoint_message
            .clone()
            .unwrap_or_else(|| "Workflow is paused at a checkpoint.".to_string());
        let iteration_artifacts: Vec<&str> = state
            .artifacts
            .iter()
            .filter(|record| record.iteration == state.iteration)
            .map(|record| record.file.as_str())
            .collect();
        if !iteration_artifacts.is_empty() {
            message.push_str("\n\nArtifacts this iteration:\n");
            for file in iteration_artifacts {
                message.push_str(&format!("- {file}\n"));
            }
        }
        StepReport {
            message,
            state: state.clone(),
        }
    }

    /// Resolve an output template (or fall back) into an absolute path.
    pub(crate) fn resolve_path(&self, raw: &str) -> PathBuf {
        let candidate = Path::new(raw);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base.join(candidate)
        }
    }

    /// Phase `context` templates, interpolated, resolved, and filtered to
    /// files that currently exist on disk.
    pub(crate) fn existing_context_files(
        &self,
        templates: &[String],
        context: &InterpolationContext,
    ) -> Vec<PathBuf> {
        templates
            .iter()
            .map(|template| self.resolve_path(&interpolate(template, context)))
            .filter(|path| path.is_file())
            .collect()
    }

    /// Fan out one invocation per branch on its own thread and join them
    /// all. Results come back in branch order; the store is only touched by
    /// the caller after this returns.
    pub(crate) fn fan_out(&self, branches: &[FanBranch]) -> Vec<InvocationOutcome> {
        thread::scope(|scope| {
            let handles: Vec<_> = branches
                .iter()
                .map(|branch| {
                    scope.spawn(move || {
                        self.invoker.invoke(&InvocationRequest {
                            agent: &branch.agent,
                            prompt: &branch.prompt,
                            context_files: &branch.context_files,
                            output_path: &branch.output_path,
                            session_id: None,
                            model_override: None,
                            extra_args: &[],
                        })
                    })
                })
                .collect();
            handles
                .into_iter()
                .zip(branches)
                .map(|(handle, branch)| {
                    handle.join().unwrap_or_else(|_| {
                        InvocationOutcome::failure(
                            &branch.agent,
                            crate::agent::types::OutcomeKind::ProcessError,
                            format!("agent `{}` execution thread panicked", branch.agent),
                        )
                    })
                })
                .collect()
        })
    }
}

/// One parallel branch of a review or verification fan-out.
pub(crate) struct FanBranch {
    pub agent: String,
    pub prompt: String,
    pub context_files: Vec<PathBuf>,
    pub output_path: PathBuf,
    pub run_index: usize,
}
