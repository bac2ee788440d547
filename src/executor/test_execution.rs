use crate::agent::invocation::InvocationRequest;
use crate::definition::interpolate::interpolate_outputs;
use crate::definition::model::{TestExecutionPhase, WorkflowDefinition};
use crate::executor::context::build_interpolation_context;
use crate::executor::engine::{StepReport, WorkflowExecutor};
use crate::executor::error::ExecutorError;
use crate::state::model::{ArtifactType, StateUpdate, WorkflowState, WorkflowStatus};
use std::path::{Path, PathBuf};

impl WorkflowExecutor<'_> {
    pub(crate) fn run_tester(
        &self,
        definition: &WorkflowDefinition,
        phase: &TestExecutionPhase,
        state: &WorkflowState,
    ) -> Result<StepReport, ExecutorError> {
        if let Some(max) = phase.max_iterations {
            if state.iteration >= max {
                let state = self.store.update(
                    &state.workflow_id,
                    StateUpdate {
                        status: Some(WorkflowStatus::Complete),
                        clear_checkpoint_message: true,
                        ..StateUpdate::default()
                    },
                )?;
                return Ok(StepReport {
                    message: format!(
                        "Test execution reached max_iterations={max}; workflow is complete."
                    ),
                    state,
                });
            }
        }

        let context = build_interpolation_context(definition, state);
        let outputs = interpolate_outputs(phase.outputs.as_ref(), &context);
        let output_path = outputs
            .as_ref()
            .and_then(|map| map.get("artifact"))
            .map(|template| self.resolve_path(template))
            .unwrap_or_else(|| {
                self.resolve_path(&format!(
                    "{}/test-results/run-{}.md",
                    definition.output_dir, state.iteration
                ))
            });

        let mut context_files = self.existing_context_files(&phase.context, &context);
        // Prior test reports thread into the next run.
        if state.iteration > 1 {
            for record in state.artifacts.iter().filter(|record| {
                record.artifact_type == ArtifactType::TestResult
                    && record.iteration == state.iteration - 1
            }) {
                let path = self.resolve_path(&record.file);
                if path.is_file() && !context_files.contains(&path) {
                    context_files.push(path);
                }
            }
        }

        let prompt = format!(
            "You are `{}`, the tester for workflow `{}`, iteration {}. Execute the test suite \
             described by the context and write a full test report: what ran, what passed, \
             what failed, and exact failure output.",
            phase.tester, state.workflow_id, state.iteration
        );
        let outcome = self.run_recorded(
            state,
            &phase.tester,
            &prompt,
            &context_files,
            &output_path,
        )?;

        if !outcome.success {
            return Ok(StepReport {
                message: format!(
                    "Tester `{}` failed for iteration {}: {}",
                    phase.tester,
                    state.iteration,
                    outcome.error.as_deref().unwrap_or("unknown error")
                ),
                state: self.store.get(&state.workflow_id)?,
            });
        }

        let output_file = output_path.display().to_string();
        self.store.add_artifact(
            &state.workflow_id,
            state.iteration,
            ArtifactType::TestResult,
            &output_file,
            &phase.tester,
        )?;
        self.store.update(
            &state.workflow_id,
            StateUpdate {
                current_artifact: Some(output_file.clone()),
                ..StateUpdate::default()
            },
        )?;
        let message = format!(
            "Test run for iteration {} complete: {output_file}. Decide: approve (workflow \
             complete), iterate (run the fixer), or reject (abort).",
            state.iteration
        );
        let state = self.store.pause_at_checkpoint(&state.workflow_id, &message)?;
        Ok(StepReport { message, state })
    }

    /// Entered when the operator chose `iterate` at a test-execution
    /// checkpoint: the fixer gets the latest test report plus the artifact
    /// under repair.
    pub(crate) fn run_fixer(
        &self,
        definition: &WorkflowDefinition,
        phase: &TestExecutionPhase,
        state: &WorkflowState,
    ) -> Result<StepReport, ExecutorError> {
        let test_result = self
            .store
            .get_latest_artifact_by_type(&state.workflow_id, ArtifactType::TestResult)?
            .ok_or(ExecutorError::MissingArtifact {
                phase: state.phase,
                iteration: state.iteration,
            })?;
        let repair_target = match self
            .store
            .get_latest_artifact_by_type(&state.workflow_id, ArtifactType::Implementation)?
        {
            Some(record) => Some(record),
            None => self
                .store
                .get_latest_artifact_by_type(&state.workflow_id, ArtifactType::Plan)?,
        };

        let mut context_files: Vec<PathBuf> = vec![self.resolve_path(&test_result.file)];
        if let Some(target) = &repair_target {
            let path = self.resolve_path(&target.file);
            if path.is_file() {
                context_files.push(path);
            }
        }

        let output_path = self.resolve_path(&format!(
            "{}/fixes/fix-{}.md",
            definition.output_dir, state.iteration
        ));
        let prompt = format!(
            "You are `{}`, the fixer for workflow `{}`, iteration {}. The context holds the \
             failing test report and the artifact under repair. Describe and apply the \
             corrections that make the failures pass, writing the corrected artifact as your \
             output.",
            phase.fixer, state.workflow_id, state.iteration
        );
        let outcome = self.run_recorded(
            state,
            &phase.fixer,
            &prompt,
            &context_files,
            &output_path,
        )?;

        if !outcome.success {
            let message = format!(
                "Fixer `{}` failed for iteration {}: {}",
                phase.fixer,
                state.iteration,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
            let state = self.store.pause_at_checkpoint(&state.workflow_id, &message)?;
            return Ok(StepReport { message, state });
        }

        self.store.add_artifact(
            &state.workflow_id,
            state.iteration,
            ArtifactType::Implementation,
            &output_path.display().to_string(),
            &phase.fixer,
        )?;
        let state = self.store.update(
            &state.workflow_id,
            StateUpdate {
                iteration: Some(state.iteration + 1),
                status: Some(WorkflowStatus::Working),
                ..StateUpdate::default()
            },
        )?;
        Ok(StepReport {
            message: format!(
                "Fixer `{}` applied corrections; moving to test iteration {}.",
                phase.fixer, state.iteration
            ),
            state,
        })
    }

    /// Single recorded invocation: open the run record, invoke, close it.
    fn run_recorded(
        &self,
        state: &WorkflowState,
        agent: &str,
        prompt: &str,
        context_files: &[PathBuf],
        output_path: &Path,
    ) -> Result<crate::agent::types::InvocationOutcome, ExecutorError> {
        let context_strings: Vec<String> = context_files
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        let run_index = self.store.record_agent_run(
            &state.workflow_id,
            agent,
            state.iteration,
            &context_strings,
            &output_path.display().to_string(),
        )?;
        let outcome = self.invoker.invoke(&InvocationRequest {
            agent,
            prompt,
            context_files,
            output_path,
            session_id: None,
            model_override: None,
            extra_args: &[],
        });
        self.store.complete_agent_run(
            &state.workflow_id,
            run_index,
            outcome.success,
            outcome.error.as_deref(),
        )?;
        Ok(outcome)
    }
}
