use crate::agent::invocation::InvocationRequest;
use crate::definition::interpolate::interpolate_outputs;
use crate::definition::model::{IterativePhase, WorkflowDefinition};
use crate::executor::context::build_interpolation_context;
use crate::executor::engine::{FanBranch, StepReport, WorkflowExecutor};
use crate::executor::error::ExecutorError;
use crate::shared::logging::log_warn;
use crate::state::model::{
    ArtifactRecord, ArtifactType, StateUpdate, WorkflowState, WorkflowStatus,
};

impl WorkflowExecutor<'_> {
    pub(crate) fn run_creator(
        &self,
        definition: &WorkflowDefinition,
        phase: &IterativePhase,
        state: &WorkflowState,
    ) -> Result<StepReport, ExecutorError> {
        let context = build_interpolation_context(definition, state);
        let outputs = interpolate_outputs(phase.outputs.as_ref(), &context);
        let artifact_path = outputs
            .as_ref()
            .and_then(|map| map.get("artifact"))
            .map(|template| self.resolve_path(template))
            .unwrap_or_else(|| {
                self.resolve_path(&format!(
                    "{}/{}/{}-v{}.md",
                    definition.output_dir,
                    phase.id.as_str(),
                    phase.id.as_str(),
                    state.iteration
                ))
            });

        let mut context_files = self.existing_context_files(&phase.context, &context);
        if let Some(current) = &state.current_artifact {
            let path = self.resolve_path(current);
            if path.is_file() && !context_files.contains(&path) {
                context_files.insert(0, path);
            }
        }

        // Iteration N automatically receives iteration N-1's feedback.
        let mut consumed = Vec::new();
        if state.iteration > 1 {
            let prior = self
                .store
                .get_unaddressed_feedback(&state.workflow_id, Some(state.iteration - 1))?;
            for record in prior {
                let path = self.resolve_path(&record.feedback_file);
                if record.feedback_file.is_empty() || !path.is_file() {
                    continue;
                }
                context_files.push(path);
                consumed.push((record.iteration, record.reviewer));
            }
        }

        let prompt = format!(
            "You are `{}`, the creator for the {} phase of workflow `{}`, iteration {}.\n\
             Produce the complete {} artifact for this iteration. Where feedback from the \
             previous iteration appears in the context, address it explicitly.",
            phase.creator, phase.id, state.workflow_id, state.iteration, phase.id
        );

        let context_strings: Vec<String> = context_files
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        let artifact_file = artifact_path.display().to_string();
        let run_index = self.store.record_agent_run(
            &state.workflow_id,
            &phase.creator,
            state.iteration,
            &context_strings,
            &artifact_file,
        )?;
        let outcome = self.invoker.invoke(&InvocationRequest {
            agent: &phase.creator,
            prompt: &prompt,
            context_files: &context_files,
            output_path: &artifact_path,
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

        if !outcome.success {
            let message = format!(
                "Creator `{}` failed for {} iteration {}: {}",
                phase.creator,
                phase.id,
                state.iteration,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
            return Ok(StepReport {
                message,
                state: self.store.get(&state.workflow_id)?,
            });
        }

        self.store.add_artifact(
            &state.workflow_id,
            state.iteration,
            ArtifactType::Plan,
            &artifact_file,
            &phase.creator,
        )?;
        self.store.update(
            &state.workflow_id,
            StateUpdate {
                current_artifact: Some(artifact_file.clone()),
                ..StateUpdate::default()
            },
        )?;
        for (iteration, reviewer) in consumed {
            self.store
                .mark_feedback_addressed(&state.workflow_id, iteration, &reviewer)?;
        }

        let message = phase.checkpoint_message.clone().unwrap_or_else(|| {
            format!(
                "Review {} iteration {} artifact at {artifact_file}. Decide: continue (send \
                 to reviewers), iterate (revise with feedback), approve, or reject.",
                phase.id, state.iteration
            )
        });
        let state = self.store.pause_at_checkpoint(&state.workflow_id, &message)?;
        Ok(StepReport { message, state })
    }

    pub(crate) fn run_reviewers(
        &self,
        definition: &WorkflowDefinition,
        phase: &IterativePhase,
        state: &WorkflowState,
    ) -> Result<StepReport, ExecutorError> {
        let context = build_interpolation_context(definition, state);
        let outputs = interpolate_outputs(phase.outputs.as_ref(), &context);
        let artifact = latest_artifact(state, |_| true).ok_or(ExecutorError::MissingArtifact {
            phase: state.phase,
            iteration: state.iteration,
        })?;
        let artifact_path = self.resolve_path(&artifact.file);
        let reviews_dir = outputs
            .as_ref()
            .and_then(|map| map.get("reviews"))
            .map(|template| self.resolve_path(template))
            .unwrap_or_else(|| {
                self.resolve_path(&format!(
                    "{}/{}/reviews",
                    definition.output_dir,
                    phase.id.as_str()
                ))
            });

        let mut branches = Vec::with_capacity(phase.reviewers.len());
        for reviewer in &phase.reviewers {
            let output_path = reviews_dir.join(format!("{reviewer}-v{}.md", state.iteration));
            let run_index = self.store.record_agent_run(
                &state.workflow_id,
                reviewer,
                state.iteration,
                &[artifact_path.display().to_string()],
                &output_path.display().to_string(),
            )?;
            branches.push(FanBranch {
                agent: reviewer.clone(),
                prompt: format!(
                    "You are `{reviewer}`, reviewing the {} artifact for iteration {} of \
                     workflow `{}`. Critique the attached artifact from your specialty. List \
                     findings as bullet points tagged [critical], [major], [minor], or [info], \
                     and finish with a line `Recommendation: approve|iterate|reject`.",
                    phase.id, state.iteration, state.workflow_id
                ),
                context_files: vec![artifact_path.clone()],
                output_path,
                run_index,
            });
        }

        let outcomes = self.fan_out(&branches);
        let mut succeeded = 0usize;
        for (branch, outcome) in branches.iter().zip(&outcomes) {
            self.store.complete_agent_run(
                &state.workflow_id,
                branch.run_index,
                outcome.success,
                outcome.error.as_deref(),
            )?;
            if outcome.success {
                succeeded += 1;
                self.store.add_feedback(
                    &state.workflow_id,
                    state.iteration,
                    &branch.agent,
                    &branch.output_path.display().to_string(),
                )?;
            } else {
                log_warn(
                    "reviewer_failed",
                    &format!(
                        "reviewer `{}` failed for workflow `{}`: {}",
                        branch.agent,
                        state.workflow_id,
                        outcome.error.as_deref().unwrap_or("unknown error")
                    ),
                );
            }
        }

        let state = self
            .store
            .update(&state.workflow_id, StateUpdate::status(WorkflowStatus::Verifying))?;
        Ok(StepReport {
            message: format!(
                "Ran {} reviewers for {} iteration {} ({succeeded} succeeded); verification is \
                 next.",
                branches.len(),
                phase.id,
                state.iteration
            ),
            state,
        })
    }

    pub(crate) fn run_verifiers(
        &self,
        definition: &WorkflowDefinition,
        phase: &IterativePhase,
        state: &WorkflowState,
    ) -> Result<StepReport, ExecutorError> {
        let context = build_interpolation_context(definition, state);
        let outputs = interpolate_outputs(phase.outputs.as_ref(), &context);
        let artifact = latest_artifact(state, |record| {
            record.artifact_type != ArtifactType::Review
        })
        .ok_or(ExecutorError::MissingArtifact {
            phase: state.phase,
            iteration: state.iteration,
        })?;
        let artifact_path = self.resolve_path(&artifact.file);
        let verifications_dir = outputs
            .as_ref()
            .and_then(|map| map.get("verifications"))
            .map(|template| self.resolve_path(template))
            .unwrap_or_else(|| {
                self.resolve_path(&format!(
                    "{}/{}/verifications",
                    definition.output_dir,
                    phase.id.as_str()
                ))
            });

        let mut branches = Vec::with_capacity(phase.verifiers.len());
        for (index, verifier) in phase.verifiers.iter().enumerate() {
            let reviewer = &phase.reviewers[index];
            // Paired by position: verifier i audits reviewer i's feedback
            // for the current iteration, when there is any.
            let feedback = state.feedback_history.iter().find(|record| {
                record.reviewer == *reviewer
                    && record.iteration == state.iteration
                    && !record.addressed
            });
            let mut context_files = vec![artifact_path.clone()];
            let prompt = match feedback {
                Some(record) => {
                    let path = self.resolve_path(&record.feedback_file);
                    if path.is_file() {
                        context_files.push(path);
                    }
                    format!(
                        "You are `{verifier}`, verifying the review by `{reviewer}` of the {} \
                         artifact for iteration {}. Both the artifact and the review are in the \
                         context. Confirm each finding is accurate and flag anything the review \
                         missed. Finish with a line `Recommendation: approve|iterate|reject`.",
                        phase.id, state.iteration
                    )
                }
                None => format!(
                    "You are `{verifier}`, verifying the {} artifact for iteration {}. No \
                     review is available for your pairing; audit the artifact directly. Finish \
                     with a line `Recommendation: approve|iterate|reject`.",
                    phase.id, state.iteration
                ),
            };
            let output_path =
                verifications_dir.join(format!("{verifier}-v{}.md", state.iteration));
            let run_index = self.store.record_agent_run(
                &state.workflow_id,
                verifier,
                state.iteration,
                &context_files
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>(),
                &output_path.display().to_string(),
            )?;
            branches.push(FanBranch {
                agent: verifier.clone(),
                prompt,
                context_files,
                output_path,
                run_index,
            });
        }

        let outcomes = self.fan_out(&branches);
        let mut succeeded = 0usize;
        for (branch, outcome) in branches.iter().zip(&outcomes) {
            self.store.complete_agent_run(
                &state.workflow_id,
                branch.run_index,
                outcome.success,
                outcome.error.as_deref(),
            )?;
            if outcome.success {
                succeeded += 1;
                self.store.add_artifact(
                    &state.workflow_id,
                    state.iteration,
                    ArtifactType::Verification,
                    &branch.output_path.display().to_string(),
                    &branch.agent,
                )?;
            }
        }

        let all_succeeded = succeeded == branches.len();
        self.finish_verification(definition, phase, state, all_succeeded, succeeded, branches.len())
    }

    /// The phase-advance gate: forced by `max_iterations`, earned by all
    /// verifiers succeeding once `min_iterations` is met, otherwise the
    /// operator decides.
    fn finish_verification(
        &self,
        definition: &WorkflowDefinition,
        phase: &IterativePhase,
        state: &WorkflowState,
        all_succeeded: bool,
        succeeded: usize,
        total: usize,
    ) -> Result<StepReport, ExecutorError> {
        if let Some(max) = phase.max_iterations {
            if state.iteration >= max {
                log_warn(
                    "max_iterations_forced",
                    &format!(
                        "workflow `{}` phase {} hit max_iterations={max}; forcing completion",
                        state.workflow_id, phase.id
                    ),
                );
                return self.advance_phase(definition, state, &format!(
                    "Phase {} hit its max of {max} iterations; forcing completion.",
                    phase.id
                ));
            }
        }

        if all_succeeded && state.iteration >= phase.min_iterations {
            return self.advance_phase(
                definition,
                state,
                &format!(
                    "All {total} verifiers succeeded for {} iteration {}.",
                    phase.id, state.iteration
                ),
            );
        }

        let message = format!(
            "Verification for {} iteration {} finished with {succeeded}/{total} verifiers \
             succeeding (min_iterations {}). Decide: continue (re-review), iterate (revise \
             with feedback), or approve.",
            phase.id, state.iteration, phase.min_iterations
        );
        let state = self.store.pause_at_checkpoint(&state.workflow_id, &message)?;
        Ok(StepReport { message, state })
    }

    /// Move to the next phase at iteration 1, or complete the workflow when
    /// this was the last phase.
    pub(crate) fn advance_phase(
        &self,
        definition: &WorkflowDefinition,
        state: &WorkflowState,
        reason: &str,
    ) -> Result<StepReport, ExecutorError> {
        match definition.next_phase(state.phase) {
            Some(next) => {
                let state = self.store.update(
                    &state.workflow_id,
                    StateUpdate {
                        phase: Some(next),
                        iteration: Some(1),
                        status: Some(WorkflowStatus::Working),
                        clear_checkpoint_message: true,
                        ..StateUpdate::default()
                    },
                )?;
                Ok(StepReport {
                    message: format!("{reason} Advanced to phase {next} at iteration 1."),
                    state,
                })
            }
            None => {
                let state = self.store.update(
                    &state.workflow_id,
                    StateUpdate {
                        status: Some(WorkflowStatus::Complete),
                        clear_checkpoint_message: true,
                        ..StateUpdate::default()
                    },
                )?;
                Ok(StepReport {
                    message: format!("{reason} Workflow is complete."),
                    state,
                })
            }
        }
    }
}

/// Latest artifact for the state's current iteration matching `accept`,
/// most recent `created_at` winning, insertion order breaking ties.
fn latest_artifact(
    state: &WorkflowState,
    accept: impl Fn(&ArtifactRecord) -> bool,
) -> Option<&ArtifactRecord> {
    state
        .artifacts
        .iter()
        .enumerate()
        .filter(|(_, record)| record.iteration == state.iteration && accept(record))
        .max_by(|(ia, a), (ib, b)| a.created_at.cmp(&b.created_at).then_with(|| ia.cmp(ib)))
        .map(|(_, record)| record)
}
