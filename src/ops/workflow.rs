use crate::definition::defaults::{default_workflow, write_default_workflow};
use crate::definition::load::load_from_file;
use crate::definition::model::WorkflowDefinition;
use crate::ops::args::{ContinueArgs, RejectArgs, StartArgs, StepArgs};
use crate::ops::validate::{validate_reject_reason, validate_workflow_id};
use crate::ops::{respond, OperationContext, OperationError, OperationResponse};
use crate::shared::ids::{base36_timestamp, now_epoch_ms};
use crate::state::model::{CheckpointDecision, Phase, StateUpdate, WorkflowStatus};
use std::path::Path;

/// Start a new workflow from a definition file or the built-in default.
pub fn start(context: &OperationContext<'_>, args: &StartArgs) -> OperationResponse {
    respond(start_inner(context, args))
}

fn start_inner(
    context: &OperationContext<'_>,
    args: &StartArgs,
) -> Result<String, OperationError> {
    let definition = match (&args.definition_file, args.use_default) {
        (Some(path), _) => load_from_file(Path::new(path))?,
        (None, true) => {
            let written = write_default_workflow(context.base)?;
            let definition = default_workflow();
            crate::shared::logging::log_info(
                "start_default",
                &format!("materialized default workflow at {}", written.display()),
            );
            definition
        }
        (None, false) => {
            return Err(OperationError::validation(
                "start requires either a definition file or the use-default flag",
            ))
        }
    };

    let workflow_id = match &args.workflow_id {
        Some(id) => {
            validate_workflow_id(id)?;
            id.clone()
        }
        None => generated_workflow_id(&definition.name),
    };

    let state = context.executor().start_workflow(
        &definition,
        &workflow_id,
        args.input_file.as_deref(),
    )?;

    let mut text = format!(
        "Started workflow `{workflow_id}` from definition `{}` v{}.\n\nPhases:\n",
        definition.name, definition.version
    );
    for phase in &definition.phases {
        if phase.id() == state.phase {
            text.push_str(&format!("- {} (current)\n", phase.id()));
        } else {
            text.push_str(&format!("- {}\n", phase.id()));
        }
    }
    text.push_str(&format!(
        "\nStatus: {} at iteration {}. Run `step` to execute the first agent.",
        state.status, state.iteration
    ));
    Ok(text)
}

fn generated_workflow_id(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '-'
            }
        })
        .collect();
    format!("{sanitized}-{}", base36_timestamp(now_epoch_ms()))
}

/// Execute the next transition of a workflow.
pub fn step(context: &OperationContext<'_>, args: &StepArgs) -> OperationResponse {
    respond(step_inner(context, args))
}

fn step_inner(context: &OperationContext<'_>, args: &StepArgs) -> Result<String, OperationError> {
    validate_workflow_id(&args.workflow_id)?;
    let state = context.store.get(&args.workflow_id)?;

    if state.status.is_settled() {
        let detail = match state.status {
            WorkflowStatus::Checkpoint => state
                .checkpoint_message
                .clone()
                .unwrap_or_else(|| "Use `continue` or `reject` to decide.".to_string()),
            WorkflowStatus::Complete => "The workflow already finished.".to_string(),
            _ => "The workflow was rejected; restart it to continue.".to_string(),
        };
        return Ok(format!(
            "Workflow `{}` is paused ({}). {detail}",
            args.workflow_id, state.status
        ));
    }

    let definition = resolve_definition(args.definition_file.as_deref())?;
    let report = context
        .executor()
        .execute_step(&definition, &args.workflow_id)?;
    Ok(format!(
        "{}\n\nPhase: {} | Iteration: {} | Status: {}",
        report.message, report.state.phase, report.state.iteration, report.state.status
    ))
}

/// A definition file when given; otherwise the canonical default is
/// reconstructed, which is how later steps run without re-supplying the
/// file.
fn resolve_definition(
    definition_file: Option<&str>,
) -> Result<WorkflowDefinition, OperationError> {
    match definition_file {
        Some(path) => Ok(load_from_file(Path::new(path))?),
        None => Ok(default_workflow()),
    }
}

/// Apply an operator decision at a checkpoint.
pub fn continue_workflow(
    context: &OperationContext<'_>,
    args: &ContinueArgs,
) -> OperationResponse {
    respond(continue_inner(context, args))
}

fn continue_inner(
    context: &OperationContext<'_>,
    args: &ContinueArgs,
) -> Result<String, OperationError> {
    validate_workflow_id(&args.workflow_id)?;
    let decision = CheckpointDecision::parse(&args.decision)
        .map_err(OperationError::Validation)?;
    if decision == CheckpointDecision::Reject {
        return Err(OperationError::validation(
            "decision must be one of: continue, iterate, approve (use the reject operation)",
        ));
    }
    if decision == CheckpointDecision::Iterate
        && args.feedback.as_deref().map(str::trim).unwrap_or("").is_empty()
    {
        return Err(OperationError::validation(
            "feedback is required when decision is `iterate`",
        ));
    }
    let next_phase = args
        .next_phase
        .as_deref()
        .map(Phase::parse)
        .transpose()
        .map_err(OperationError::Validation)?;

    let state = context.store.get(&args.workflow_id)?;
    if state.status != WorkflowStatus::Checkpoint {
        return Err(OperationError::NotAtCheckpoint {
            workflow_id: args.workflow_id.clone(),
            status: state.status,
        });
    }

    let recorded =
        context
            .store
            .record_checkpoint(&args.workflow_id, decision, args.feedback.as_deref())?;

    match decision {
        CheckpointDecision::Continue => {
            if state.phase != Phase::TestingExecution {
                context.store.update(
                    &args.workflow_id,
                    StateUpdate::status(WorkflowStatus::Reviewing),
                )?;
                Ok(format!(
                    "Recorded `continue` for workflow `{}`; the next step fans out the {} \
                     reviewers.",
                    args.workflow_id, state.phase
                ))
            } else {
                Ok(format!(
                    "Recorded `continue` for workflow `{}`; the next step re-runs the tester.",
                    args.workflow_id
                ))
            }
        }
        CheckpointDecision::Iterate => {
            if state.phase == Phase::TestingExecution {
                // Test-execution keeps its iteration until the fixer runs;
                // undo the increment and route the next step to the fixer.
                context.store.update(
                    &args.workflow_id,
                    StateUpdate {
                        iteration: Some(state.iteration),
                        status: Some(WorkflowStatus::Verifying),
                        ..StateUpdate::default()
                    },
                )?;
                Ok(format!(
                    "Recorded `iterate` for workflow `{}`; the next step runs the fixer on \
                     iteration {}.",
                    args.workflow_id, state.iteration
                ))
            } else {
                Ok(format!(
                    "Recorded `iterate` for workflow `{}`; iteration is now {} and the next \
                     step re-runs the creator with your feedback.",
                    args.workflow_id, recorded.iteration
                ))
            }
        }
        CheckpointDecision::Approve => match next_phase {
            Some(next) => {
                context.store.update(
                    &args.workflow_id,
                    StateUpdate {
                        phase: Some(next),
                        iteration: Some(1),
                        status: Some(WorkflowStatus::Working),
                        ..StateUpdate::default()
                    },
                )?;
                Ok(format!(
                    "Approved workflow `{}` and moved it to phase {next} at iteration 1.",
                    args.workflow_id
                ))
            }
            None => Ok(format!(
                "Approved workflow `{}`; it is complete.",
                args.workflow_id
            )),
        },
        CheckpointDecision::Reject => unreachable!("rejected above"),
    }
}

/// Reject a workflow with a reason, optionally restarting from an earlier
/// phase.
pub fn reject(context: &OperationContext<'_>, args: &RejectArgs) -> OperationResponse {
    respond(reject_inner(context, args))
}

fn reject_inner(
    context: &OperationContext<'_>,
    args: &RejectArgs,
) -> Result<String, OperationError> {
    validate_workflow_id(&args.workflow_id)?;
    validate_reject_reason(&args.reason)?;
    let state = context.store.get(&args.workflow_id)?;

    let restart_from = match args.restart_from.as_deref() {
        None => None,
        Some("current") => Some(state.phase),
        Some(raw) => Some(Phase::parse(raw).map_err(OperationError::Validation)?),
    };

    let mut reason_text = args.reason.clone();
    if !args.required_changes.is_empty() {
        reason_text.push_str("\n\nRequired changes:\n");
        for change in &args.required_changes {
            reason_text.push_str(&format!("- [ ] {change}\n"));
        }
    }

    context
        .store
        .record_checkpoint(&args.workflow_id, CheckpointDecision::Reject, Some(&reason_text))?;

    match restart_from {
        Some(phase) => {
            let message = format!(
                "Workflow rejected: {}. Restarting from phase {phase}.",
                args.reason
            );
            context.store.update(
                &args.workflow_id,
                StateUpdate {
                    phase: Some(phase),
                    iteration: Some(1),
                    status: Some(WorkflowStatus::Idle),
                    checkpoint_message: Some(message.clone()),
                    ..StateUpdate::default()
                },
            )?;
            Ok(format!(
                "Rejected workflow `{}` and reset it to phase {phase}, iteration 1, status \
                 idle.\n\n{reason_text}",
                args.workflow_id
            ))
        }
        None => Ok(format!(
            "Rejected workflow `{}`.\n\n{reason_text}",
            args.workflow_id
        )),
    }
}
