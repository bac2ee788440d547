use crate::ops::args::StatusArgs;
use crate::ops::validate::validate_workflow_id;
use crate::ops::{respond, OperationContext, OperationError, OperationResponse};
use crate::state::model::WorkflowState;

const RECENT_ARTIFACTS: usize = 5;
const RECENT_CHECKPOINTS: usize = 3;
const RECENT_AGENT_RUNS: usize = 10;

/// Render a Markdown status report for one workflow.
pub fn status(context: &OperationContext<'_>, args: &StatusArgs) -> OperationResponse {
    respond(status_inner(context, args))
}

fn status_inner(
    context: &OperationContext<'_>,
    args: &StatusArgs,
) -> Result<String, OperationError> {
    validate_workflow_id(&args.workflow_id)?;
    let state = context.store.get(&args.workflow_id)?;
    Ok(render_report(&state, args.verbose))
}

fn render_report(state: &WorkflowState, verbose: bool) -> String {
    let mut out = format!("# Workflow `{}`\n\n", state.workflow_id);
    out.push_str("| Field | Value |\n|-------|-------|\n");
    out.push_str(&format!("| Phase | {} |\n", state.phase));
    out.push_str(&format!("| Iteration | {} |\n", state.iteration));
    out.push_str(&format!("| Status | {} |\n", state.status));
    out.push_str(&format!("| Created | {} |\n", state.created_at));
    out.push_str(&format!("| Updated | {} |\n", state.updated_at));

    if let Some(message) = &state.checkpoint_message {
        out.push_str(&format!("\n## Checkpoint\n\n{message}\n"));
    }
    if let Some(artifact) = &state.current_artifact {
        out.push_str(&format!("\n## Current artifact\n\n{artifact}\n"));
    }

    let shown = if verbose {
        state.artifacts.len()
    } else {
        RECENT_ARTIFACTS.min(state.artifacts.len())
    };
    if shown > 0 {
        out.push_str(&format!(
            "\n## Artifacts ({} of {})\n\n",
            shown,
            state.artifacts.len()
        ));
        for record in state.artifacts.iter().rev().take(shown) {
            out.push_str(&format!(
                "- [{}] v{} {} (by {} at {})\n",
                record.artifact_type,
                record.iteration,
                record.file,
                record.created_by,
                record.created_at
            ));
        }
    }

    let unaddressed: Vec<_> = state
        .feedback_history
        .iter()
        .filter(|record| !record.addressed)
        .collect();
    if !unaddressed.is_empty() {
        out.push_str(&format!(
            "\n## Unaddressed feedback ({})\n\n",
            unaddressed.len()
        ));
        for record in unaddressed {
            out.push_str(&format!(
                "- {} (iteration {}): {}\n",
                record.reviewer, record.iteration, record.feedback_file
            ));
        }
    }

    let shown = if verbose {
        state.checkpoints_passed.len()
    } else {
        RECENT_CHECKPOINTS.min(state.checkpoints_passed.len())
    };
    if shown > 0 {
        out.push_str(&format!(
            "\n## Checkpoints ({} of {})\n\n",
            shown,
            state.checkpoints_passed.len()
        ));
        for record in state.checkpoints_passed.iter().rev().take(shown) {
            match &record.feedback {
                Some(feedback) => out.push_str(&format!(
                    "- {} at {} (iteration {}): {}\n",
                    record.decision, record.decided_at, record.iteration, feedback
                )),
                None => out.push_str(&format!(
                    "- {} at {} (iteration {})\n",
                    record.decision, record.decided_at, record.iteration
                )),
            }
        }
    }

    if verbose {
        if !state.feedback_history.is_empty() {
            out.push_str(&format!(
                "\n## Feedback history ({})\n\n",
                state.feedback_history.len()
            ));
            for record in &state.feedback_history {
                out.push_str(&format!(
                    "- {} (iteration {}, {}): {}\n",
                    record.reviewer,
                    record.iteration,
                    if record.addressed {
                        "addressed"
                    } else {
                        "unaddressed"
                    },
                    record.feedback_file
                ));
            }
        }
        if !state.agent_runs.is_empty() {
            let shown = RECENT_AGENT_RUNS.min(state.agent_runs.len());
            out.push_str(&format!(
                "\n## Agent runs ({shown} of {})\n\n",
                state.agent_runs.len()
            ));
            for record in state.agent_runs.iter().rev().take(shown) {
                let status = match record.success {
                    Some(true) => "ok",
                    Some(false) => "failed",
                    None => "running",
                };
                out.push_str(&format!(
                    "- {} (iteration {}, {status}): {}\n",
                    record.agent, record.iteration, record.output_file
                ));
            }
        }
    }

    out
}
