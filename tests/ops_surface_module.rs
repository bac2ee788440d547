use phasegate::agent::types::{
    AgentCatalog, AgentDefinition, AgentError, AgentRunner, RunnerOutput, RunnerRequest,
};
use phasegate::ops::{
    self, ContinueArgs, OperationContext, RejectArgs, RunAgentsArgs, RunVerifiersArgs, StartArgs,
    StatusArgs, StepArgs,
};
use phasegate::state::{Phase, WorkflowStateStore, WorkflowStatus};
use std::path::{Path, PathBuf};
use tempfile::tempdir;

struct OpenCatalog;

impl AgentCatalog for OpenCatalog {
    fn list_agents(&self) -> Vec<AgentDefinition> {
        vec![AgentDefinition {
            name: "plan-creator".to_string(),
            description: "drafts plans".to_string(),
            model: Some("claude-opus-4-5".to_string()),
            content: "You draft plans.".to_string(),
            file_path: PathBuf::from("plan-creator.md"),
            last_modified: None,
        }]
    }

    fn get_agent(&self, name: &str) -> Option<AgentDefinition> {
        Some(AgentDefinition {
            name: name.to_string(),
            description: String::new(),
            model: None,
            content: format!("You are {name}."),
            file_path: PathBuf::from(format!("{name}.md")),
            last_modified: None,
        })
    }
}

struct OkRunner;

impl AgentRunner for OkRunner {
    fn execute(&self, request: &RunnerRequest) -> Result<RunnerOutput, AgentError> {
        Ok(RunnerOutput {
            stdout: format!("Recommendation: approve\n\nOutput from {}.", request.agent),
            stderr: String::new(),
            exit_code: 0,
            execution_time_ms: 1,
            has_result: true,
            result_json: None,
        })
    }
}

fn context<'a>(
    base: &'a Path,
    store: &'a WorkflowStateStore,
    catalog: &'a OpenCatalog,
    runner: &'a OkRunner,
) -> OperationContext<'a> {
    OperationContext {
        base,
        store,
        catalog,
        runner,
        sessions: None,
    }
}

fn start_default(context: &OperationContext<'_>, workflow_id: &str) {
    let response = ops::workflow::start(
        context,
        &StartArgs {
            definition_file: None,
            use_default: true,
            workflow_id: Some(workflow_id.to_string()),
            input_file: None,
        },
    );
    assert!(!response.is_error, "start failed: {}", response.text);
}

#[test]
fn surface_module_start_default_lists_phases_with_current_marker() {
    let temp = tempdir().expect("tempdir");
    let store = WorkflowStateStore::new(temp.path());
    let catalog = OpenCatalog;
    let runner = OkRunner;
    let ctx = context(temp.path(), &store, &catalog, &runner);

    let response = ops::workflow::start(
        &ctx,
        &StartArgs {
            definition_file: None,
            use_default: true,
            workflow_id: Some("wf1".to_string()),
            input_file: None,
        },
    );
    assert!(!response.is_error);
    assert!(response.text.contains("- planning (current)"));
    assert!(response.text.contains("- implementation\n"));
    assert!(response.text.contains("- testing-setup\n"));
    assert!(response.text.contains("- testing-execution\n"));

    let state = store.get("wf1").expect("state");
    assert_eq!(state.phase, Phase::Planning);
    assert_eq!(state.iteration, 1);
    assert_eq!(state.status, WorkflowStatus::Working);
    assert!(temp.path().join(".cursor/agents/state/wf1.json").exists());
    // Using the default materializes it for inspection.
    assert!(temp
        .path()
        .join(".cursor/agents/workflows/default-workflow.yaml")
        .exists());

    // Starting without a definition source is a validation error.
    let response = ops::workflow::start(&ctx, &StartArgs::default());
    assert!(response.is_error);
    assert!(response.text.contains("VALIDATION_ARGUMENT"));

    // Duplicate id is refused.
    let response = ops::workflow::start(
        &ctx,
        &StartArgs {
            definition_file: None,
            use_default: true,
            workflow_id: Some("wf1".to_string()),
            input_file: None,
        },
    );
    assert!(response.is_error);
    assert!(response.text.contains("WORKFLOW_ALREADY_EXISTS"));
}

#[test]
fn surface_module_step_short_circuits_on_settled_statuses() {
    let temp = tempdir().expect("tempdir");
    let store = WorkflowStateStore::new(temp.path());
    let catalog = OpenCatalog;
    let runner = OkRunner;
    let ctx = context(temp.path(), &store, &catalog, &runner);
    start_default(&ctx, "wf1");

    // First step runs the planning creator and pauses.
    let response = ops::workflow::step(
        &ctx,
        &StepArgs {
            workflow_id: "wf1".to_string(),
            definition_file: None,
        },
    );
    assert!(!response.is_error, "{}", response.text);
    assert!(response.text.contains("Review planning iteration 1"));

    // Stepping while paused is friendly, not an error.
    let response = ops::workflow::step(
        &ctx,
        &StepArgs {
            workflow_id: "wf1".to_string(),
            definition_file: None,
        },
    );
    assert!(!response.is_error);
    assert!(response.text.contains("paused"));

    // Unknown workflow is a 404-class error.
    let response = ops::workflow::step(
        &ctx,
        &StepArgs {
            workflow_id: "nope".to_string(),
            definition_file: None,
        },
    );
    assert!(response.is_error);
    assert!(response.text.contains("NOT_FOUND_WORKFLOW"));
}

#[test]
fn surface_module_iterate_with_feedback_threads_into_next_creator_run() {
    let temp = tempdir().expect("tempdir");
    let store = WorkflowStateStore::new(temp.path());
    let catalog = OpenCatalog;
    let runner = OkRunner;
    let ctx = context(temp.path(), &store, &catalog, &runner);
    start_default(&ctx, "wf1");
    ops::workflow::step(
        &ctx,
        &StepArgs {
            workflow_id: "wf1".to_string(),
            definition_file: None,
        },
    );

    // iterate requires feedback.
    let response = ops::workflow::continue_workflow(
        &ctx,
        &ContinueArgs {
            workflow_id: "wf1".to_string(),
            decision: "iterate".to_string(),
            feedback: None,
            next_phase: None,
        },
    );
    assert!(response.is_error);
    assert!(response.text.contains("feedback"));

    let response = ops::workflow::continue_workflow(
        &ctx,
        &ContinueArgs {
            workflow_id: "wf1".to_string(),
            decision: "iterate".to_string(),
            feedback: Some("Add a security threat model".to_string()),
            next_phase: None,
        },
    );
    assert!(!response.is_error, "{}", response.text);

    let state = store.get("wf1").expect("state");
    assert_eq!(state.iteration, 2);
    assert_eq!(state.status, WorkflowStatus::Working);
    assert_eq!(state.checkpoints_passed.len(), 1);
    assert_eq!(
        state.checkpoints_passed[0].feedback.as_deref(),
        Some("Add a security threat model")
    );

    // The next step passes the operator feedback file to the creator.
    let response = ops::workflow::step(
        &ctx,
        &StepArgs {
            workflow_id: "wf1".to_string(),
            definition_file: None,
        },
    );
    assert!(!response.is_error);
    let state = store.get("wf1").expect("state");
    let last_creator_run = state
        .agent_runs
        .iter()
        .filter(|run| run.agent == "plan-creator")
        .next_back()
        .expect("creator run");
    assert!(last_creator_run
        .context_files
        .iter()
        .any(|file| file.contains("user-feedback-v1")));
}

#[test]
fn surface_module_continue_routes_iterative_phases_to_review() {
    let temp = tempdir().expect("tempdir");
    let store = WorkflowStateStore::new(temp.path());
    let catalog = OpenCatalog;
    let runner = OkRunner;
    let ctx = context(temp.path(), &store, &catalog, &runner);
    start_default(&ctx, "wf1");
    ops::workflow::step(
        &ctx,
        &StepArgs {
            workflow_id: "wf1".to_string(),
            definition_file: None,
        },
    );

    // continue while not at a checkpoint fails later; here we are paused.
    let response = ops::workflow::continue_workflow(
        &ctx,
        &ContinueArgs {
            workflow_id: "wf1".to_string(),
            decision: "continue".to_string(),
            feedback: None,
            next_phase: None,
        },
    );
    assert!(!response.is_error);
    assert_eq!(
        store.get("wf1").expect("state").status,
        WorkflowStatus::Reviewing
    );

    // A second continue now fails the checkpoint precondition.
    let response = ops::workflow::continue_workflow(
        &ctx,
        &ContinueArgs {
            workflow_id: "wf1".to_string(),
            decision: "continue".to_string(),
            feedback: None,
            next_phase: None,
        },
    );
    assert!(response.is_error);
    assert!(response.text.contains("WORKFLOW_INVALID_TRANSITION"));

    // The step after continue fans out the three reviewers concurrently.
    let response = ops::workflow::step(
        &ctx,
        &StepArgs {
            workflow_id: "wf1".to_string(),
            definition_file: None,
        },
    );
    assert!(!response.is_error);
    let state = store.get("wf1").expect("state");
    assert_eq!(state.status, WorkflowStatus::Verifying);
    assert_eq!(state.feedback_history.len(), 3);
}

#[test]
fn surface_module_test_execution_iterate_special_case() {
    let temp = tempdir().expect("tempdir");
    let store = WorkflowStateStore::new(temp.path());
    let catalog = OpenCatalog;
    let runner = OkRunner;
    let ctx = context(temp.path(), &store, &catalog, &runner);
    start_default(&ctx, "wf1");
    store
        .update(
            "wf1",
            phasegate::state::StateUpdate {
                phase: Some(Phase::TestingExecution),
                ..phasegate::state::StateUpdate::default()
            },
        )
        .expect("jump to testing-execution");

    // Tester runs and pauses.
    ops::workflow::step(
        &ctx,
        &StepArgs {
            workflow_id: "wf1".to_string(),
            definition_file: None,
        },
    );
    let state = store.get("wf1").expect("state");
    assert_eq!(state.status, WorkflowStatus::Checkpoint);
    assert_eq!(state.iteration, 1);

    // iterate keeps the iteration and routes to the fixer.
    let response = ops::workflow::continue_workflow(
        &ctx,
        &ContinueArgs {
            workflow_id: "wf1".to_string(),
            decision: "iterate".to_string(),
            feedback: Some("fix E001".to_string()),
            next_phase: None,
        },
    );
    assert!(!response.is_error, "{}", response.text);
    let state = store.get("wf1").expect("state");
    assert_eq!(state.iteration, 1, "test-execution iterate keeps iteration");
    assert_eq!(state.status, WorkflowStatus::Verifying);

    // The fixer step applies the fix and bumps the iteration.
    let response = ops::workflow::step(
        &ctx,
        &StepArgs {
            workflow_id: "wf1".to_string(),
            definition_file: None,
        },
    );
    assert!(!response.is_error);
    let state = store.get("wf1").expect("state");
    assert_eq!(state.iteration, 2);
    assert_eq!(state.status, WorkflowStatus::Working);
    assert!(state
        .artifacts
        .iter()
        .any(|record| record.created_by == "test-fixer"));
}

#[test]
fn surface_module_reject_with_restart_resets_phase_and_iteration() {
    let temp = tempdir().expect("tempdir");
    let store = WorkflowStateStore::new(temp.path());
    let catalog = OpenCatalog;
    let runner = OkRunner;
    let ctx = context(temp.path(), &store, &catalog, &runner);
    start_default(&ctx, "wf1");
    store
        .update(
            "wf1",
            phasegate::state::StateUpdate {
                phase: Some(Phase::Implementation),
                iteration: Some(3),
                ..phasegate::state::StateUpdate::default()
            },
        )
        .expect("advance state");

    // Too-short reasons are rejected.
    let response = ops::workflow::reject(
        &ctx,
        &RejectArgs {
            workflow_id: "wf1".to_string(),
            reason: "bad".to_string(),
            required_changes: Vec::new(),
            restart_from: None,
        },
    );
    assert!(response.is_error);

    let response = ops::workflow::reject(
        &ctx,
        &RejectArgs {
            workflow_id: "wf1".to_string(),
            reason: "architecture flawed: needs rework".to_string(),
            required_changes: vec!["redo the module split".to_string()],
            restart_from: Some("planning".to_string()),
        },
    );
    assert!(!response.is_error, "{}", response.text);
    assert!(response.text.contains("- [ ] redo the module split"));

    let state = store.get("wf1").expect("state");
    assert_eq!(state.phase, Phase::Planning);
    assert_eq!(state.iteration, 1);
    assert_eq!(state.status, WorkflowStatus::Idle);
    assert!(state
        .checkpoint_message
        .as_deref()
        .is_some_and(|m| m.contains("architecture flawed")));
    assert_eq!(
        state.checkpoints_passed.last().expect("record").decision,
        phasegate::state::CheckpointDecision::Reject
    );
}

#[test]
fn surface_module_status_renders_the_markdown_report() {
    let temp = tempdir().expect("tempdir");
    let store = WorkflowStateStore::new(temp.path());
    let catalog = OpenCatalog;
    let runner = OkRunner;
    let ctx = context(temp.path(), &store, &catalog, &runner);
    start_default(&ctx, "wf1");
    ops::workflow::step(
        &ctx,
        &StepArgs {
            workflow_id: "wf1".to_string(),
            definition_file: None,
        },
    );

    let response = ops::status::status(
        &ctx,
        &StatusArgs {
            workflow_id: "wf1".to_string(),
            verbose: false,
        },
    );
    assert!(!response.is_error);
    assert!(response.text.contains("# Workflow `wf1`"));
    assert!(response.text.contains("| Phase | planning |"));
    assert!(response.text.contains("## Checkpoint"));
    assert!(response.text.contains("## Artifacts (1 of 1)"));
    assert!(!response.text.contains("## Agent runs"));

    let verbose = ops::status::status(
        &ctx,
        &StatusArgs {
            workflow_id: "wf1".to_string(),
            verbose: true,
        },
    );
    assert!(verbose.text.contains("## Agent runs"));
}

#[test]
fn surface_module_list_agents_and_parallel_limits() {
    let temp = tempdir().expect("tempdir");
    let store = WorkflowStateStore::new(temp.path());
    let catalog = OpenCatalog;
    let runner = OkRunner;
    let ctx = context(temp.path(), &store, &catalog, &runner);

    let response = ops::agents::list_agents(&ctx);
    assert!(!response.is_error);
    assert!(response.text.contains("plan-creator"));
    assert!(response.text.contains("drafts plans"));

    let too_many: Vec<String> = (0..11).map(|i| format!("agent-{i}")).collect();
    let response = ops::agents::run_agents(
        &ctx,
        &RunAgentsArgs {
            agents: too_many,
            prompt: "go".to_string(),
            context_files: Vec::new(),
            fail_fast: false,
            output_dir: None,
        },
    );
    assert!(response.is_error);
    assert!(response.text.contains("at most 10"));
}

/// Catalog with no agents at all, for the not-found path.
struct ClosedCatalog;

impl AgentCatalog for ClosedCatalog {
    fn list_agents(&self) -> Vec<AgentDefinition> {
        Vec::new()
    }

    fn get_agent(&self, _name: &str) -> Option<AgentDefinition> {
        None
    }
}

#[test]
fn surface_module_missing_agent_surfaces_as_not_found() {
    let temp = tempdir().expect("tempdir");
    let store = WorkflowStateStore::new(temp.path());
    let catalog = ClosedCatalog;
    let runner = OkRunner;
    let ctx = OperationContext {
        base: temp.path(),
        store: &store,
        catalog: &catalog,
        runner: &runner,
        sessions: None,
    };

    let response = ops::agents::run_single_agent(
        &ctx,
        &phasegate::ops::RunAgentArgs {
            agent: "ghost".to_string(),
            prompt: "hello".to_string(),
            ..phasegate::ops::RunAgentArgs::default()
        },
    );
    assert!(response.is_error);
    assert!(response.text.contains("Agent ghost not found"));
    assert!(
        response.text.contains("NOT_FOUND_AGENT"),
        "missing agents report the 404-class code, got: {}",
        response.text
    );
}

#[test]
fn surface_module_run_verifiers_reports_skipped_reviewers() {
    let temp = tempdir().expect("tempdir");
    let store = WorkflowStateStore::new(temp.path());
    let catalog = OpenCatalog;
    let runner = OkRunner;
    let ctx = context(temp.path(), &store, &catalog, &runner);

    let artifact = temp.path().join("plan.md");
    std::fs::write(&artifact, "artifact body").expect("write artifact");
    let review = temp.path().join("review.md");
    std::fs::write(&review, "review body").expect("write review");

    let response = ops::agents::run_verifiers(
        &ctx,
        &RunVerifiersArgs {
            reviews: vec![
                (
                    "architecture-reviewer".to_string(),
                    review.display().to_string(),
                ),
                (
                    "unknown-reviewer".to_string(),
                    review.display().to_string(),
                ),
            ],
            artifact_file: artifact.display().to_string(),
            workflow_id: None,
            output_dir: None,
        },
    );
    assert!(!response.is_error, "{}", response.text);
    assert!(response
        .text
        .contains("`unknown-reviewer`: skipped (no verifier mapped)"));
    assert!(response
        .text
        .contains("`architecture-reviewer` → `architecture-verifier`"));
}
