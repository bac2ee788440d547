use crate::agent::fanout::{run_agents as fan_out_agents, run_verifiers as fan_out_verifiers, FanoutMode, VerifierStatus};
use crate::agent::invocation::{AgentInvoker, InvocationRequest};
use crate::agent::output_parse::extract_primary_output;
use crate::agent::types::AgentError;
use crate::ops::args::{RunAgentArgs, RunAgentsArgs, RunVerifiersArgs};
use crate::ops::validate::{
    expand_context_glob, validate_agent_name, validate_context_data, validate_context_files,
    validate_context_globs, validate_cwd, validate_extra_args, validate_model, validate_prompt,
    validate_session_id, validate_workflow_id, MAX_PARALLEL_AGENTS,
};
use crate::ops::{respond, OperationContext, OperationError, OperationResponse};
use crate::shared::errors::ErrorCode;
use crate::state::paths::StatePaths;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// List every agent the definition store knows about.
pub fn list_agents(context: &OperationContext<'_>) -> OperationResponse {
    let agents = context.catalog.list_agents();
    if agents.is_empty() {
        return OperationResponse::ok("No agents are defined.".to_string());
    }
    let mut text = format!("## Available agents ({})\n\n", agents.len());
    for agent in agents {
        let model = agent.model.as_deref().unwrap_or("default model");
        if agent.description.is_empty() {
            text.push_str(&format!("- `{}` ({model})\n", agent.name));
        } else {
            text.push_str(&format!(
                "- `{}` — {} ({model})\n",
                agent.name, agent.description
            ));
        }
    }
    OperationResponse::ok(text)
}

/// Run one agent ad hoc with optional context, session threading, and a
/// model override.
pub fn run_single_agent(
    context: &OperationContext<'_>,
    args: &RunAgentArgs,
) -> OperationResponse {
    respond(run_single_agent_inner(context, args))
}

fn run_single_agent_inner(
    context: &OperationContext<'_>,
    args: &RunAgentArgs,
) -> Result<String, OperationError> {
    validate_agent_name(&args.agent)?;
    validate_prompt(&args.prompt)?;
    if let Some(cwd) = &args.cwd {
        validate_cwd(cwd)?;
    }
    if let Some(session_id) = &args.session_id {
        validate_session_id(session_id)?;
    }
    if let Some(model) = &args.model {
        validate_model(model)?;
    }
    validate_extra_args(&args.extra_args)?;
    validate_context_files(&args.context_files)?;
    validate_context_globs(&args.context_globs)?;
    if let Some(context_data) = &args.context_data {
        validate_context_data(context_data)?;
    }

    let mut context_files: Vec<PathBuf> =
        args.context_files.iter().map(PathBuf::from).collect();
    for pattern in &args.context_globs {
        context_files.extend(expand_context_glob(context.base, pattern));
    }

    let prompt = match &args.context_data {
        Some(data) => format!(
            "{}\n\n## Data\n```json\n{}\n```",
            args.prompt,
            serde_json::to_string_pretty(data).unwrap_or_default()
        ),
        None => args.prompt.clone(),
    };

    let output_path = match &args.output_file {
        Some(path) => PathBuf::from(path),
        None => StatePaths::new(context.base).agent_outputs_dir().join(format!(
            "{}-{}.md",
            args.agent,
            chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ")
        )),
    };

    let cwd = args
        .cwd
        .as_deref()
        .map(Path::new)
        .unwrap_or(context.base);
    let invoker = AgentInvoker::new(context.catalog, context.runner, context.sessions, cwd);
    let outcome = invoker.invoke(&InvocationRequest {
        agent: &args.agent,
        prompt: &prompt,
        context_files: &context_files,
        output_path: &output_path,
        session_id: args.session_id.as_deref(),
        model_override: args.model.as_deref(),
        extra_args: &args.extra_args,
    });

    if !outcome.success {
        let code = outcome
            .error_code
            .unwrap_or_else(|| ErrorCode::new("AGENT_EXECUTION_FAILED", 500));
        return Err(OperationError::Invocation {
            code,
            message: outcome
                .error
                .unwrap_or_else(|| format!("agent `{}` failed", args.agent)),
        });
    }

    let mut text = outcome
        .stdout
        .as_deref()
        .map(|stdout| extract_primary_output(stdout).text)
        .unwrap_or_default();
    if let Some(output_file) = &outcome.output_file {
        text.push_str(&format!("\n\nOutput written to {output_file}"));
    }
    if let Some(warning) = &outcome.warning {
        text.push_str(&format!("\n\nWarning: {warning}"));
    }
    Ok(text)
}

/// Run up to ten agents in parallel on the same prompt.
pub fn run_agents(context: &OperationContext<'_>, args: &RunAgentsArgs) -> OperationResponse {
    respond(run_agents_inner(context, args))
}

fn run_agents_inner(
    context: &OperationContext<'_>,
    args: &RunAgentsArgs,
) -> Result<String, OperationError> {
    if args.agents.is_empty() {
        return Err(OperationError::validation("agents must be non-empty"));
    }
    if args.agents.len() > MAX_PARALLEL_AGENTS {
        return Err(OperationError::validation(format!(
            "at most {MAX_PARALLEL_AGENTS} agents may run in parallel"
        )));
    }
    for agent in &args.agents {
        validate_agent_name(agent)?;
    }
    validate_prompt(&args.prompt)?;
    validate_context_files(&args.context_files)?;

    let context_files: Vec<PathBuf> = args.context_files.iter().map(PathBuf::from).collect();
    let out_dir = match &args.output_dir {
        Some(dir) => PathBuf::from(dir),
        None => StatePaths::new(context.base).agent_outputs_dir(),
    };
    let mode = if args.fail_fast {
        FanoutMode::FailFast
    } else {
        FanoutMode::BestEffort
    };

    let invoker = context.invoker();
    let (reports, overall) = fan_out_agents(
        &invoker,
        &args.agents,
        &args.prompt,
        &context_files,
        &out_dir,
        mode,
    );

    let mut text = format!("Ran {} agents in parallel:\n\n", reports.len());
    for report in &reports {
        if report.success {
            text.push_str(&format!(
                "- `{}`: ok ({})\n",
                report.agent,
                report.output_file.as_deref().unwrap_or("no output file")
            ));
        } else {
            text.push_str(&format!(
                "- `{}`: FAILED — {}\n",
                report.agent,
                report.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
    if !overall {
        let failed: Vec<&str> = reports
            .iter()
            .filter(|report| !report.success)
            .map(|report| report.agent.as_str())
            .collect();
        return Err(OperationError::Agent(AgentError::ExecutionFailed {
            agent: failed.join(", "),
            reason: format!("fan-out failed\n\n{text}"),
            execution_time_ms: 0,
        }));
    }
    Ok(text)
}

/// Verify a set of reviews against an artifact, pairing reviewers to
/// verifiers through the workflow override map over the built-in default.
pub fn run_verifiers(
    context: &OperationContext<'_>,
    args: &RunVerifiersArgs,
) -> OperationResponse {
    respond(run_verifiers_inner(context, args))
}

fn run_verifiers_inner(
    context: &OperationContext<'_>,
    args: &RunVerifiersArgs,
) -> Result<String, OperationError> {
    if args.reviews.is_empty() {
        return Err(OperationError::validation("reviews must be non-empty"));
    }
    for (reviewer, _) in &args.reviews {
        validate_agent_name(reviewer)?;
    }
    if args.artifact_file.trim().is_empty() {
        return Err(OperationError::validation("artifact_file is required"));
    }

    let custom_map: BTreeMap<String, String> = match &args.workflow_id {
        Some(workflow_id) => {
            validate_workflow_id(workflow_id)?;
            context.store.get(workflow_id)?.reviewer_verifier_map
        }
        None => BTreeMap::new(),
    };

    let out_dir = match &args.output_dir {
        Some(dir) => PathBuf::from(dir),
        None => StatePaths::new(context.base).agent_verifications_dir(),
    };

    let artifact_file = PathBuf::from(&args.artifact_file);
    let invoker = context.invoker();
    let outcomes = fan_out_verifiers(
        &invoker,
        &args.reviews,
        &artifact_file,
        &custom_map,
        &out_dir,
    );

    let mut text = format!("Verified {} reviews:\n\n", outcomes.len());
    for outcome in &outcomes {
        match outcome.status {
            VerifierStatus::Skipped => text.push_str(&format!(
                "- `{}`: skipped (no verifier mapped)\n",
                outcome.reviewer
            )),
            VerifierStatus::Failed => text.push_str(&format!(
                "- `{}` → `{}`: FAILED — {}\n",
                outcome.reviewer,
                outcome.verifier.as_deref().unwrap_or("?"),
                outcome.error.as_deref().unwrap_or("unknown error")
            )),
            VerifierStatus::Executed => {
                let summary = outcome.summary.as_ref();
                let passed = summary.map(|s| s.passed).unwrap_or(false);
                let critical = summary.map(|s| s.critical_issues).unwrap_or(0);
                let recommendation = summary
                    .and_then(|s| s.recommendation)
                    .map(|r| r.as_str())
                    .unwrap_or("none");
                text.push_str(&format!(
                    "- `{}` → `{}`: {} (critical issues: {critical}, recommendation: \
                     {recommendation})\n",
                    outcome.reviewer,
                    outcome.verifier.as_deref().unwrap_or("?"),
                    if passed { "passed" } else { "not passed" }
                ));
            }
        }
    }
    Ok(text)
}
