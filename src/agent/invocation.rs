use crate::agent::model_map::resolve_model;
use crate::agent::output_parse::{classify_exit, extract_primary_output};
use crate::agent::prompt::{compose_prompt, render_context_block};
use crate::agent::token_budget::{self, BudgetLevel};
use crate::agent::types::{
    AgentCatalog, AgentError, AgentRunner, InvocationOutcome, OutcomeKind, RunnerRequest,
};
use crate::session::{render_history_markdown, SessionStore};
use crate::shared::fs_atomic::write_atomic;
use crate::shared::logging::{log_debug, log_warn};
use std::path::{Path, PathBuf};

/// One agent invocation: resolve the definition, assemble the prompt,
/// check the token budget, run, persist stdout, classify.
#[derive(Debug, Clone)]
pub struct InvocationRequest<'a> {
    pub agent: &'a str,
    pub prompt: &'a str,
    pub context_files: &'a [PathBuf],
    pub output_path: &'a Path,
    pub session_id: Option<&'a str>,
    pub model_override: Option<&'a str>,
    pub extra_args: &'a [String],
}

pub struct AgentInvoker<'a> {
    catalog: &'a dyn AgentCatalog,
    runner: &'a dyn AgentRunner,
    sessions: Option<&'a dyn SessionStore>,
    cwd: PathBuf,
}

impl<'a> AgentInvoker<'a> {
    pub fn new(
        catalog: &'a dyn AgentCatalog,
        runner: &'a dyn AgentRunner,
        sessions: Option<&'a dyn SessionStore>,
        cwd: &Path,
    ) -> Self {
        Self {
            catalog,
            runner,
            sessions,
            cwd: cwd.to_path_buf(),
        }
    }

    /// Never returns an error: agent-level and process-level failures are
    /// recorded on the outcome so fan-outs can report partial failures.
    pub fn invoke(&self, request: &InvocationRequest<'_>) -> InvocationOutcome {
        let Some(definition) = self.catalog.get_agent(request.agent) else {
            let err = AgentError::AgentNotFound {
                agent: request.agent.to_string(),
            };
            return InvocationOutcome::from_agent_error(
                request.agent,
                OutcomeKind::ProcessError,
                &err,
            );
        };

        let model = match resolve_model(request.model_override, definition.model.as_deref()) {
            Ok(model) => model,
            Err(err) => {
                return InvocationOutcome::from_agent_error(
                    request.agent,
                    OutcomeKind::ProcessError,
                    &err,
                )
            }
        };

        let context_block = render_context_block(request.context_files);
        let history = self.load_history(request);
        let full_prompt = compose_prompt(request.prompt, &context_block, history.as_deref());

        let budget = token_budget::check(&full_prompt, model.as_str());
        let mut warning = None;
        match budget.level {
            BudgetLevel::Error => {
                let err = AgentError::TokenBudgetExceeded {
                    estimated_tokens: budget.estimated_tokens,
                    limit: budget.limit,
                    model: budget.model.clone(),
                };
                let mut outcome = InvocationOutcome::from_agent_error(
                    request.agent,
                    OutcomeKind::ProcessError,
                    &err,
                );
                if let Some(message) = budget.message {
                    outcome.error = Some(message);
                }
                return outcome;
            }
            BudgetLevel::Warning => warning = budget.message,
            BudgetLevel::Ok => {}
        }

        log_debug(
            "agent_invoke",
            &format!(
                "invoking `{}` with model {} ({} estimated tokens)",
                request.agent, model, budget.estimated_tokens
            ),
        );

        let runner_request = RunnerRequest {
            agent: request.agent.to_string(),
            prompt: full_prompt,
            cwd: self.cwd.clone(),
            extra_args: request.extra_args.to_vec(),
            model: Some(model.api_name().to_string()),
        };
        let output = match self.runner.execute(&runner_request) {
            Ok(output) => output,
            Err(err) => {
                let mut outcome = InvocationOutcome::from_agent_error(
                    request.agent,
                    OutcomeKind::ProcessError,
                    &err,
                );
                outcome.warning = warning;
                return outcome;
            }
        };

        if let Err(source) = write_atomic(request.output_path, output.stdout.as_bytes()) {
            let err = AgentError::Io {
                path: request.output_path.display().to_string(),
                source,
            };
            return InvocationOutcome {
                agent: request.agent.to_string(),
                kind: OutcomeKind::ProcessError,
                success: false,
                stdout: Some(output.stdout),
                output_file: None,
                error: Some(err.to_string()),
                error_code: Some(err.code()),
                warning,
            };
        }

        let extracted = extract_primary_output(&output.stdout);
        let has_result = output.has_result || !output.stdout.trim().is_empty();
        let kind = classify_exit(output.exit_code, has_result, extracted.agent_error);

        match kind {
            OutcomeKind::Success | OutcomeKind::Partial => {
                if kind == OutcomeKind::Partial {
                    warning = Some(format!(
                        "agent `{}` timed out (exit 124) but produced a result; treating as partial",
                        request.agent
                    ));
                }
                self.save_session_turn(request, &extracted.text);
                InvocationOutcome {
                    agent: request.agent.to_string(),
                    kind,
                    success: true,
                    stdout: Some(output.stdout),
                    output_file: Some(request.output_path.display().to_string()),
                    error: None,
                    error_code: None,
                    warning,
                }
            }
            OutcomeKind::AgentError => {
                let err = AgentError::ExecutionFailed {
                    agent: request.agent.to_string(),
                    reason: extracted.text.clone(),
                    execution_time_ms: output.execution_time_ms,
                };
                InvocationOutcome {
                    agent: request.agent.to_string(),
                    kind,
                    success: false,
                    stdout: Some(output.stdout),
                    output_file: Some(request.output_path.display().to_string()),
                    error: Some(extracted.text),
                    error_code: Some(err.code()),
                    warning,
                }
            }
            OutcomeKind::ProcessError => {
                // Exit 124 is the runner's timeout; without a result it is a
                // plain timeout failure rather than a partial.
                let err = if output.exit_code == 124 {
                    AgentError::Timeout {
                        agent: request.agent.to_string(),
                        execution_time_ms: output.execution_time_ms,
                    }
                } else {
                    AgentError::ExecutionFailed {
                        agent: request.agent.to_string(),
                        reason: format!(
                            "exit code {}: {}",
                            output.exit_code,
                            output.stderr.trim()
                        ),
                        execution_time_ms: output.execution_time_ms,
                    }
                };
                InvocationOutcome {
                    agent: request.agent.to_string(),
                    kind,
                    success: false,
                    stdout: Some(output.stdout),
                    output_file: Some(request.output_path.display().to_string()),
                    error: Some(err.to_string()),
                    error_code: Some(err.code()),
                    warning,
                }
            }
        }
    }

    fn load_history(&self, request: &InvocationRequest<'_>) -> Option<String> {
        let sessions = self.sessions?;
        let session_id = request.session_id?;
        match sessions.load_session(session_id, request.agent) {
            Ok(Some(history)) => {
                let rendered = render_history_markdown(&history);
                (!rendered.is_empty()).then_some(rendered)
            }
            Ok(None) => None,
            Err(err) => {
                log_warn(
                    "session_load",
                    &format!("failed to load session `{session_id}`: {err}"),
                );
                None
            }
        }
    }

    fn save_session_turn(&self, request: &InvocationRequest<'_>, response: &str) {
        let (Some(sessions), Some(session_id)) = (self.sessions, request.session_id) else {
            return;
        };
        if let Err(err) = sessions.save_session(session_id, request.agent, request.prompt, response)
        {
            log_warn(
                "session_save",
                &format!("failed to save session `{session_id}`: {err}"),
            );
        }
    }
}
