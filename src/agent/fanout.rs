use crate::agent::invocation::{AgentInvoker, InvocationRequest};
use crate::agent::output_parse::{parse_verification_output, VerificationSummary};
use crate::definition::defaults::default_reviewer_verifier_map;
use crate::shared::logging::{log_info, log_warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

/// Filesystem-safe ISO timestamp for fan-out output filenames.
fn file_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H-%M-%S%.3fZ")
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutMode {
    /// The overall result fails on the first agent failure; the remaining
    /// agents still run to completion and report.
    FailFast,
    /// Per-agent status only; the fan-out itself always completes.
    BestEffort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentRunReport {
    pub agent: String,
    pub success: bool,
    pub output_file: Option<String>,
    pub error: Option<String>,
    pub warning: Option<String>,
}

/// Execute up to ten agents in parallel over the same prompt and context,
/// each writing to `<out_dir>/<agent>-<timestamp>.md`. Returns the reports
/// in input order plus the overall verdict for the chosen mode.
pub fn run_agents(
    invoker: &AgentInvoker<'_>,
    agents: &[String],
    prompt: &str,
    context_files: &[PathBuf],
    out_dir: &Path,
    mode: FanoutMode,
) -> (Vec<AgentRunReport>, bool) {
    let reports: Vec<AgentRunReport> = thread::scope(|scope| {
        let handles: Vec<_> = agents
            .iter()
            .map(|agent| {
                let output_path = out_dir.join(format!("{agent}-{}.md", file_timestamp()));
                scope.spawn(move || {
                    let outcome = invoker.invoke(&InvocationRequest {
                        agent,
                        prompt,
                        context_files,
                        output_path: &output_path,
                        session_id: None,
                        model_override: None,
                        extra_args: &[],
                    });
                    AgentRunReport {
                        agent: agent.clone(),
                        success: outcome.success,
                        output_file: outcome.output_file,
                        error: outcome.error,
                        warning: outcome.warning,
                    }
                })
            })
            .collect();
        handles
            .into_iter()
            .zip(agents)
            .map(|(handle, agent)| {
                handle.join().unwrap_or_else(|_| AgentRunReport {
                    agent: agent.clone(),
                    success: false,
                    output_file: None,
                    error: Some(format!("agent `{agent}` execution thread panicked")),
                    warning: None,
                })
            })
            .collect()
    });

    let all_succeeded = reports.iter().all(|report| report.success);
    let overall = match mode {
        FanoutMode::FailFast => all_succeeded,
        FanoutMode::BestEffort => true,
    };
    (reports, overall)
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifierStatus {
    Executed,
    /// No verifier mapped for the reviewer; nothing was invoked.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerifierOutcome {
    pub reviewer: String,
    pub verifier: Option<String>,
    pub status: VerifierStatus,
    pub output_file: Option<String>,
    /// Advisory parse of the verifier's output; never gates anything.
    pub summary: Option<VerificationSummary>,
    pub error: Option<String>,
}

/// For each `(reviewer, review_file)` pair, resolve the paired verifier
/// through the custom-over-default map and audit the review against the
/// artifact. Unmapped reviewers are reported as skipped.
pub fn run_verifiers(
    invoker: &AgentInvoker<'_>,
    pairs: &[(String, String)],
    artifact_file: &Path,
    custom_map: &BTreeMap<String, String>,
    out_dir: &Path,
) -> Vec<VerifierOutcome> {
    let default_map = default_reviewer_verifier_map();
    let artifact = match fs::read_to_string(artifact_file) {
        Ok(artifact) => artifact,
        Err(err) => {
            let reason = format!(
                "failed to read artifact {}: {err}",
                artifact_file.display()
            );
            log_warn("run_verifiers", &reason);
            return pairs
                .iter()
                .map(|(reviewer, _)| VerifierOutcome {
                    reviewer: reviewer.clone(),
                    verifier: None,
                    status: VerifierStatus::Failed,
                    output_file: None,
                    summary: None,
                    error: Some(reason.clone()),
                })
                .collect();
        }
    };

    thread::scope(|scope| {
        let handles: Vec<_> = pairs
            .iter()
            .map(|(reviewer, review_file)| {
                let verifier = custom_map
                    .get(reviewer)
                    .or_else(|| default_map.get(reviewer))
                    .cloned();
                let artifact = artifact.as_str();
                scope.spawn(move || {
                    let Some(verifier) = verifier else {
                        log_info(
                            "run_verifiers",
                            &format!("no verifier mapped for reviewer `{reviewer}`; skipping"),
                        );
                        return VerifierOutcome {
                            reviewer: reviewer.clone(),
                            verifier: None,
                            status: VerifierStatus::Skipped,
                            output_file: None,
                            summary: None,
                            error: None,
                        };
                    };
                    execute_verifier(invoker, reviewer, review_file, &verifier, artifact, out_dir)
                })
            })
            .collect();
        handles
            .into_iter()
            .zip(pairs)
            .map(|(handle, (reviewer, _))| {
                handle.join().unwrap_or_else(|_| VerifierOutcome {
                    reviewer: reviewer.clone(),
                    verifier: None,
                    status: VerifierStatus::Failed,
                    output_file: None,
                    summary: None,
                    error: Some(format!(
                        "verifier thread for reviewer `{reviewer}` panicked"
                    )),
                })
            })
            .collect()
    })
}

fn execute_verifier(
    invoker: &AgentInvoker<'_>,
    reviewer: &str,
    review_file: &str,
    verifier: &str,
    artifact: &str,
    out_dir: &Path,
) -> VerifierOutcome {
    let review = match fs::read_to_string(review_file) {
        Ok(review) => review,
        Err(err) => {
            return VerifierOutcome {
                reviewer: reviewer.to_string(),
                verifier: Some(verifier.to_string()),
                status: VerifierStatus::Failed,
                output_file: None,
                summary: None,
                error: Some(format!("failed to read review {review_file}: {err}")),
            }
        }
    };

    let prompt = format!(
        "Verify the review below against the artifact it critiques. Assess whether each \
         finding is accurate and whether the review missed anything material. Finish with a \
         line `Recommendation: approve|iterate|reject` and list outstanding issues as bullet \
         points tagged [critical], [major], [minor], or [info].\n\n\
         # Artifact\n{artifact}\n\n# Review (by {reviewer})\n{review}"
    );
    let output_path = out_dir.join(format!("{verifier}-{}.md", file_timestamp()));
    let outcome = invoker.invoke(&InvocationRequest {
        agent: verifier,
        prompt: &prompt,
        context_files: &[],
        output_path: &output_path,
        session_id: None,
        model_override: None,
        extra_args: &[],
    });

    if !outcome.success {
        return VerifierOutcome {
            reviewer: reviewer.to_string(),
            verifier: Some(verifier.to_string()),
            status: VerifierStatus::Failed,
            output_file: outcome.output_file,
            summary: None,
            error: outcome.error,
        };
    }

    let summary = outcome
        .stdout
        .as_deref()
        .map(|stdout| parse_verification_output(&extract_text(stdout)));
    VerifierOutcome {
        reviewer: reviewer.to_string(),
        verifier: Some(verifier.to_string()),
        status: VerifierStatus::Executed,
        output_file: outcome.output_file,
        summary,
        error: None,
    }
}

fn extract_text(stdout: &str) -> String {
    crate::agent::output_parse::extract_primary_output(stdout).text
}
