use phasegate::agent::types::{AgentError, AgentRunner, RunnerOutput, RunnerRequest};
use phasegate::agent::FileAgentCatalog;
use phasegate::ops::{
    self, ContinueArgs, OperationContext, OperationResponse, RejectArgs, RunAgentArgs,
    RunAgentsArgs, RunVerifiersArgs, StartArgs, StatusArgs, StepArgs,
};
use phasegate::session::{FileSessionStore, SessionStore};
use phasegate::state::{StatePaths, WorkflowStateStore};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use std::time::Instant;

const USAGE: &str = "usage: phasegate <operation> [flags]

operations:
  start          --definition <file> | --use-default  [--workflow-id <id>] [--input-file <file>]
  step           --workflow-id <id> [--definition <file>]
  continue       --workflow-id <id> --decision <continue|iterate|approve> [--feedback <text>] [--next-phase <phase>]
  reject         --workflow-id <id> --reason <text> [--required-change <text>]... [--restart-from <phase|current>]
  status         --workflow-id <id> [--verbose]
  list-agents
  run-agent      --agent <name> --prompt <text> [--model <id>] [--session-id <id>] [--context-file <path>]... [--context-glob <pattern>]... [--output-file <path>]
  run-agents     --agent <name>... --prompt <text> [--fail-fast] [--context-file <path>]... [--output-dir <dir>]
  run-verifiers  --review <reviewer=review_file>... --artifact <file> [--workflow-id <id>] [--output-dir <dir>]

common flags: --base <dir> (default .), --agents-dir <dir> (default <base>/.cursor/agents/agents)";

/// Shells out to the configured agent CLI (`PHASEGATE_RUNNER`, default
/// `claude`) the way the orchestrated runner would. Timeouts are the outer
/// runner's job; this binary just reports exit codes.
struct ProcessRunner {
    binary: String,
}

impl ProcessRunner {
    fn from_env() -> Self {
        Self {
            binary: std::env::var("PHASEGATE_RUNNER").unwrap_or_else(|_| "claude".to_string()),
        }
    }
}

impl AgentRunner for ProcessRunner {
    fn execute(&self, request: &RunnerRequest) -> Result<RunnerOutput, AgentError> {
        let started = Instant::now();
        let mut command = Command::new(&self.binary);
        command.current_dir(&request.cwd);
        if let Some(model) = &request.model {
            command.arg("--model").arg(model);
        }
        command.args(&request.extra_args);
        command.arg("-p").arg(&request.prompt);

        let output = command.output().map_err(|source| AgentError::Io {
            path: self.binary.clone(),
            source,
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let result_json = serde_json::from_str(stdout.trim()).ok();
        Ok(RunnerOutput {
            has_result: !stdout.trim().is_empty(),
            exit_code: output.status.code().unwrap_or(-1),
            execution_time_ms: started.elapsed().as_millis() as u64,
            stdout,
            stderr,
            result_json,
        })
    }
}

struct Flags {
    values: BTreeMap<String, Vec<String>>,
    switches: Vec<String>,
}

impl Flags {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut switches = Vec::new();
        let mut index = 0;
        while index < args.len() {
            let flag = args[index]
                .strip_prefix("--")
                .ok_or_else(|| format!("unexpected argument `{}`", args[index]))?;
            match flag {
                "use-default" | "verbose" | "fail-fast" => {
                    switches.push(flag.to_string());
                    index += 1;
                }
                _ => {
                    let value = args
                        .get(index + 1)
                        .ok_or_else(|| format!("flag `--{flag}` requires a value"))?;
                    values.entry(flag.to_string()).or_default().push(value.clone());
                    index += 2;
                }
            }
        }
        Ok(Self { values, switches })
    }

    fn one(&self, flag: &str) -> Option<String> {
        self.values.get(flag).and_then(|v| v.first()).cloned()
    }

    fn many(&self, flag: &str) -> Vec<String> {
        self.values.get(flag).cloned().unwrap_or_default()
    }

    fn switch(&self, flag: &str) -> bool {
        self.switches.iter().any(|s| s == flag)
    }

    fn require(&self, flag: &str) -> Result<String, String> {
        self.one(flag)
            .ok_or_else(|| format!("missing required flag `--{flag}`"))
    }
}

fn run() -> Result<OperationResponse, String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((operation, rest)) = args.split_first() else {
        return Err(USAGE.to_string());
    };
    let flags = Flags::parse(rest)?;

    let base = PathBuf::from(flags.one("base").unwrap_or_else(|| ".".to_string()));
    let agents_dir = flags
        .one("agents-dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| StatePaths::new(&base).agents_root().join("agents"));

    let store = WorkflowStateStore::new(&base);
    let catalog = FileAgentCatalog::new(&agents_dir);
    let runner = ProcessRunner::from_env();
    let sessions = FileSessionStore::new(&StatePaths::new(&base).sessions_dir());
    sessions.cleanup_old_sessions();
    let context = OperationContext {
        base: &base,
        store: &store,
        catalog: &catalog,
        runner: &runner,
        sessions: Some(&sessions),
    };

    let response = match operation.as_str() {
        "start" => ops::workflow::start(
            &context,
            &StartArgs {
                definition_file: flags.one("definition"),
                use_default: flags.switch("use-default"),
                workflow_id: flags.one("workflow-id"),
                input_file: flags.one("input-file"),
            },
        ),
        "step" => ops::workflow::step(
            &context,
            &StepArgs {
                workflow_id: flags.require("workflow-id")?,
                definition_file: flags.one("definition"),
            },
        ),
        "continue" => ops::workflow::continue_workflow(
            &context,
            &ContinueArgs {
                workflow_id: flags.require("workflow-id")?,
                decision: flags.require("decision")?,
                feedback: flags.one("feedback"),
                next_phase: flags.one("next-phase"),
            },
        ),
        "reject" => ops::workflow::reject(
            &context,
            &RejectArgs {
                workflow_id: flags.require("workflow-id")?,
                reason: flags.require("reason")?,
                required_changes: flags.many("required-change"),
                restart_from: flags.one("restart-from"),
            },
        ),
        "status" => ops::status::status(
            &context,
            &StatusArgs {
                workflow_id: flags.require("workflow-id")?,
                verbose: flags.switch("verbose"),
            },
        ),
        "list-agents" => ops::agents::list_agents(&context),
        "run-agent" => ops::agents::run_single_agent(
            &context,
            &RunAgentArgs {
                agent: flags.require("agent")?,
                prompt: flags.require("prompt")?,
                cwd: flags.one("cwd"),
                session_id: flags.one("session-id"),
                model: flags.one("model"),
                extra_args: flags.many("extra-arg"),
                context_files: flags.many("context-file"),
                context_globs: flags.many("context-glob"),
                context_data: None,
                output_file: flags.one("output-file"),
            },
        ),
        "run-agents" => ops::agents::run_agents(
            &context,
            &RunAgentsArgs {
                agents: flags.many("agent"),
                prompt: flags.require("prompt")?,
                context_files: flags.many("context-file"),
                fail_fast: flags.switch("fail-fast"),
                output_dir: flags.one("output-dir"),
            },
        ),
        "run-verifiers" => {
            let mut reviews = Vec::new();
            for pair in flags.many("review") {
                let Some((reviewer, review_file)) = pair.split_once('=') else {
                    return Err(format!(
                        "flag `--review` expects `reviewer=review_file`, got `{pair}`"
                    ));
                };
                reviews.push((reviewer.to_string(), review_file.to_string()));
            }
            ops::agents::run_verifiers(
                &context,
                &RunVerifiersArgs {
                    reviews,
                    artifact_file: flags.require("artifact")?,
                    workflow_id: flags.one("workflow-id"),
                    output_dir: flags.one("output-dir"),
                },
            )
        }
        other => return Err(format!("unknown operation `{other}`\n\n{USAGE}")),
    };
    Ok(response)
}

fn main() {
    match run() {
        Ok(response) => {
            println!("{}", response.text);
            if response.is_error {
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
