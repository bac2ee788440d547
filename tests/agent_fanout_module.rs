use phasegate::agent::fanout::{run_agents, run_verifiers, FanoutMode, VerifierStatus};
use phasegate::agent::invocation::AgentInvoker;
use phasegate::agent::types::{
    AgentCatalog, AgentDefinition, AgentError, AgentRunner, RunnerOutput, RunnerRequest,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::tempdir;

struct StaticCatalog {
    names: Vec<String>,
}

impl AgentCatalog for StaticCatalog {
    fn list_agents(&self) -> Vec<AgentDefinition> {
        self.names
            .iter()
            .map(|name| AgentDefinition {
                name: name.clone(),
                description: String::new(),
                model: None,
                content: format!("You are {name}."),
                file_path: PathBuf::from(format!("{name}.md")),
                last_modified: None,
            })
            .collect()
    }

    fn get_agent(&self, name: &str) -> Option<AgentDefinition> {
        self.list_agents().into_iter().find(|a| a.name == name)
    }
}

/// Per-agent scripted outputs; anything unscripted fails with exit 1.
struct PerAgentRunner {
    outputs: BTreeMap<String, (String, i32)>,
    concurrent_peak: Mutex<(usize, usize)>,
}

impl PerAgentRunner {
    fn new(outputs: &[(&str, &str, i32)]) -> Self {
        Self {
            outputs: outputs
                .iter()
                .map(|(agent, stdout, code)| {
                    (agent.to_string(), (stdout.to_string(), *code))
                })
                .collect(),
            concurrent_peak: Mutex::new((0, 0)),
        }
    }

    fn peak(&self) -> usize {
        self.concurrent_peak.lock().expect("lock").1
    }
}

impl AgentRunner for PerAgentRunner {
    fn execute(&self, request: &RunnerRequest) -> Result<RunnerOutput, AgentError> {
        {
            let mut counters = self.concurrent_peak.lock().expect("lock");
            counters.0 += 1;
            counters.1 = counters.1.max(counters.0);
        }
        std::thread::sleep(std::time::Duration::from_millis(25));
        let (stdout, exit_code) = self
            .outputs
            .get(&request.agent)
            .cloned()
            .unwrap_or_else(|| ("unscripted agent".to_string(), 1));
        {
            let mut counters = self.concurrent_peak.lock().expect("lock");
            counters.0 -= 1;
        }
        Ok(RunnerOutput {
            has_result: !stdout.is_empty(),
            stdout,
            stderr: String::new(),
            exit_code,
            execution_time_ms: 25,
            result_json: None,
        })
    }
}

#[test]
fn fanout_module_runs_agents_in_parallel_and_reports_in_input_order() {
    let temp = tempdir().expect("tempdir");
    let catalog = StaticCatalog {
        names: vec!["a".to_string(), "b".to_string(), "c".to_string()],
    };
    let runner = PerAgentRunner::new(&[("a", "out a", 0), ("b", "out b", 0), ("c", "out c", 0)]);
    let invoker = AgentInvoker::new(&catalog, &runner, None, temp.path());

    let agents = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let out_dir = temp.path().join("outputs");
    let (reports, overall) = run_agents(
        &invoker,
        &agents,
        "same prompt",
        &[],
        &out_dir,
        FanoutMode::BestEffort,
    );

    assert!(overall);
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.success));
    assert_eq!(
        reports.iter().map(|r| r.agent.as_str()).collect::<Vec<_>>(),
        vec!["a", "b", "c"]
    );
    for report in &reports {
        let file = report.output_file.as_deref().expect("output file");
        assert!(file.contains(&format!("{}-", report.agent)));
        assert!(PathBuf::from(file).exists());
    }
    assert!(runner.peak() > 1, "agents should overlap in time");
}

#[test]
fn fanout_module_fail_fast_reports_partial_results() {
    let temp = tempdir().expect("tempdir");
    let catalog = StaticCatalog {
        names: vec!["good".to_string(), "bad".to_string()],
    };
    let runner = PerAgentRunner::new(&[("good", "fine", 0), ("bad", "", 1)]);
    let invoker = AgentInvoker::new(&catalog, &runner, None, temp.path());

    let agents = vec!["good".to_string(), "bad".to_string()];
    let (reports, overall) = run_agents(
        &invoker,
        &agents,
        "same prompt",
        &[],
        &temp.path().join("outputs"),
        FanoutMode::FailFast,
    );
    assert!(!overall);
    assert!(reports[0].success);
    assert!(!reports[1].success);
    assert!(reports[1].error.is_some());

    // Best-effort over the same inputs reports per-agent status instead.
    let (_, overall) = run_agents(
        &invoker,
        &agents,
        "same prompt",
        &[],
        &temp.path().join("outputs2"),
        FanoutMode::BestEffort,
    );
    assert!(overall);
}

#[test]
fn fanout_module_run_verifiers_skips_unmapped_and_parses_output() {
    let temp = tempdir().expect("tempdir");
    let catalog = StaticCatalog {
        names: vec![
            "architecture-verifier".to_string(),
            "custom-verifier".to_string(),
        ],
    };
    let runner = PerAgentRunner::new(&[
        (
            "architecture-verifier",
            "Recommendation: approve\nAll findings verified.",
            0,
        ),
        (
            "custom-verifier",
            "Recommendation: iterate\n- critical: missing rollback",
            0,
        ),
    ]);
    let invoker = AgentInvoker::new(&catalog, &runner, None, temp.path());

    let artifact = temp.path().join("plan.md");
    fs::write(&artifact, "the artifact").expect("write artifact");
    let review_a = temp.path().join("review-a.md");
    fs::write(&review_a, "solid plan").expect("write review");
    let review_b = temp.path().join("review-b.md");
    fs::write(&review_b, "shaky plan").expect("write review");
    let review_c = temp.path().join("review-c.md");
    fs::write(&review_c, "whatever").expect("write review");

    let mut custom_map = BTreeMap::new();
    custom_map.insert("special-reviewer".to_string(), "custom-verifier".to_string());

    let pairs = vec![
        (
            "architecture-reviewer".to_string(),
            review_a.display().to_string(),
        ),
        ("special-reviewer".to_string(), review_b.display().to_string()),
        ("unknown-reviewer".to_string(), review_c.display().to_string()),
    ];
    let outcomes = run_verifiers(
        &invoker,
        &pairs,
        &artifact,
        &custom_map,
        &temp.path().join("verifications"),
    );

    assert_eq!(outcomes.len(), 3);

    let mapped = &outcomes[0];
    assert_eq!(mapped.status, VerifierStatus::Executed);
    assert_eq!(mapped.verifier.as_deref(), Some("architecture-verifier"));
    let summary = mapped.summary.as_ref().expect("summary");
    assert!(summary.passed);

    let custom = &outcomes[1];
    assert_eq!(custom.status, VerifierStatus::Executed);
    assert_eq!(custom.verifier.as_deref(), Some("custom-verifier"));
    let summary = custom.summary.as_ref().expect("summary");
    assert!(!summary.passed);
    assert_eq!(summary.critical_issues, 1);

    let skipped = &outcomes[2];
    assert_eq!(skipped.status, VerifierStatus::Skipped);
    assert!(skipped.verifier.is_none());
    assert!(skipped.output_file.is_none());
}

#[test]
fn fanout_module_unreadable_review_fails_only_that_verifier() {
    let temp = tempdir().expect("tempdir");
    let catalog = StaticCatalog {
        names: vec!["architecture-verifier".to_string()],
    };
    let runner = PerAgentRunner::new(&[("architecture-verifier", "ok", 0)]);
    let invoker = AgentInvoker::new(&catalog, &runner, None, temp.path());

    let artifact = temp.path().join("plan.md");
    fs::write(&artifact, "the artifact").expect("write artifact");

    let pairs = vec![(
        "architecture-reviewer".to_string(),
        temp.path().join("missing-review.md").display().to_string(),
    )];
    let outcomes = run_verifiers(
        &invoker,
        &pairs,
        &artifact,
        &BTreeMap::new(),
        &temp.path().join("verifications"),
    );
    assert_eq!(outcomes[0].status, VerifierStatus::Failed);
    assert!(outcomes[0].error.as_deref().is_some_and(|e| e.contains("missing-review")));
}
