use crate::definition::error::DefinitionError;
use crate::definition::load::DEFAULT_OUTPUT_DIR;
use crate::definition::model::{
    IterativePhase, PhaseDefinition, TestExecutionPhase, VariableValue, WorkflowDefinition,
};
use crate::shared::fs_atomic::write_atomic;
use crate::state::model::Phase;
use crate::state::paths::StatePaths;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_WORKFLOW_NAME: &str = "default-workflow";

/// Built-in reviewer → verifier pairing. Per-workflow overrides layered on
/// top of this live in `WorkflowState::reviewer_verifier_map`.
pub const DEFAULT_REVIEWER_VERIFIER_PAIRS: [(&str, &str); 9] = [
    ("architecture-reviewer", "architecture-verifier"),
    ("integration-reviewer", "integration-verifier"),
    ("security-reviewer", "security-verifier"),
    ("logic-reviewer", "logic-verifier"),
    ("patterns-reviewer", "patterns-verifier"),
    ("operations-reviewer", "operations-verifier"),
    ("coverage-reviewer", "coverage-verifier"),
    ("quality-reviewer", "quality-verifier"),
    ("reliability-reviewer", "reliability-verifier"),
];

pub fn default_reviewer_verifier_map() -> BTreeMap<String, String> {
    DEFAULT_REVIEWER_VERIFIER_PAIRS
        .iter()
        .map(|(reviewer, verifier)| (reviewer.to_string(), verifier.to_string()))
        .collect()
}

fn reviewer_names(topics: [&str; 3]) -> Vec<String> {
    topics.iter().map(|t| format!("{t}-reviewer")).collect()
}

fn verifier_names(topics: [&str; 3]) -> Vec<String> {
    topics.iter().map(|t| format!("{t}-verifier")).collect()
}

/// The canonical four-phase workflow: planning → implementation →
/// testing-setup → testing-execution. This is the single source for both
/// `start --use-default` and stepping without a definition file.
pub fn default_workflow() -> WorkflowDefinition {
    let mut variables = BTreeMap::new();
    variables.insert(
        "output_dir".to_string(),
        VariableValue::String(DEFAULT_OUTPUT_DIR.to_string()),
    );
    variables.insert("iteration".to_string(), VariableValue::Integer(1));

    WorkflowDefinition {
        name: DEFAULT_WORKFLOW_NAME.to_string(),
        version: 1,
        description: Some(
            "Plan, implement, and test an artifact with checkpoint-gated review loops".to_string(),
        ),
        variables,
        output_dir: DEFAULT_OUTPUT_DIR.to_string(),
        input_file: None,
        phases: vec![
            PhaseDefinition::Iterative(IterativePhase {
                id: Phase::Planning,
                creator: "plan-creator".to_string(),
                reviewers: reviewer_names(["architecture", "integration", "security"]),
                verifiers: verifier_names(["architecture", "integration", "security"]),
                context: Vec::new(),
                outputs: Some(BTreeMap::from([
                    ("reviews".to_string(), "{{ output_dir }}/reviews".to_string()),
                    (
                        "verifications".to_string(),
                        "{{ output_dir }}/verifications".to_string(),
                    ),
                ])),
                min_iterations: 1,
                max_iterations: None,
                checkpoint_message: None,
            }),
            PhaseDefinition::Iterative(IterativePhase {
                id: Phase::Implementation,
                creator: "impl-creator".to_string(),
                reviewers: reviewer_names(["logic", "patterns", "operations"]),
                verifiers: verifier_names(["logic", "patterns", "operations"]),
                context: vec!["{{ phases.planning.outputs.artifact }}".to_string()],
                outputs: None,
                min_iterations: 1,
                max_iterations: None,
                checkpoint_message: None,
            }),
            PhaseDefinition::Iterative(IterativePhase {
                id: Phase::TestingSetup,
                creator: "test-setup-creator".to_string(),
                reviewers: reviewer_names(["coverage", "quality", "reliability"]),
                verifiers: verifier_names(["coverage", "quality", "reliability"]),
                context: vec![
                    "{{ phases.planning.outputs.artifact }}".to_string(),
                    "{{ phases.implementation.outputs.artifact }}".to_string(),
                ],
                outputs: None,
                min_iterations: 1,
                max_iterations: None,
                checkpoint_message: None,
            }),
            PhaseDefinition::TestExecution(TestExecutionPhase {
                id: Phase::TestingExecution,
                tester: "test-executor".to_string(),
                fixer: "test-fixer".to_string(),
                context: vec!["{{ phases.testing-setup.outputs.artifact }}".to_string()],
                outputs: None,
                min_iterations: 1,
                max_iterations: None,
            }),
        ],
    }
}

/// Materialize the canonical default as YAML under the workflow directory
/// so the operator can inspect exactly what ran.
pub fn write_default_workflow(base: &Path) -> Result<PathBuf, DefinitionError> {
    let definition = default_workflow();
    let encoded = serde_yaml::to_string(&definition)
        .map_err(|err| DefinitionError::Encode(err.to_string()))?;
    let path = StatePaths::new(base).workflow_file(&definition.name);
    write_atomic(&path, encoded.as_bytes()).map_err(|source| DefinitionError::Write {
        path: path.display().to_string(),
        source,
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_pairs_every_reviewer_topic_with_its_verifier() {
        let map = default_reviewer_verifier_map();
        assert_eq!(map.len(), 9);
        assert_eq!(
            map.get("architecture-reviewer").map(String::as_str),
            Some("architecture-verifier")
        );
        assert_eq!(
            map.get("reliability-reviewer").map(String::as_str),
            Some("reliability-verifier")
        );
    }

    #[test]
    fn default_workflow_covers_all_four_phases_in_order() {
        let definition = default_workflow();
        let ids: Vec<Phase> = definition.phases.iter().map(|p| p.id()).collect();
        assert_eq!(
            ids,
            vec![
                Phase::Planning,
                Phase::Implementation,
                Phase::TestingSetup,
                Phase::TestingExecution
            ]
        );
        assert_eq!(definition.output_dir, DEFAULT_OUTPUT_DIR);
    }
}
