use phasegate::definition::defaults::{
    default_reviewer_verifier_map, default_workflow, write_default_workflow,
    DEFAULT_WORKFLOW_NAME,
};
use phasegate::definition::load::load_from_file;
use phasegate::definition::model::PhaseDefinition;
use phasegate::state::Phase;
use tempfile::tempdir;

#[test]
fn defaults_module_canonical_workflow_round_trips_through_yaml() {
    let temp = tempdir().expect("tempdir");
    let path = write_default_workflow(temp.path()).expect("write default");
    assert!(path.ends_with(format!("{DEFAULT_WORKFLOW_NAME}.yaml")));
    assert!(path.starts_with(temp.path().join(".cursor/agents/workflows")));

    let reloaded = load_from_file(&path).expect("reload written default");
    assert_eq!(reloaded, default_workflow());
}

#[test]
fn defaults_module_fixes_the_reviewer_vocabulary_per_phase() {
    let definition = default_workflow();

    let PhaseDefinition::Iterative(planning) = definition.phase(Phase::Planning).expect("planning")
    else {
        panic!("planning should be iterative");
    };
    assert_eq!(planning.creator, "plan-creator");
    assert_eq!(
        planning.reviewers,
        vec!["architecture-reviewer", "integration-reviewer", "security-reviewer"]
    );
    assert_eq!(planning.reviewers.len(), planning.verifiers.len());

    let PhaseDefinition::Iterative(setup) =
        definition.phase(Phase::TestingSetup).expect("testing-setup")
    else {
        panic!("testing-setup should be iterative");
    };
    assert_eq!(setup.creator, "test-setup-creator");
    assert_eq!(
        setup.reviewers,
        vec!["coverage-reviewer", "quality-reviewer", "reliability-reviewer"]
    );

    let PhaseDefinition::TestExecution(execution) = definition
        .phase(Phase::TestingExecution)
        .expect("testing-execution")
    else {
        panic!("testing-execution should be test-execution");
    };
    assert_eq!(execution.tester, "test-executor");
    assert_eq!(execution.fixer, "test-fixer");
}

#[test]
fn defaults_module_pairs_each_default_reviewer_with_its_verifier() {
    let map = default_reviewer_verifier_map();
    let definition = default_workflow();
    for phase in &definition.phases {
        if let PhaseDefinition::Iterative(iterative) = phase {
            for (index, reviewer) in iterative.reviewers.iter().enumerate() {
                assert_eq!(
                    map.get(reviewer),
                    Some(&iterative.verifiers[index]),
                    "default map must agree with positional pairing for {reviewer}"
                );
            }
        }
    }
}
