use crate::definition::interpolate::InterpolationContext;
use crate::definition::model::{PhaseDefinition, WorkflowDefinition};
use crate::state::model::{ArtifactRecord, ArtifactType, Phase, WorkflowState};

/// Build the `{{ phases.<id>.outputs.<key> }}` lookup environment by walking
/// persisted artifacts and feedback in record order; for repeated keys the
/// latest record wins.
pub fn build_interpolation_context(
    definition: &WorkflowDefinition,
    state: &WorkflowState,
) -> InterpolationContext {
    let mut context = InterpolationContext::new(definition, state.phase, state.iteration);

    for record in &state.artifacts {
        let Some(phase) = attribute_artifact(definition, record) else {
            continue;
        };
        let phase_id = phase.as_str();
        match record.artifact_type {
            ArtifactType::Review => {
                context.set_phase_output(phase_id, "reviews", dirname(&record.file));
            }
            ArtifactType::Verification => {
                context.set_phase_output(phase_id, "verifications", dirname(&record.file));
            }
            ArtifactType::TestResult => {
                context.set_phase_output(phase_id, "artifact", record.file.clone());
                context.set_phase_output(phase_id, "test_results", dirname(&record.file));
            }
            ArtifactType::Plan | ArtifactType::Implementation => {
                context.set_phase_output(phase_id, "artifact", record.file.clone());
            }
        }
    }

    for record in &state.feedback_history {
        if record.feedback_file.is_empty() {
            continue;
        }
        if let Some(phase) = phase_listing_reviewer(definition, &record.reviewer) {
            context.set_phase_output(phase.as_str(), "reviews", dirname(&record.feedback_file));
        }
    }

    context
}

/// Which phase produced an artifact. A `/<phase_id>/` path segment wins;
/// otherwise the artifact type decides, with the creator name breaking the
/// tie for `plan` artifacts (`plan-*` → planning, `test-*` → testing-setup).
fn attribute_artifact(
    definition: &WorkflowDefinition,
    record: &ArtifactRecord,
) -> Option<Phase> {
    for phase in &definition.phases {
        let id = phase.id().as_str();
        let normalized = record.file.replace('\\', "/");
        if normalized.contains(&format!("/{id}/")) {
            return Some(phase.id());
        }
    }

    match record.artifact_type {
        ArtifactType::Implementation => Some(Phase::Implementation),
        ArtifactType::TestResult => Some(Phase::TestingExecution),
        ArtifactType::Review | ArtifactType::Verification => {
            phase_listing_agent(definition, &record.created_by)
        }
        ArtifactType::Plan => {
            if record.created_by.starts_with("test-") {
                Some(Phase::TestingSetup)
            } else {
                Some(Phase::Planning)
            }
        }
    }
}

fn phase_listing_reviewer(definition: &WorkflowDefinition, reviewer: &str) -> Option<Phase> {
    definition.phases.iter().find_map(|phase| match phase {
        PhaseDefinition::Iterative(iterative)
            if iterative.reviewers.iter().any(|r| r == reviewer) =>
        {
            Some(iterative.id)
        }
        _ => None,
    })
}

fn phase_listing_agent(definition: &WorkflowDefinition, agent: &str) -> Option<Phase> {
    definition.phases.iter().find_map(|phase| match phase {
        PhaseDefinition::Iterative(iterative)
            if iterative.reviewers.iter().any(|r| r == agent)
                || iterative.verifiers.iter().any(|v| v == agent) =>
        {
            Some(iterative.id)
        }
        _ => None,
    })
}

fn dirname(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    match normalized.rfind('/') {
        Some(split) if split > 0 => normalized[..split].to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirname_strips_the_final_component() {
        assert_eq!(dirname("a/b/c.md"), "a/b");
        assert_eq!(dirname("c.md"), "");
        assert_eq!(dirname("a\\b\\c.md"), "a/b");
    }
}
