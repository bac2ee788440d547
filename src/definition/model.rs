use crate::state::model::Phase;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Primitive workflow variable. Untagged so YAML scalars map naturally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl VariableValue {
    pub fn render(&self) -> String {
        match self {
            VariableValue::Bool(v) => v.to_string(),
            VariableValue::Integer(v) => v.to_string(),
            VariableValue::Float(v) => v.to_string(),
            VariableValue::String(v) => v.clone(),
        }
    }
}

/// Declarative workflow description, immutable after load. Producing one of
/// these goes through `load::load_from_string`, which validates and
/// normalizes; `output_dir` and `min_iterations` are always populated here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, VariableValue>,
    pub output_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_file: Option<String>,
    pub phases: Vec<PhaseDefinition>,
}

impl WorkflowDefinition {
    pub fn phase(&self, phase: Phase) -> Option<&PhaseDefinition> {
        self.phases.iter().find(|p| p.id() == phase)
    }

    pub fn first_phase(&self) -> Option<Phase> {
        self.phases.first().map(PhaseDefinition::id)
    }

    /// The phase after `phase` in definition order, `None` at the end.
    pub fn next_phase(&self, phase: Phase) -> Option<Phase> {
        let index = self.phases.iter().position(|p| p.id() == phase)?;
        self.phases.get(index + 1).map(PhaseDefinition::id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum PhaseDefinition {
    #[serde(rename = "iterative")]
    Iterative(IterativePhase),
    #[serde(rename = "test-execution")]
    TestExecution(TestExecutionPhase),
}

impl PhaseDefinition {
    pub fn id(&self) -> Phase {
        match self {
            PhaseDefinition::Iterative(phase) => phase.id,
            PhaseDefinition::TestExecution(phase) => phase.id,
        }
    }

    pub fn context(&self) -> &[String] {
        match self {
            PhaseDefinition::Iterative(phase) => &phase.context,
            PhaseDefinition::TestExecution(phase) => &phase.context,
        }
    }

    pub fn outputs(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            PhaseDefinition::Iterative(phase) => phase.outputs.as_ref(),
            PhaseDefinition::TestExecution(phase) => phase.outputs.as_ref(),
        }
    }

    pub fn min_iterations(&self) -> u32 {
        match self {
            PhaseDefinition::Iterative(phase) => phase.min_iterations,
            PhaseDefinition::TestExecution(phase) => phase.min_iterations,
        }
    }

    pub fn max_iterations(&self) -> Option<u32> {
        match self {
            PhaseDefinition::Iterative(phase) => phase.max_iterations,
            PhaseDefinition::TestExecution(phase) => phase.max_iterations,
        }
    }
}

/// A creator/reviewers/verifiers phase. Reviewer `i` is paired with
/// verifier `i`; the loader guarantees both sequences are non-empty and of
/// equal length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterativePhase {
    pub id: Phase,
    pub creator: String,
    pub reviewers: Vec<String>,
    pub verifiers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<BTreeMap<String, String>>,
    pub min_iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_message: Option<String>,
}

/// A tester/fixer phase. The fixer is conventionally a different agent from
/// the tester; the loader warns when they coincide but does not reject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestExecutionPhase {
    pub id: Phase,
    pub tester: String,
    pub fixer: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<BTreeMap<String, String>>,
    pub min_iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}
