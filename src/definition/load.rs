use crate::definition::error::DefinitionError;
use crate::definition::model::{
    IterativePhase, PhaseDefinition, TestExecutionPhase, VariableValue, WorkflowDefinition,
};
use crate::shared::logging::log_warn;
use crate::state::model::Phase;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const DEFAULT_OUTPUT_DIR: &str = ".cursor/agents/workflow";

pub fn load_from_file(path: &Path) -> Result<WorkflowDefinition, DefinitionError> {
    let raw = fs::read_to_string(path).map_err(|source| DefinitionError::Read {
        path: path.display().to_string(),
        source,
    })?;
    load_from_string(&raw)
}

/// Parse, validate, and normalize a workflow definition.
///
/// Validation is order-sensitive and short-circuits on the first failure
/// with a human-readable message: (1) the document is an object, (2)
/// `name`/`version`/`phases` are present and well-typed, (3) each phase has
/// an `id` and a known `type`, (4) iterative phases carry a creator and
/// equally long reviewer/verifier sequences, (5) test-execution phases carry
/// `tester` and `fixer`.
pub fn load_from_string(yaml: &str) -> Result<WorkflowDefinition, DefinitionError> {
    let value: Value =
        serde_yaml::from_str(yaml).map_err(|err| DefinitionError::Yaml(err.to_string()))?;
    let root = value
        .as_mapping()
        .ok_or_else(|| invalid("workflow definition must be a YAML object"))?;

    let name = match root.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => return Err(invalid("workflow `name` is required and must be a non-empty string")),
    };
    let version = match root.get("version").and_then(Value::as_u64) {
        Some(version) if version >= 1 => version as u32,
        _ => return Err(invalid("workflow `version` is required and must be a positive integer")),
    };
    let phase_values = match root.get("phases").and_then(Value::as_sequence) {
        Some(seq) if !seq.is_empty() => seq,
        _ => return Err(invalid("workflow `phases` is required and must be a non-empty sequence")),
    };

    let mut phases = Vec::with_capacity(phase_values.len());
    for (index, phase_value) in phase_values.iter().enumerate() {
        phases.push(parse_phase(index, phase_value)?);
    }

    let mut seen = Vec::new();
    for phase in &phases {
        if seen.contains(&phase.id()) {
            return Err(invalid(&format!("duplicate phase id `{}`", phase.id())));
        }
        seen.push(phase.id());
    }

    let description = root
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);
    let input_file = root
        .get("input_file")
        .and_then(Value::as_str)
        .map(str::to_string);
    let explicit_output_dir = root
        .get("output_dir")
        .and_then(Value::as_str)
        .map(str::to_string);
    let variables = parse_variables(root)?;

    Ok(normalize(
        name,
        version,
        description,
        variables,
        explicit_output_dir,
        input_file,
        phases,
    ))
}

fn invalid(message: &str) -> DefinitionError {
    DefinitionError::Invalid(message.to_string())
}

fn parse_phase(index: usize, value: &Value) -> Result<PhaseDefinition, DefinitionError> {
    let mapping = value
        .as_mapping()
        .ok_or_else(|| invalid(&format!("phase {} must be a YAML object", index + 1)))?;

    let id_raw = mapping
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(&format!("phase {} is missing required field `id`", index + 1)))?;
    let id = Phase::parse(id_raw)
        .map_err(|err| invalid(&format!("phase `{id_raw}`: {err}")))?;

    let phase_type = mapping.get("type").and_then(Value::as_str).ok_or_else(|| {
        invalid(&format!("phase `{id_raw}` is missing required field `type`"))
    })?;

    match phase_type {
        "iterative" => parse_iterative_phase(id, id_raw, mapping),
        "test-execution" => parse_test_execution_phase(id, id_raw, mapping),
        other => Err(invalid(&format!(
            "phase `{id_raw}` has unknown type `{other}`; expected `iterative` or `test-execution`"
        ))),
    }
}

fn parse_iterative_phase(
    id: Phase,
    id_raw: &str,
    mapping: &Mapping,
) -> Result<PhaseDefinition, DefinitionError> {
    let creator = mapping
        .get("creator")
        .and_then(Value::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| invalid(&format!("iterative phase `{id_raw}` requires `creator`")))?
        .to_string();

    let reviewers = parse_agent_sequence(mapping, "reviewers", id_raw)?;
    let verifiers = parse_agent_sequence(mapping, "verifiers", id_raw)?;
    if reviewers.len() != verifiers.len() {
        return Err(invalid(&format!(
            "phase `{id_raw}` must declare the same number of reviewers ({}) and verifiers ({}); \
             reviewer i is paired with verifier i",
            reviewers.len(),
            verifiers.len()
        )));
    }

    Ok(PhaseDefinition::Iterative(IterativePhase {
        id,
        creator,
        reviewers,
        verifiers,
        context: parse_string_sequence(mapping, "context", id_raw)?,
        outputs: parse_outputs(mapping, id_raw)?,
        min_iterations: parse_min_iterations(mapping, id_raw)?,
        max_iterations: parse_max_iterations(mapping, id_raw)?,
        checkpoint_message: mapping
            .get("checkpoint_message")
            .and_then(Value::as_str)
            .map(str::to_string),
    }))
}

fn parse_test_execution_phase(
    id: Phase,
    id_raw: &str,
    mapping: &Mapping,
) -> Result<PhaseDefinition, DefinitionError> {
    let tester = mapping
        .get("tester")
        .and_then(Value::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| invalid(&format!("test-execution phase `{id_raw}` requires `tester`")))?
        .to_string();
    let fixer = mapping
        .get("fixer")
        .and_then(Value::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| invalid(&format!("test-execution phase `{id_raw}` requires `fixer`")))?
        .to_string();

    if tester == fixer {
        log_warn(
            "definition_tester_fixer",
            &format!("phase `{id_raw}` uses the same agent `{tester}` as tester and fixer"),
        );
    }

    Ok(PhaseDefinition::TestExecution(TestExecutionPhase {
        id,
        tester,
        fixer,
        context: parse_string_sequence(mapping, "context", id_raw)?,
        outputs: parse_outputs(mapping, id_raw)?,
        min_iterations: parse_min_iterations(mapping, id_raw)?,
        max_iterations: parse_max_iterations(mapping, id_raw)?,
    }))
}

fn parse_agent_sequence(
    mapping: &Mapping,
    key: &str,
    id_raw: &str,
) -> Result<Vec<String>, DefinitionError> {
    let seq = mapping
        .get(key)
        .and_then(Value::as_sequence)
        .filter(|seq| !seq.is_empty())
        .ok_or_else(|| {
            invalid(&format!(
                "iterative phase `{id_raw}` requires `{key}` as a non-empty sequence of agent names"
            ))
        })?;
    seq.iter()
        .map(|entry| {
            entry
                .as_str()
                .filter(|v| !v.trim().is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    invalid(&format!(
                        "phase `{id_raw}` field `{key}` must contain only non-empty strings"
                    ))
                })
        })
        .collect()
}

fn parse_string_sequence(
    mapping: &Mapping,
    key: &str,
    id_raw: &str,
) -> Result<Vec<String>, DefinitionError> {
    let Some(value) = mapping.get(key) else {
        return Ok(Vec::new());
    };
    let seq = value.as_sequence().ok_or_else(|| {
        invalid(&format!("phase `{id_raw}` field `{key}` must be a sequence of strings"))
    })?;
    seq.iter()
        .map(|entry| {
            entry.as_str().map(str::to_string).ok_or_else(|| {
                invalid(&format!(
                    "phase `{id_raw}` field `{key}` must contain only strings"
                ))
            })
        })
        .collect()
}

fn parse_outputs(
    mapping: &Mapping,
    id_raw: &str,
) -> Result<Option<BTreeMap<String, String>>, DefinitionError> {
    let Some(value) = mapping.get("outputs") else {
        return Ok(None);
    };
    let map = value.as_mapping().ok_or_else(|| {
        invalid(&format!("phase `{id_raw}` field `outputs` must be a mapping"))
    })?;
    let mut outputs = BTreeMap::new();
    for (key, entry) in map {
        let (Some(key), Some(entry)) = (key.as_str(), entry.as_str()) else {
            return Err(invalid(&format!(
                "phase `{id_raw}` field `outputs` must map string keys to string templates"
            )));
        };
        outputs.insert(key.to_string(), entry.to_string());
    }
    Ok(Some(outputs))
}

fn parse_min_iterations(mapping: &Mapping, id_raw: &str) -> Result<u32, DefinitionError> {
    match mapping.get("min_iterations") {
        None => Ok(1),
        Some(value) => value
            .as_u64()
            .filter(|v| *v >= 1)
            .map(|v| v as u32)
            .ok_or_else(|| {
                invalid(&format!(
                    "phase `{id_raw}` field `min_iterations` must be a positive integer"
                ))
            }),
    }
}

fn parse_max_iterations(mapping: &Mapping, id_raw: &str) -> Result<Option<u32>, DefinitionError> {
    match mapping.get("max_iterations") {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .filter(|v| *v >= 1)
            .map(|v| Some(v as u32))
            .ok_or_else(|| {
                invalid(&format!(
                    "phase `{id_raw}` field `max_iterations` must be a positive integer"
                ))
            }),
    }
}

fn parse_variables(root: &Mapping) -> Result<BTreeMap<String, VariableValue>, DefinitionError> {
    let Some(value) = root.get("variables") else {
        return Ok(BTreeMap::new());
    };
    let map = value
        .as_mapping()
        .ok_or_else(|| invalid("workflow `variables` must be a mapping"))?;
    let mut variables = BTreeMap::new();
    for (key, entry) in map {
        let Some(key) = key.as_str() else {
            return Err(invalid("workflow `variables` keys must be strings"));
        };
        let parsed = match entry {
            Value::Bool(v) => VariableValue::Bool(*v),
            Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    VariableValue::Integer(v)
                } else {
                    VariableValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(v) => VariableValue::String(v.clone()),
            _ => {
                return Err(invalid(&format!(
                    "variable `{key}` must be a string, number, or boolean"
                )))
            }
        };
        variables.insert(key.to_string(), parsed);
    }
    Ok(variables)
}

/// Apply defaults: built-in variables (`output_dir`, `iteration`) merge
/// under user variables, and `output_dir` falls back to the `output_dir`
/// variable, then the built-in default.
fn normalize(
    name: String,
    version: u32,
    description: Option<String>,
    mut variables: BTreeMap<String, VariableValue>,
    explicit_output_dir: Option<String>,
    input_file: Option<String>,
    phases: Vec<PhaseDefinition>,
) -> WorkflowDefinition {
    variables
        .entry("output_dir".to_string())
        .or_insert_with(|| VariableValue::String(DEFAULT_OUTPUT_DIR.to_string()));
    variables
        .entry("iteration".to_string())
        .or_insert(VariableValue::Integer(1));

    let output_dir = explicit_output_dir.unwrap_or_else(|| {
        match variables.get("output_dir") {
            Some(VariableValue::String(dir)) => dir.clone(),
            _ => DEFAULT_OUTPUT_DIR.to_string(),
        }
    });

    WorkflowDefinition {
        name,
        version,
        description,
        variables,
        output_dir,
        input_file,
        phases,
    }
}
