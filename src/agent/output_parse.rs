use crate::agent::types::OutcomeKind;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Primary text pulled out of an agent's stdout. Structured envelopes carry
/// `result` on success and `error` on agent-level failure, with `content`
/// as a fallback; anything unparseable passes through raw.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedOutput {
    pub text: String,
    pub agent_error: bool,
}

pub fn extract_primary_output(stdout: &str) -> ExtractedOutput {
    let Ok(value) = serde_json::from_str::<Value>(stdout.trim()) else {
        return ExtractedOutput {
            text: stdout.to_string(),
            agent_error: false,
        };
    };
    let Some(object) = value.as_object() else {
        return ExtractedOutput {
            text: stdout.to_string(),
            agent_error: false,
        };
    };

    let agent_error = object
        .get("is_error")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let primary = if agent_error {
        object.get("error")
    } else {
        object.get("result")
    };
    let text = primary
        .or_else(|| object.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| stdout.to_string());

    ExtractedOutput { text, agent_error }
}

/// Exit-code taxonomy: 124 is the runner's timeout, 143 a SIGTERM. Either
/// with a produced result still counts (graceful termination / partial);
/// anything else non-zero is a process failure.
pub fn classify_exit(exit_code: i32, has_result: bool, agent_error: bool) -> OutcomeKind {
    if agent_error {
        return OutcomeKind::AgentError;
    }
    match exit_code {
        0 => OutcomeKind::Success,
        143 if has_result => OutcomeKind::Success,
        124 if has_result => OutcomeKind::Partial,
        _ => OutcomeKind::ProcessError,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    Approve,
    Iterate,
    Reject,
}

impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::Approve => "APPROVE",
            Recommendation::Iterate => "ITERATE",
            Recommendation::Reject => "REJECT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationSummary {
    pub recommendation: Option<Recommendation>,
    pub critical_issues: u32,
    pub total_issues: u32,
    pub passed: bool,
}

fn recommendation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:recommendation|verdict|decision)\s*:\s*(approve|iterate|reject)")
            .expect("recommendation regex")
    })
}

const CRITICAL_MARKERS: [&str; 4] = ["critical:", "severe:", "blocker:", "[critical]"];
const ISSUE_TAGS: [&str; 4] = ["[critical]", "[major]", "[minor]", "[info]"];
const CLEAN_PHRASES: [&str; 3] = ["no issues", "looks good", "approved"];

fn is_list_item(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("- ")
        || trimmed.starts_with("* ")
        || trimmed.starts_with("+ ")
        || trimmed
            .split_once('.')
            .is_some_and(|(head, rest)| {
                !head.is_empty()
                    && head.chars().all(|ch| ch.is_ascii_digit())
                    && rest.starts_with(' ')
            })
}

/// Heuristic classification of a verifier's output: a recommendation line,
/// issue counts from bulleted items, and the pass rule
/// `recommendation == APPROVE || (pass language && no fail language &&
/// critical count == 0)`.
pub fn parse_verification_output(text: &str) -> VerificationSummary {
    let recommendation = recommendation_regex()
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|matched| match matched.as_str().to_ascii_lowercase().as_str() {
            "approve" => Recommendation::Approve,
            "iterate" => Recommendation::Iterate,
            _ => Recommendation::Reject,
        });

    let mut critical_issues = 0u32;
    let mut total_issues = 0u32;
    for line in text.lines() {
        if !is_list_item(line) {
            continue;
        }
        let lowered = line.to_ascii_lowercase();
        if CLEAN_PHRASES.iter().any(|phrase| lowered.contains(phrase)) {
            continue;
        }
        let tagged = ISSUE_TAGS.iter().any(|tag| lowered.contains(tag));
        let critical = CRITICAL_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker));
        if tagged || critical {
            total_issues += 1;
        }
        if critical {
            critical_issues += 1;
        }
    }

    let lowered = text.to_ascii_lowercase();
    let pass_language = lowered.contains("passed") || lowered.contains("approved");
    let fail_language = lowered.contains("failed") || lowered.contains("issues");
    let passed = recommendation == Some(Recommendation::Approve)
        || (pass_language && !fail_language && critical_issues == 0);

    VerificationSummary {
        recommendation,
        critical_issues,
        total_issues,
        passed,
    }
}

/// Pull JSON out of free-form agent text: a pure document first, then a
/// ```json fence, then the first balanced object or array substring.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let Some(start) = trimmed.find("```json") {
        let body = &trimmed[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            if let Ok(value) = serde_json::from_str::<Value>(body[..end].trim()) {
                return Some(value);
            }
        }
    }

    first_balanced_json(trimmed)
}

fn first_balanced_json(text: &str) -> Option<Value> {
    let open_at = text.find(['{', '['])?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, byte) in bytes[open_at..].iter().enumerate() {
        match byte {
            b'\\' if in_string => {
                escaped = !escaped;
                continue;
            }
            b'"' if !escaped => in_string = !in_string,
            b'{' | b'[' if !in_string => depth += 1,
            b'}' | b']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[open_at..open_at + offset + 1];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
        escaped = false;
    }
    None
}

/// Minimal structural validation: `type` ∈ {object, array, string, number,
/// boolean}, `required` keys on objects, recursive `properties` / `items`.
pub fn validate_schema(value: &Value, schema: &Value) -> Result<(), String> {
    let expected = schema.get("type").and_then(Value::as_str);
    match expected {
        Some("object") => {
            let Some(object) = value.as_object() else {
                return Err(format!("expected object, got {}", type_name(value)));
            };
            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for key in required.iter().filter_map(Value::as_str) {
                    if !object.contains_key(key) {
                        return Err(format!("missing required key `{key}`"));
                    }
                }
            }
            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (key, property_schema) in properties {
                    if let Some(property) = object.get(key) {
                        validate_schema(property, property_schema)
                            .map_err(|err| format!("`{key}`: {err}"))?;
                    }
                }
            }
            Ok(())
        }
        Some("array") => {
            let Some(items) = value.as_array() else {
                return Err(format!("expected array, got {}", type_name(value)));
            };
            if let Some(item_schema) = schema.get("items") {
                for (index, item) in items.iter().enumerate() {
                    validate_schema(item, item_schema)
                        .map_err(|err| format!("[{index}]: {err}"))?;
                }
            }
            Ok(())
        }
        Some("string") if value.is_string() => Ok(()),
        Some("number") if value.is_number() => Ok(()),
        Some("boolean") if value.is_boolean() => Ok(()),
        Some(expected) => Err(format!("expected {expected}, got {}", type_name(value))),
        None => Ok(()),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
