use crate::agent::model_map::ModelId;
use crate::ops::OperationError;
use crate::shared::ids::{validate_identifier_value, AgentName, WorkflowId};
use crate::shared::logging::log_warn;
use regex::Regex;
use std::path::{Path, PathBuf};

pub const MAX_PROMPT_LEN: usize = 50_000;
pub const MAX_CWD_LEN: usize = 1_000;
pub const MAX_SESSION_ID_LEN: usize = 100;
pub const MAX_EXTRA_ARGS: usize = 20;
pub const MAX_EXTRA_ARG_LEN: usize = 1_000;
pub const MAX_CONTEXT_FILES: usize = 20;
pub const MAX_CONTEXT_GLOBS: usize = 10;
pub const MAX_CONTEXT_GLOB_LEN: usize = 500;
pub const MAX_CONTEXT_DATA_BYTES: usize = 50 * 1024;
pub const MAX_PARALLEL_AGENTS: usize = 10;
pub const MIN_REJECT_REASON_LEN: usize = 10;

pub fn validate_agent_name(name: &str) -> Result<(), OperationError> {
    AgentName::parse(name)
        .map(|_| ())
        .map_err(OperationError::Validation)
}

pub fn validate_workflow_id(workflow_id: &str) -> Result<(), OperationError> {
    WorkflowId::parse(workflow_id)
        .map(|_| ())
        .map_err(OperationError::Validation)
}

pub fn validate_prompt(prompt: &str) -> Result<(), OperationError> {
    if prompt.trim().is_empty() {
        return Err(OperationError::validation("prompt must be non-empty"));
    }
    if prompt.len() > MAX_PROMPT_LEN {
        return Err(OperationError::validation(format!(
            "prompt must be at most {MAX_PROMPT_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_cwd(cwd: &str) -> Result<(), OperationError> {
    if cwd.len() > MAX_CWD_LEN {
        return Err(OperationError::validation(format!(
            "cwd must be at most {MAX_CWD_LEN} characters"
        )));
    }
    if cwd.contains("..") {
        return Err(OperationError::validation("cwd must not contain `..`"));
    }
    if cwd.contains('\0') {
        return Err(OperationError::validation("cwd must not contain NUL bytes"));
    }
    Ok(())
}

pub fn validate_session_id(session_id: &str) -> Result<(), OperationError> {
    validate_identifier_value("session id", session_id).map_err(OperationError::Validation)?;
    if session_id.len() > MAX_SESSION_ID_LEN {
        return Err(OperationError::validation(format!(
            "session id must be at most {MAX_SESSION_ID_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_extra_args(extra_args: &[String]) -> Result<(), OperationError> {
    if extra_args.len() > MAX_EXTRA_ARGS {
        return Err(OperationError::validation(format!(
            "extra_args must have at most {MAX_EXTRA_ARGS} items"
        )));
    }
    for arg in extra_args {
        if arg.len() > MAX_EXTRA_ARG_LEN {
            return Err(OperationError::validation(format!(
                "each extra arg must be at most {MAX_EXTRA_ARG_LEN} characters"
            )));
        }
    }
    Ok(())
}

pub fn validate_context_files(context_files: &[String]) -> Result<(), OperationError> {
    if context_files.len() > MAX_CONTEXT_FILES {
        return Err(OperationError::validation(format!(
            "context_files must have at most {MAX_CONTEXT_FILES} entries"
        )));
    }
    Ok(())
}

pub fn validate_context_globs(context_globs: &[String]) -> Result<(), OperationError> {
    if context_globs.len() > MAX_CONTEXT_GLOBS {
        return Err(OperationError::validation(format!(
            "context_globs must have at most {MAX_CONTEXT_GLOBS} patterns"
        )));
    }
    for pattern in context_globs {
        if pattern.len() > MAX_CONTEXT_GLOB_LEN {
            return Err(OperationError::validation(format!(
                "each context glob must be at most {MAX_CONTEXT_GLOB_LEN} characters"
            )));
        }
    }
    Ok(())
}

pub fn validate_context_data(context_data: &serde_json::Value) -> Result<(), OperationError> {
    let serialized = serde_json::to_string(context_data)
        .map_err(|err| OperationError::validation(format!("context_data is not serializable: {err}")))?;
    if serialized.len() > MAX_CONTEXT_DATA_BYTES {
        return Err(OperationError::validation(format!(
            "context_data must serialize to at most {MAX_CONTEXT_DATA_BYTES} bytes"
        )));
    }
    Ok(())
}

pub fn validate_model(model: &str) -> Result<(), OperationError> {
    ModelId::parse(model)
        .map(|_| ())
        .map_err(|err| OperationError::validation(err.to_string()))
}

pub fn validate_reject_reason(reason: &str) -> Result<(), OperationError> {
    if reason.trim().len() < MIN_REJECT_REASON_LEN {
        return Err(OperationError::validation(format!(
            "reject reason must be at least {MIN_REJECT_REASON_LEN} characters"
        )));
    }
    Ok(())
}

/// Expand a glob pattern rooted at `base` into existing files. `**` crosses
/// directory separators, `*` and `?` stay within one component. Patterns
/// that match nothing expand to nothing; a malformed pattern is skipped with
/// a warning rather than failing the operation.
pub fn expand_context_glob(base: &Path, pattern: &str) -> Vec<PathBuf> {
    let Some(regex) = glob_to_regex(pattern) else {
        log_warn(
            "context_glob",
            &format!("could not compile context glob `{pattern}`; skipping it"),
        );
        return Vec::new();
    };

    let mut matches: Vec<PathBuf> = walkdir::WalkDir::new(base)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(base).ok()?;
            let candidate = relative.to_string_lossy().replace('\\', "/");
            regex.is_match(&candidate).then(|| entry.path().to_path_buf())
        })
        .collect();
    matches.sort();
    matches
}

fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut regex = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // `**/` may match zero directories.
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        regex.push_str("(?:.*/)?");
                    } else {
                        regex.push_str(".*");
                    }
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push_str("[^/]"),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    Regex::new(&regex).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn limits_reject_out_of_range_arguments() {
        assert!(validate_prompt("do the thing").is_ok());
        assert!(validate_prompt(&"x".repeat(MAX_PROMPT_LEN + 1)).is_err());
        assert!(validate_cwd("/work/project").is_ok());
        assert!(validate_cwd("/work/../etc").is_err());
        assert!(validate_agent_name("plan-creator").is_ok());
        assert!(validate_agent_name("bad name").is_err());
        assert!(validate_model("claude-opus-4-5").is_ok());
        assert!(validate_model("gpt-6").is_err());
        assert!(validate_reject_reason("too short").is_err());
        assert!(validate_reject_reason("architecture flawed: needs rework").is_ok());
    }

    #[test]
    fn glob_expansion_matches_within_and_across_directories() {
        let temp = tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("src/nested")).expect("mkdir");
        fs::write(temp.path().join("src/a.rs"), "a").expect("write");
        fs::write(temp.path().join("src/nested/b.rs"), "b").expect("write");
        fs::write(temp.path().join("src/c.txt"), "c").expect("write");

        let single = expand_context_glob(temp.path(), "src/*.rs");
        assert_eq!(single.len(), 1);

        let recursive = expand_context_glob(temp.path(), "src/**/*.rs");
        assert_eq!(recursive.len(), 2);

        assert!(expand_context_glob(temp.path(), "none/*.md").is_empty());
    }
}
