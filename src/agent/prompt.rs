use crate::shared::logging::log_warn;
use std::fs;
use std::path::PathBuf;

/// Render context files as fenced blocks. Unreadable files are skipped with
/// a warning; a missing context file never fails an invocation.
pub fn render_context_block(context_files: &[PathBuf]) -> String {
    let mut blocks = Vec::new();
    for path in context_files {
        match fs::read_to_string(path) {
            Ok(content) => {
                blocks.push(format!("## File: {}\n```\n{}\n```", path.display(), content));
            }
            Err(err) => {
                log_warn(
                    "context_file_skip",
                    &format!("skipping unreadable context file {}: {err}", path.display()),
                );
            }
        }
    }
    blocks.join("\n\n")
}

/// Frame the user prompt with context and, when present, prior session
/// history rendered as Markdown.
pub fn compose_prompt(user_prompt: &str, context_block: &str, history: Option<&str>) -> String {
    let body = if context_block.is_empty() {
        user_prompt.to_string()
    } else {
        format!("# Context\n{context_block}\n---\n\n# Instructions\n\n{user_prompt}")
    };
    match history {
        Some(history) if !history.is_empty() => format!("{history}\n\n{body}"),
        _ => body,
    }
}
