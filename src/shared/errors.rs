/// Machine-readable error identity shared by every module error enum.
///
/// `code` is a stable, prefix-grouped identifier (`VALIDATION_*`,
/// `NOT_FOUND_*`, `TOKEN_BUDGET_EXCEEDED`, `AGENT_EXECUTION_*`,
/// `WORKFLOW_*`, `STORAGE_*`); `class` is the HTTP-like severity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode {
    pub code: &'static str,
    pub class: u16,
}

impl ErrorCode {
    pub const fn new(code: &'static str, class: u16) -> Self {
        Self { code, class }
    }
}

/// The core retries nothing itself; callers consult this to decide.
pub fn is_retryable(code: ErrorCode) -> bool {
    code.class >= 500 || code.code.contains("TIMEOUT") || code.code.contains("RATE_LIMIT")
}

/// Render an error for the operator: the human message first, the machine
/// code in brackets so support can grep for it.
pub fn user_message(code: ErrorCode, detail: &str) -> String {
    format!("{detail} [{}]", code.code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_covers_timeouts_rate_limits_and_server_classes() {
        assert!(is_retryable(ErrorCode::new("AGENT_EXECUTION_TIMEOUT", 500)));
        assert!(is_retryable(ErrorCode::new("PROVIDER_RATE_LIMIT", 400)));
        assert!(is_retryable(ErrorCode::new("STORAGE_WRITE_FAILED", 500)));
        assert!(!is_retryable(ErrorCode::new("VALIDATION_ARGUMENT", 400)));
        assert!(!is_retryable(ErrorCode::new("NOT_FOUND_WORKFLOW", 404)));
    }

    #[test]
    fn user_message_appends_the_code() {
        let rendered = user_message(ErrorCode::new("NOT_FOUND_WORKFLOW", 404), "workflow `wf-1` not found");
        assert_eq!(rendered, "workflow `wf-1` not found [NOT_FOUND_WORKFLOW]");
    }
}
