use crate::agent::model_map::token_limit_for;
use crate::agent::types::AgentError;

/// Budget thresholds as fractions of the model token limit. `TARGET` is only
/// consulted by the remaining-budget query.
pub const WARNING_THRESHOLD: f64 = 0.80;
pub const ERROR_THRESHOLD: f64 = 0.95;
pub const TARGET_THRESHOLD: f64 = 0.70;

pub const BUDGET_RECOMMENDATION: &str =
    "reduce context files, summarize inputs, switch to a larger-limit model, or split the task";

/// Character-count estimate, not a tokenizer: four characters per token,
/// rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

pub fn percentage(text: &str, model: &str) -> f64 {
    let limit = token_limit_for(model);
    if limit == 0 {
        return 0.0;
    }
    estimate_tokens(text) as f64 / limit as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetLevel {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetCheck {
    pub model: String,
    pub estimated_tokens: u64,
    pub limit: u64,
    pub percentage: f64,
    pub level: BudgetLevel,
    pub message: Option<String>,
}

/// Non-strict check: a warning or error is described on the result but the
/// caller decides whether to proceed.
pub fn check(text: &str, model: &str) -> BudgetCheck {
    let limit = token_limit_for(model);
    let estimated_tokens = estimate_tokens(text);
    let percentage = if limit == 0 {
        0.0
    } else {
        estimated_tokens as f64 / limit as f64
    };

    let (level, message) = if percentage >= ERROR_THRESHOLD {
        (
            BudgetLevel::Error,
            Some(format!(
                "prompt estimated at {estimated_tokens} tokens is {:.0}% of the {limit} token \
                 limit for {model}; {BUDGET_RECOMMENDATION}",
                percentage * 100.0
            )),
        )
    } else if percentage >= WARNING_THRESHOLD {
        (
            BudgetLevel::Warning,
            Some(format!(
                "prompt estimated at {estimated_tokens} tokens is {:.0}% of the {limit} token \
                 limit for {model}",
                percentage * 100.0
            )),
        )
    } else {
        (BudgetLevel::Ok, None)
    };

    BudgetCheck {
        model: model.to_string(),
        estimated_tokens,
        limit,
        percentage,
        level,
        message,
    }
}

/// Strict variant: fails before any invocation when the error threshold is
/// crossed.
pub fn check_or_throw(text: &str, model: &str) -> Result<BudgetCheck, AgentError> {
    let checked = check(text, model);
    if checked.level == BudgetLevel::Error {
        return Err(AgentError::TokenBudgetExceeded {
            estimated_tokens: checked.estimated_tokens,
            limit: checked.limit,
            model: checked.model,
        });
    }
    Ok(checked)
}

/// Tokens left under the 70% target for additional context. Saturates at
/// zero once the target is spent.
pub fn remaining_budget(text: &str, model: &str) -> u64 {
    let limit = token_limit_for(model);
    let target = (limit as f64 * TARGET_THRESHOLD) as u64;
    target.saturating_sub(estimate_tokens(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up_to_whole_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn thresholds_split_ok_warning_error() {
        let model = "claude-sonnet-4-5";
        let half = "x".repeat(200_000 * 4 / 2);
        assert_eq!(check(&half, model).level, BudgetLevel::Ok);

        let warn = "x".repeat((200_000_f64 * 4.0 * 0.85) as usize);
        let checked = check(&warn, model);
        assert_eq!(checked.level, BudgetLevel::Warning);
        assert!(checked.message.is_some());

        let over = "x".repeat((200_000_f64 * 4.0 * 0.96) as usize);
        let checked = check(&over, model);
        assert_eq!(checked.level, BudgetLevel::Error);
        assert!(checked
            .message
            .as_deref()
            .is_some_and(|m| m.contains("split the task")));
        assert!(check_or_throw(&over, model).is_err());
    }

    #[test]
    fn remaining_budget_saturates_at_zero() {
        let model = "gpt-5-2-codex";
        assert_eq!(remaining_budget("", model), (128_000_f64 * 0.7) as u64);
        let over = "x".repeat(128_000 * 4);
        assert_eq!(remaining_budget(&over, model), 0);
    }
}
