use crate::agent::types::AgentError;
use crate::shared::logging::log_warn;

/// Logical model identifiers exposed at the operation surface, mapped
/// one-to-one to API names through a fixed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelId {
    ClaudeOpus45,
    ClaudeSonnet45,
    Gpt52Codex,
}

pub const DEFAULT_MODEL: ModelId = ModelId::ClaudeSonnet45;

/// Token limit applied when the model string is not one of the known
/// logical ids.
pub const FALLBACK_TOKEN_LIMIT: u64 = 100_000;

impl ModelId {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelId::ClaudeOpus45 => "claude-opus-4-5",
            ModelId::ClaudeSonnet45 => "claude-sonnet-4-5",
            ModelId::Gpt52Codex => "gpt-5-2-codex",
        }
    }

    pub fn api_name(self) -> &'static str {
        match self {
            ModelId::ClaudeOpus45 => "claude-opus-4-5",
            ModelId::ClaudeSonnet45 => "claude-sonnet-4-5",
            ModelId::Gpt52Codex => "gpt-5.2-codex",
        }
    }

    pub fn token_limit(self) -> u64 {
        match self {
            ModelId::ClaudeOpus45 | ModelId::ClaudeSonnet45 => 200_000,
            ModelId::Gpt52Codex => 128_000,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AgentError> {
        match raw.trim() {
            "claude-opus-4-5" => Ok(ModelId::ClaudeOpus45),
            "claude-sonnet-4-5" => Ok(ModelId::ClaudeSonnet45),
            "gpt-5-2-codex" => Ok(ModelId::Gpt52Codex),
            other => Err(AgentError::UnknownModel {
                model: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Model precedence: explicit override, else the agent definition's
/// declared model, else the pipeline default. An unknown override is an
/// error; an unknown declared model falls back to the default with a
/// warning, since agent files are edited by hand.
pub fn resolve_model(
    override_model: Option<&str>,
    declared_model: Option<&str>,
) -> Result<ModelId, AgentError> {
    if let Some(raw) = override_model {
        return ModelId::parse(raw);
    }
    if let Some(raw) = declared_model {
        return Ok(ModelId::parse(raw).unwrap_or_else(|_| {
            log_warn(
                "model_resolve",
                &format!("agent declares unknown model `{raw}`; using {DEFAULT_MODEL}"),
            );
            DEFAULT_MODEL
        }));
    }
    Ok(DEFAULT_MODEL)
}

/// Token limit for a raw model string; unknown strings use the fallback.
pub fn token_limit_for(model: &str) -> u64 {
    ModelId::parse(model)
        .map(ModelId::token_limit)
        .unwrap_or(FALLBACK_TOKEN_LIMIT)
}
