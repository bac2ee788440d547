use serde::{Deserialize, Deserializer, Serialize};

const MAX_IDENTIFIER_LEN: usize = 100;

pub fn validate_identifier_value(kind: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{kind} must be non-empty"));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(format!("{kind} must be at most {MAX_IDENTIFIER_LEN} characters"));
    }
    if value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Ok(());
    }
    Err(format!(
        "{kind} must use only ASCII letters, digits, '-' or '_'"
    ))
}

macro_rules! define_id_type {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, String> {
                validate_identifier_value($kind, raw)?;
                Ok(Self(raw.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.as_str()
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                crate::shared::serde_ext::parse_via_string(deserializer, $kind, Self::parse)
            }
        }
    };
}

define_id_type!(WorkflowId, "workflow id");
define_id_type!(AgentName, "agent name");

/// Epoch milliseconds rendered in base36, used as the generated suffix of
/// default workflow ids.
pub fn base36_timestamp(epoch_ms: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if epoch_ms == 0 {
        return "0".to_string();
    }
    let mut remaining = epoch_ms;
    let mut out = Vec::new();
    while remaining > 0 {
        out.push(DIGITS[(remaining % 36) as usize]);
        remaining /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

pub fn now_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_validation_enforces_charset_and_length() {
        assert!(validate_identifier_value("agent name", "plan-creator").is_ok());
        assert!(validate_identifier_value("agent name", "").is_err());
        assert!(validate_identifier_value("agent name", "has space").is_err());
        assert!(validate_identifier_value("agent name", &"x".repeat(101)).is_err());
    }

    #[test]
    fn workflow_id_round_trips_through_serde() {
        let id = WorkflowId::parse("wf-1").expect("parse");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"wf-1\"");
        let back: WorkflowId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn base36_renders_known_values() {
        assert_eq!(base36_timestamp(0), "0");
        assert_eq!(base36_timestamp(35), "z");
        assert_eq!(base36_timestamp(36), "10");
        assert_eq!(base36_timestamp(1_700_000_000_000), "loyw3v28");
    }
}
