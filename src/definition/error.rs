use crate::shared::errors::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("failed to read workflow definition {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("workflow definition is not valid YAML: {0}")]
    Yaml(String),
    #[error("{0}")]
    Invalid(String),
    #[error("failed to write workflow definition {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode workflow definition: {0}")]
    Encode(String),
}

impl DefinitionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DefinitionError::Read { .. } => ErrorCode::new("STORAGE_READ_FAILED", 500),
            DefinitionError::Yaml(_) | DefinitionError::Invalid(_) => {
                ErrorCode::new("VALIDATION_DEFINITION", 400)
            }
            DefinitionError::Write { .. } | DefinitionError::Encode(_) => {
                ErrorCode::new("STORAGE_WRITE_FAILED", 500)
            }
        }
    }
}
