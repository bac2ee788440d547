use crate::shared::errors::ErrorCode;
use crate::shared::fs_atomic::write_atomic;
use crate::shared::logging::{log_debug, log_warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const MAX_SESSION_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to read session {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write session {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse session {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::Read { .. } => ErrorCode::new("STORAGE_READ_FAILED", 500),
            SessionError::Write { .. } => ErrorCode::new("STORAGE_WRITE_FAILED", 500),
            SessionError::Parse { .. } => ErrorCode::new("STORAGE_STATE_CORRUPT", 500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionEntry {
    pub request: String,
    pub response: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionHistory {
    #[serde(default)]
    pub history: Vec<SessionEntry>,
}

/// Prior turns threaded into prompts. Cleanup runs best-effort and never
/// blocks an operation.
pub trait SessionStore: Send + Sync {
    fn load_session(
        &self,
        session_id: &str,
        agent_type: &str,
    ) -> Result<Option<SessionHistory>, SessionError>;
    fn save_session(
        &self,
        session_id: &str,
        agent_type: &str,
        request: &str,
        response: &str,
    ) -> Result<(), SessionError>;
    fn cleanup_old_sessions(&self);
}

/// One JSON document per (agent_type, session_id) under the sessions root.
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn session_file(&self, session_id: &str, agent_type: &str) -> PathBuf {
        self.root.join(agent_type).join(format!("{session_id}.json"))
    }
}

impl SessionStore for FileSessionStore {
    fn load_session(
        &self,
        session_id: &str,
        agent_type: &str,
    ) -> Result<Option<SessionHistory>, SessionError> {
        let path = self.session_file(session_id, agent_type);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SessionError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        let history = serde_json::from_str(&raw).map_err(|source| SessionError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Some(history))
    }

    fn save_session(
        &self,
        session_id: &str,
        agent_type: &str,
        request: &str,
        response: &str,
    ) -> Result<(), SessionError> {
        let path = self.session_file(session_id, agent_type);
        let mut history = self
            .load_session(session_id, agent_type)?
            .unwrap_or_default();
        history.history.push(SessionEntry {
            request: request.to_string(),
            response: response.to_string(),
            created_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        });
        let encoded = serde_json::to_vec_pretty(&history).map_err(|source| SessionError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        write_atomic(&path, &encoded).map_err(|source| SessionError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    fn cleanup_old_sessions(&self) {
        let Ok(agent_dirs) = fs::read_dir(&self.root) else {
            return;
        };
        let now = SystemTime::now();
        let mut removed = 0usize;
        for agent_dir in agent_dirs.flatten() {
            let Ok(entries) = fs::read_dir(agent_dir.path()) else {
                continue;
            };
            for entry in entries.flatten() {
                let Ok(metadata) = entry.metadata() else {
                    continue;
                };
                let Ok(modified) = metadata.modified() else {
                    continue;
                };
                let expired = now
                    .duration_since(modified)
                    .map(|age| age > MAX_SESSION_AGE)
                    .unwrap_or(false);
                if expired {
                    match fs::remove_file(entry.path()) {
                        Ok(()) => removed += 1,
                        Err(err) => log_warn(
                            "session_cleanup",
                            &format!("failed to remove {}: {err}", entry.path().display()),
                        ),
                    }
                }
            }
        }
        if removed > 0 {
            log_debug("session_cleanup", &format!("removed {removed} aged sessions"));
        }
    }
}

/// Render prior turns as Markdown for prepending to a user prompt. Empty
/// history renders to an empty string.
pub fn render_history_markdown(history: &SessionHistory) -> String {
    if history.history.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Previous conversation\n");
    for entry in &history.history {
        out.push_str("\n**User:**\n");
        out.push_str(&entry.request);
        out.push_str("\n\n**Assistant:**\n");
        out.push_str(&entry.response);
        out.push('\n');
    }
    out
}
