use crate::definition::defaults::default_reviewer_verifier_map;
use crate::shared::errors::ErrorCode;
use crate::shared::fs_atomic::write_atomic;
use crate::shared::logging::log_warn;
use crate::state::model::{
    AgentRunRecord, ArtifactRecord, ArtifactType, CheckpointDecision, CheckpointRecord,
    FeedbackRecord, Phase, StateUpdate, WorkflowState, WorkflowStatus,
};
use crate::state::paths::StatePaths;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("workflow `{workflow_id}` already exists")]
    AlreadyExists { workflow_id: String },
    #[error("workflow `{workflow_id}` not found")]
    NotFound { workflow_id: String },
    #[error("agent run index {index} not found for workflow `{workflow_id}`")]
    RunIndexNotFound { workflow_id: String, index: usize },
    #[error("failed to read workflow state {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write workflow state {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse workflow state {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode workflow state {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StateStoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StateStoreError::AlreadyExists { .. } => {
                ErrorCode::new("WORKFLOW_ALREADY_EXISTS", 400)
            }
            StateStoreError::NotFound { .. } => ErrorCode::new("NOT_FOUND_WORKFLOW", 404),
            StateStoreError::RunIndexNotFound { .. } => {
                ErrorCode::new("NOT_FOUND_AGENT_RUN", 404)
            }
            StateStoreError::Read { .. } => ErrorCode::new("STORAGE_READ_FAILED", 500),
            StateStoreError::Write { .. } => ErrorCode::new("STORAGE_WRITE_FAILED", 500),
            StateStoreError::Parse { .. } => ErrorCode::new("STORAGE_STATE_CORRUPT", 500),
            StateStoreError::Encode { .. } => ErrorCode::new("STORAGE_ENCODE_FAILED", 500),
        }
    }
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Persistent map `workflow_id -> WorkflowState` with a process-local
/// write-through cache. The state file is the authority; callers always
/// receive clones and mutate only through the typed operations here.
/// Single writer per workflow id is assumed.
pub struct WorkflowStateStore {
    paths: StatePaths,
    cache: Mutex<BTreeMap<String, WorkflowState>>,
}

impl WorkflowStateStore {
    pub fn new(base: &Path) -> Self {
        Self {
            paths: StatePaths::new(base),
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, WorkflowState>> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn persist(&self, state: &WorkflowState) -> Result<(), StateStoreError> {
        let path = self.paths.state_file(&state.workflow_id);
        let encoded =
            serde_json::to_vec_pretty(state).map_err(|source| StateStoreError::Encode {
                path: path.display().to_string(),
                source,
            })?;
        write_atomic(&path, &encoded).map_err(|source| StateStoreError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    fn read_from_disk(&self, workflow_id: &str) -> Result<WorkflowState, StateStoreError> {
        let path = self.paths.state_file(workflow_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StateStoreError::NotFound {
                    workflow_id: workflow_id.to_string(),
                })
            }
            Err(source) => {
                return Err(StateStoreError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|source| StateStoreError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load into cache if absent, apply `mutate`, refresh `updated_at`, and
    /// write through to disk. All typed mutations funnel through here.
    fn with_state<T>(
        &self,
        workflow_id: &str,
        mutate: impl FnOnce(&mut WorkflowState) -> Result<T, StateStoreError>,
    ) -> Result<T, StateStoreError> {
        let mut cache = self.lock_cache();
        if !cache.contains_key(workflow_id) {
            let loaded = self.read_from_disk(workflow_id)?;
            cache.insert(workflow_id.to_string(), loaded);
        }
        let state = cache
            .get_mut(workflow_id)
            .expect("state present after load");
        let result = mutate(state)?;
        state.updated_at = now_iso();
        self.persist(state)?;
        Ok(result)
    }

    pub fn create(
        &self,
        workflow_id: &str,
        phase: Phase,
    ) -> Result<WorkflowState, StateStoreError> {
        let mut cache = self.lock_cache();
        let exists_on_disk = self.paths.state_file(workflow_id).exists();
        if cache.contains_key(workflow_id) || exists_on_disk {
            return Err(StateStoreError::AlreadyExists {
                workflow_id: workflow_id.to_string(),
            });
        }
        let mut state = WorkflowState::new(workflow_id, phase, &now_iso());
        state.reviewer_verifier_map = default_reviewer_verifier_map();
        self.persist(&state)?;
        cache.insert(workflow_id.to_string(), state.clone());
        Ok(state)
    }

    pub fn get(&self, workflow_id: &str) -> Result<WorkflowState, StateStoreError> {
        let mut cache = self.lock_cache();
        if let Some(state) = cache.get(workflow_id) {
            return Ok(state.clone());
        }
        let loaded = self.read_from_disk(workflow_id)?;
        cache.insert(workflow_id.to_string(), loaded.clone());
        Ok(loaded)
    }

    pub fn get_or_create(
        &self,
        workflow_id: &str,
        phase: Phase,
    ) -> Result<WorkflowState, StateStoreError> {
        match self.get(workflow_id) {
            Ok(state) => Ok(state),
            Err(StateStoreError::NotFound { .. }) => self.create(workflow_id, phase),
            Err(err) => Err(err),
        }
    }

    /// Whole-document write-through. `updated_at` is refreshed here, never by
    /// the caller.
    pub fn save(&self, state: &WorkflowState) -> Result<WorkflowState, StateStoreError> {
        let mut updated = state.clone();
        updated.updated_at = now_iso();
        self.persist(&updated)?;
        self.lock_cache()
            .insert(updated.workflow_id.clone(), updated.clone());
        Ok(updated)
    }

    pub fn update(
        &self,
        workflow_id: &str,
        update: StateUpdate,
    ) -> Result<WorkflowState, StateStoreError> {
        self.with_state(workflow_id, |state| {
            update.apply(state);
            Ok(state.clone())
        })
    }

    pub fn add_artifact(
        &self,
        workflow_id: &str,
        iteration: u32,
        artifact_type: ArtifactType,
        file: &str,
        created_by: &str,
    ) -> Result<ArtifactRecord, StateStoreError> {
        self.with_state(workflow_id, |state| {
            let record = ArtifactRecord {
                iteration,
                artifact_type,
                file: file.to_string(),
                created_by: created_by.to_string(),
                created_at: now_iso(),
            };
            state.artifacts.push(record.clone());
            Ok(record)
        })
    }

    pub fn add_feedback(
        &self,
        workflow_id: &str,
        iteration: u32,
        reviewer: &str,
        feedback_file: &str,
    ) -> Result<FeedbackRecord, StateStoreError> {
        self.with_state(workflow_id, |state| {
            let record = FeedbackRecord {
                iteration,
                reviewer: reviewer.to_string(),
                feedback_file: feedback_file.to_string(),
                addressed: false,
                created_at: now_iso(),
            };
            state.feedback_history.push(record.clone());
            Ok(record)
        })
    }

    /// Mark every unaddressed feedback record from `reviewer` at `iteration`
    /// as addressed. Returns how many records flipped.
    pub fn mark_feedback_addressed(
        &self,
        workflow_id: &str,
        iteration: u32,
        reviewer: &str,
    ) -> Result<usize, StateStoreError> {
        self.with_state(workflow_id, |state| {
            let mut flipped = 0;
            for record in state
                .feedback_history
                .iter_mut()
                .filter(|r| r.iteration == iteration && r.reviewer == reviewer && !r.addressed)
            {
                record.addressed = true;
                flipped += 1;
            }
            Ok(flipped)
        })
    }

    /// Open a run record; the returned index must be closed through
    /// `complete_agent_run` before the next operation touches it.
    pub fn record_agent_run(
        &self,
        workflow_id: &str,
        agent: &str,
        iteration: u32,
        context_files: &[String],
        output_file: &str,
    ) -> Result<usize, StateStoreError> {
        self.with_state(workflow_id, |state| {
            state.agent_runs.push(AgentRunRecord {
                agent: agent.to_string(),
                iteration,
                context_files: context_files.to_vec(),
                output_file: output_file.to_string(),
                started_at: now_iso(),
                completed_at: None,
                success: None,
                error: None,
            });
            Ok(state.agent_runs.len() - 1)
        })
    }

    pub fn complete_agent_run(
        &self,
        workflow_id: &str,
        index: usize,
        success: bool,
        error: Option<&str>,
    ) -> Result<AgentRunRecord, StateStoreError> {
        self.with_state(workflow_id, |state| {
            let workflow_id = state.workflow_id.clone();
            let record = state
                .agent_runs
                .get_mut(index)
                .ok_or(StateStoreError::RunIndexNotFound { workflow_id, index })?;
            record.completed_at = Some(now_iso());
            record.success = Some(success);
            record.error = error.map(str::to_string);
            Ok(record.clone())
        })
    }

    /// Apply an operator decision taken at a checkpoint.
    ///
    /// | decision | iteration | status   | side effect                      |
    /// |----------|-----------|----------|----------------------------------|
    /// | continue | unchanged | working  | clear checkpoint message         |
    /// | iterate  | +1        | working  | clear message; record feedback   |
    /// | approve  | unchanged | complete | clear checkpoint message         |
    /// | reject   | unchanged | rejected | keep reason text                 |
    pub fn record_checkpoint(
        &self,
        workflow_id: &str,
        decision: CheckpointDecision,
        feedback: Option<&str>,
    ) -> Result<WorkflowState, StateStoreError> {
        let feedback_file = match (decision, feedback) {
            (CheckpointDecision::Iterate, Some(text)) => {
                Some(self.write_operator_feedback(workflow_id, text)?)
            }
            _ => None,
        };
        self.with_state(workflow_id, |state| {
            let iteration = state.iteration;
            state.checkpoints_passed.push(CheckpointRecord {
                iteration,
                decision,
                feedback: feedback.map(str::to_string),
                decided_at: now_iso(),
            });
            match decision {
                CheckpointDecision::Continue => {
                    state.status = WorkflowStatus::Working;
                    state.checkpoint_message = None;
                }
                CheckpointDecision::Iterate => {
                    if let Some(file) = feedback_file {
                        state.feedback_history.push(FeedbackRecord {
                            iteration,
                            reviewer: "user".to_string(),
                            feedback_file: file,
                            addressed: false,
                            created_at: now_iso(),
                        });
                    }
                    state.iteration += 1;
                    state.status = WorkflowStatus::Working;
                    state.checkpoint_message = None;
                }
                CheckpointDecision::Approve => {
                    state.status = WorkflowStatus::Complete;
                    state.checkpoint_message = None;
                }
                CheckpointDecision::Reject => {
                    state.status = WorkflowStatus::Rejected;
                }
            }
            Ok(state.clone())
        })
    }

    /// Operator feedback arrives as text; persist it so the next creator
    /// iteration can include it as a context file.
    fn write_operator_feedback(
        &self,
        workflow_id: &str,
        text: &str,
    ) -> Result<String, StateStoreError> {
        let state = self.get(workflow_id)?;
        let path = self
            .paths
            .default_output_dir()
            .join("feedback")
            .join(format!("user-feedback-v{}.md", state.iteration));
        write_atomic(&path, text.as_bytes()).map_err(|source| StateStoreError::Write {
            path: path.display().to_string(),
            source,
        })?;
        Ok(path.display().to_string())
    }

    pub fn pause_at_checkpoint(
        &self,
        workflow_id: &str,
        message: &str,
    ) -> Result<WorkflowState, StateStoreError> {
        self.with_state(workflow_id, |state| {
            state.status = WorkflowStatus::Checkpoint;
            state.checkpoint_message = Some(message.to_string());
            Ok(state.clone())
        })
    }

    /// Pair lookup is workflow override first, then the built-in default.
    pub fn get_verifier_for_reviewer(
        &self,
        workflow_id: &str,
        reviewer: &str,
    ) -> Result<Option<String>, StateStoreError> {
        let state = self.get(workflow_id)?;
        if let Some(verifier) = state.reviewer_verifier_map.get(reviewer) {
            return Ok(Some(verifier.clone()));
        }
        Ok(default_reviewer_verifier_map().remove(reviewer))
    }

    pub fn get_unaddressed_feedback(
        &self,
        workflow_id: &str,
        iteration: Option<u32>,
    ) -> Result<Vec<FeedbackRecord>, StateStoreError> {
        let state = self.get(workflow_id)?;
        Ok(state
            .feedback_history
            .into_iter()
            .filter(|record| {
                !record.addressed && iteration.is_none_or(|wanted| record.iteration == wanted)
            })
            .collect())
    }

    /// Latest matching artifact, most recent `created_at` first; insertion
    /// order breaks exact timestamp ties.
    pub fn get_latest_artifact_by_type(
        &self,
        workflow_id: &str,
        artifact_type: ArtifactType,
    ) -> Result<Option<ArtifactRecord>, StateStoreError> {
        let state = self.get(workflow_id)?;
        Ok(state
            .artifacts
            .into_iter()
            .enumerate()
            .filter(|(_, record)| record.artifact_type == artifact_type)
            .max_by(|(ia, a), (ib, b)| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| ia.cmp(ib))
            })
            .map(|(_, record)| record))
    }

    /// Every `*.json` in the state directory; corrupt documents are skipped
    /// with a warning rather than failing the listing.
    pub fn list(&self) -> Result<Vec<WorkflowState>, StateStoreError> {
        let dir = self.paths.state_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StateStoreError::Read {
                    path: dir.display().to_string(),
                    source,
                })
            }
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StateStoreError::Read {
                path: dir.display().to_string(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();

        let mut states = Vec::new();
        for id in ids {
            match self.get(&id) {
                Ok(state) => states.push(state),
                Err(StateStoreError::Parse { path, source }) => {
                    log_warn(
                        "state_list_skip",
                        &format!("skipping corrupt workflow state {path}: {source}"),
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(states)
    }

    pub fn delete(&self, workflow_id: &str) -> Result<(), StateStoreError> {
        let path = self.paths.state_file(workflow_id);
        let existed_in_cache = self.lock_cache().remove(workflow_id).is_some();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                if existed_in_cache {
                    Ok(())
                } else {
                    Err(StateStoreError::NotFound {
                        workflow_id: workflow_id.to_string(),
                    })
                }
            }
            Err(source) => Err(StateStoreError::Write {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}
