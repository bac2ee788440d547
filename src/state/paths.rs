use std::path::{Path, PathBuf};

pub const AGENTS_ROOT: &str = ".cursor/agents";

/// Owner of the on-disk layout under an operator-supplied base directory.
///
/// ```text
/// <base>/.cursor/agents/
///   state/<workflow_id>.json
///   workflows/<name>.yaml
///   workflow/                 default artifact output_dir
///   agents/outputs/
///   agents/verifications/
///   sessions/<agent_type>/<session_id>.json
/// ```
#[derive(Debug, Clone)]
pub struct StatePaths {
    base: PathBuf,
}

impl StatePaths {
    pub fn new(base: &Path) -> Self {
        Self {
            base: base.to_path_buf(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn agents_root(&self) -> PathBuf {
        self.base.join(AGENTS_ROOT)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.agents_root().join("state")
    }

    pub fn state_file(&self, workflow_id: &str) -> PathBuf {
        self.state_dir().join(format!("{workflow_id}.json"))
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.agents_root().join("workflows")
    }

    pub fn workflow_file(&self, name: &str) -> PathBuf {
        self.workflows_dir().join(format!("{name}.yaml"))
    }

    pub fn default_output_dir(&self) -> PathBuf {
        self.agents_root().join("workflow")
    }

    pub fn agent_outputs_dir(&self) -> PathBuf {
        self.agents_root().join("agents/outputs")
    }

    pub fn agent_verifications_dir(&self) -> PathBuf {
        self.agents_root().join("agents/verifications")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.agents_root().join("sessions")
    }

    /// Resolve a path that may be relative to the base directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base.join(candidate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_lands_under_the_agents_root() {
        let paths = StatePaths::new(Path::new("/work"));
        assert_eq!(
            paths.state_file("wf-1"),
            PathBuf::from("/work/.cursor/agents/state/wf-1.json")
        );
        assert_eq!(
            paths.workflow_file("default-workflow"),
            PathBuf::from("/work/.cursor/agents/workflows/default-workflow.yaml")
        );
        assert_eq!(
            paths.default_output_dir(),
            PathBuf::from("/work/.cursor/agents/workflow")
        );
    }

    #[test]
    fn resolve_keeps_absolute_paths_untouched() {
        let paths = StatePaths::new(Path::new("/work"));
        assert_eq!(paths.resolve("/tmp/x.md"), PathBuf::from("/tmp/x.md"));
        assert_eq!(
            paths.resolve("out/plan.md"),
            PathBuf::from("/work/out/plan.md")
        );
    }
}
