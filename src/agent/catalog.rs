use crate::agent::types::{AgentCatalog, AgentDefinition};
use crate::shared::logging::log_warn;
use std::fs;
use std::path::{Path, PathBuf};

/// Agent definitions as Markdown files in a single directory: the file stem
/// is the agent name, an optional leading `---` YAML frontmatter carries
/// `description` and `model`, and everything after it is the agent system
/// prompt, used verbatim.
pub struct FileAgentCatalog {
    dir: PathBuf,
}

impl FileAgentCatalog {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn read_definition(&self, path: &Path) -> Option<AgentDefinition> {
        let name = path.file_stem()?.to_str()?.to_string();
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                log_warn(
                    "agent_catalog",
                    &format!("skipping unreadable agent file {}: {err}", path.display()),
                );
                return None;
            }
        };
        let (frontmatter, content) = split_frontmatter(&raw);
        let (description, model) = frontmatter
            .map(|text| parse_frontmatter(&name, text))
            .unwrap_or((String::new(), None));

        let last_modified = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .map(|modified| {
                chrono::DateTime::<chrono::Utc>::from(modified)
                    .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            });

        Some(AgentDefinition {
            name,
            description,
            model,
            content: content.to_string(),
            file_path: path.to_path_buf(),
            last_modified,
        })
    }
}

fn split_frontmatter(raw: &str) -> (Option<&str>, &str) {
    let Some(rest) = raw.strip_prefix("---\n") else {
        return (None, raw);
    };
    match rest.split_once("\n---\n") {
        Some((frontmatter, content)) => (Some(frontmatter), content.trim_start()),
        None => (None, raw),
    }
}

fn parse_frontmatter(name: &str, text: &str) -> (String, Option<String>) {
    match serde_yaml::from_str::<serde_yaml::Value>(text) {
        Ok(value) => {
            let description = value
                .get("description")
                .and_then(serde_yaml::Value::as_str)
                .unwrap_or_default()
                .to_string();
            let model = value
                .get("model")
                .and_then(serde_yaml::Value::as_str)
                .map(str::to_string);
            (description, model)
        }
        Err(err) => {
            log_warn(
                "agent_catalog",
                &format!("agent `{name}` has invalid frontmatter: {err}"),
            );
            (String::new(), None)
        }
    }
}

impl AgentCatalog for FileAgentCatalog {
    fn list_agents(&self) -> Vec<AgentDefinition> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
            .collect();
        paths.sort();
        paths
            .iter()
            .filter_map(|path| self.read_definition(path))
            .collect()
    }

    fn get_agent(&self, name: &str) -> Option<AgentDefinition> {
        let path = self.dir.join(format!("{name}.md"));
        if !path.is_file() {
            return None;
        }
        self.read_definition(&path)
    }
}
