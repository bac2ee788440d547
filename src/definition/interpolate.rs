use crate::definition::model::{VariableValue, WorkflowDefinition};
use crate::shared::logging::log_warn;
use crate::state::model::Phase;
use std::collections::BTreeMap;

/// Lookup environment for `{{ … }}` expressions: workflow variables, the
/// live `iteration`/`phase`, and a `phases` map the executor populates from
/// persisted artifacts (`phases.<id>.outputs.<key>`).
#[derive(Debug, Clone)]
pub struct InterpolationContext {
    pub variables: BTreeMap<String, VariableValue>,
    pub iteration: u32,
    pub phase: Phase,
    pub phases: BTreeMap<String, BTreeMap<String, String>>,
}

impl InterpolationContext {
    pub fn new(definition: &WorkflowDefinition, phase: Phase, iteration: u32) -> Self {
        Self {
            variables: definition.variables.clone(),
            iteration,
            phase,
            phases: BTreeMap::new(),
        }
    }

    pub fn set_phase_output(&mut self, phase_id: &str, key: &str, value: String) {
        self.phases
            .entry(phase_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    fn resolve(&self, token: &str) -> Option<String> {
        match token {
            "iteration" => return Some(self.iteration.to_string()),
            "phase" => return Some(self.phase.as_str().to_string()),
            _ => {}
        }
        if let Some(rest) = token.strip_prefix("phases.") {
            let mut parts = rest.splitn(3, '.');
            let phase_id = parts.next()?;
            if parts.next()? != "outputs" {
                return None;
            }
            let key = parts.next()?;
            return self.phases.get(phase_id)?.get(key).cloned();
        }
        if token.contains('.') {
            return None;
        }
        self.variables.get(token).map(VariableValue::render)
    }
}

/// Resolve every `{{ name }}` in `template`. Unknown names stay verbatim in
/// the output with a logged warning; an unterminated `{{` also passes
/// through untouched.
pub fn interpolate(template: &str, context: &InterpolationContext) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut cursor = template;

    while let Some(start) = cursor.find("{{") {
        rendered.push_str(&cursor[..start]);
        let after_open = &cursor[start + 2..];
        let Some(close_offset) = after_open.find("}}") else {
            rendered.push_str(&cursor[start..]);
            return rendered;
        };
        let raw = &cursor[start..start + 2 + close_offset + 2];
        let token = after_open[..close_offset].trim();
        match context.resolve(token) {
            Some(value) => rendered.push_str(&value),
            None => {
                log_warn(
                    "interpolate_unknown",
                    &format!("template placeholder `{token}` is not defined; leaving it literal"),
                );
                rendered.push_str(raw);
            }
        }
        cursor = &after_open[close_offset + 2..];
    }

    rendered.push_str(cursor);
    rendered
}

/// Interpolate every value of an outputs table. Absent input stays absent.
pub fn interpolate_outputs(
    outputs: Option<&BTreeMap<String, String>>,
    context: &InterpolationContext,
) -> Option<BTreeMap<String, String>> {
    outputs.map(|map| {
        map.iter()
            .map(|(key, template)| (key.clone(), interpolate(template, context)))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::defaults::default_workflow;

    fn context() -> InterpolationContext {
        let definition = default_workflow();
        let mut ctx = InterpolationContext::new(&definition, Phase::Planning, 3);
        ctx.set_phase_output("planning", "artifact", "plans/plan-v3.md".to_string());
        ctx
    }

    #[test]
    fn resolves_live_names_and_variables() {
        let ctx = context();
        assert_eq!(interpolate("v{{ iteration }}", &ctx), "v3");
        assert_eq!(interpolate("{{ phase }}", &ctx), "planning");
        assert_eq!(
            interpolate("{{ output_dir }}/x", &ctx),
            ".cursor/agents/workflow/x"
        );
    }

    #[test]
    fn resolves_phase_output_paths() {
        let ctx = context();
        assert_eq!(
            interpolate("read {{ phases.planning.outputs.artifact }}", &ctx),
            "read plans/plan-v3.md"
        );
    }

    #[test]
    fn unknown_placeholders_stay_verbatim() {
        let ctx = context();
        assert_eq!(interpolate("keep {{ nope }} as-is", &ctx), "keep {{ nope }} as-is");
        assert_eq!(interpolate("{{phases.planning.bad.artifact}}", &ctx), "{{phases.planning.bad.artifact}}");
        assert_eq!(interpolate("dangling {{ open", &ctx), "dangling {{ open");
    }
}
