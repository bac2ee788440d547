use phasegate::definition::defaults::default_workflow;
use phasegate::definition::interpolate::{interpolate, interpolate_outputs, InterpolationContext};
use phasegate::state::Phase;
use std::collections::BTreeMap;

fn context_at(phase: Phase, iteration: u32) -> InterpolationContext {
    let definition = default_workflow();
    InterpolationContext::new(&definition, phase, iteration)
}

#[test]
fn interpolate_module_resolves_variables_and_live_names() {
    let ctx = context_at(Phase::Implementation, 4);
    assert_eq!(
        interpolate("{{ output_dir }}/{{ phase }}/{{ phase }}-v{{ iteration }}.md", &ctx),
        ".cursor/agents/workflow/implementation/implementation-v4.md"
    );
}

#[test]
fn interpolate_module_resolves_cross_phase_outputs() {
    let mut ctx = context_at(Phase::Implementation, 1);
    ctx.set_phase_output("planning", "artifact", "wf/planning/planning-v2.md".to_string());
    ctx.set_phase_output("planning", "reviews", "wf/planning/reviews".to_string());

    assert_eq!(
        interpolate("{{ phases.planning.outputs.artifact }}", &ctx),
        "wf/planning/planning-v2.md"
    );
    assert_eq!(
        interpolate("see {{ phases.planning.outputs.reviews }}/", &ctx),
        "see wf/planning/reviews/"
    );
}

#[test]
fn interpolate_module_leaves_unknown_placeholders_verbatim() {
    let ctx = context_at(Phase::Planning, 1);
    assert_eq!(interpolate("{{ missing }}", &ctx), "{{ missing }}");
    assert_eq!(interpolate("{{missing}}", &ctx), "{{missing}}");
    assert_eq!(
        interpolate("{{ phases.unknown.outputs.artifact }}", &ctx),
        "{{ phases.unknown.outputs.artifact }}"
    );
    assert_eq!(interpolate("{{ phases.planning.bad }}", &ctx), "{{ phases.planning.bad }}");
}

#[test]
fn interpolate_module_mixes_resolved_and_unresolved() {
    let ctx = context_at(Phase::Planning, 3);
    assert_eq!(
        interpolate("v{{ iteration }} of {{ nope }} in {{ phase }}", &ctx),
        "v3 of {{ nope }} in planning"
    );
}

#[test]
fn interpolate_outputs_maps_every_value_and_preserves_absence() {
    let ctx = context_at(Phase::Planning, 2);
    let mut outputs = BTreeMap::new();
    outputs.insert("artifact".to_string(), "{{ output_dir }}/plan-v{{ iteration }}.md".to_string());
    outputs.insert("custom".to_string(), "static".to_string());

    let resolved = interpolate_outputs(Some(&outputs), &ctx).expect("outputs");
    assert_eq!(
        resolved.get("artifact").map(String::as_str),
        Some(".cursor/agents/workflow/plan-v2.md")
    );
    assert_eq!(resolved.get("custom").map(String::as_str), Some("static"));

    assert!(interpolate_outputs(None, &ctx).is_none());
}
