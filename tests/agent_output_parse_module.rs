use phasegate::agent::output_parse::{
    classify_exit, extract_json, extract_primary_output, parse_verification_output,
    validate_schema, Recommendation,
};
use phasegate::agent::types::OutcomeKind;
use serde_json::json;

#[test]
fn output_parse_module_extracts_result_error_content_then_raw() {
    let result = extract_primary_output(r#"{"result": "the plan", "content": "ignored"}"#);
    assert_eq!(result.text, "the plan");
    assert!(!result.agent_error);

    let error = extract_primary_output(r#"{"is_error": true, "error": "rate limited"}"#);
    assert_eq!(error.text, "rate limited");
    assert!(error.agent_error);

    let content = extract_primary_output(r#"{"content": "fallback body"}"#);
    assert_eq!(content.text, "fallback body");

    let raw = extract_primary_output("plain markdown output");
    assert_eq!(raw.text, "plain markdown output");
    assert!(!raw.agent_error);

    let non_object = extract_primary_output("[1, 2, 3]");
    assert_eq!(non_object.text, "[1, 2, 3]");
}

#[test]
fn output_parse_module_exit_code_taxonomy() {
    assert_eq!(classify_exit(0, true, false), OutcomeKind::Success);
    assert_eq!(classify_exit(0, false, false), OutcomeKind::Success);
    assert_eq!(classify_exit(143, true, false), OutcomeKind::Success);
    assert_eq!(classify_exit(124, true, false), OutcomeKind::Partial);
    assert_eq!(classify_exit(143, false, false), OutcomeKind::ProcessError);
    assert_eq!(classify_exit(124, false, false), OutcomeKind::ProcessError);
    assert_eq!(classify_exit(1, true, false), OutcomeKind::ProcessError);
    assert_eq!(classify_exit(0, true, true), OutcomeKind::AgentError);
}

#[test]
fn output_parse_module_detects_recommendations_case_insensitively() {
    for (text, expected) in [
        ("Recommendation: approve", Recommendation::Approve),
        ("VERDICT:  Iterate", Recommendation::Iterate),
        ("decision : reject", Recommendation::Reject),
    ] {
        let summary = parse_verification_output(text);
        assert_eq!(summary.recommendation, Some(expected), "for {text:?}");
    }
    assert_eq!(parse_verification_output("no verdict here").recommendation, None);
}

#[test]
fn output_parse_module_counts_critical_issues_in_list_items() {
    let text = "\
Findings:
- critical: missing auth check
- [critical] unvalidated input
- [major] slow path in loop
- [minor] typo in comment
- severe: data loss on restart
- [info] looks good overall, approved
not a list line critical: ignored
1. blocker: migration cannot roll back
";
    let summary = parse_verification_output(text);
    assert_eq!(summary.critical_issues, 4);
    assert_eq!(summary.total_issues, 6);
}

#[test]
fn output_parse_module_pass_rule() {
    // Approve recommendation passes regardless of other text.
    assert!(parse_verification_output("Recommendation: approve\n- [major] slow").passed);
    // Pass language without fail language and no criticals passes.
    assert!(parse_verification_output("All checks passed.").passed);
    // Fail language blocks the textual branch.
    assert!(!parse_verification_output("Tests passed but two checks failed.").passed);
    // Critical findings block the textual branch.
    assert!(!parse_verification_output("Approved.\n- critical: broken auth").passed);
    // Nothing affirmative at all.
    assert!(!parse_verification_output("Recommendation: iterate").passed);
}

#[test]
fn output_parse_module_json_extractor_tries_pure_fenced_then_balanced() {
    assert_eq!(
        extract_json(r#"{"a": 1}"#),
        Some(json!({"a": 1}))
    );

    let fenced = "Here you go:\n```json\n{\"b\": [1, 2]}\n```\nDone.";
    assert_eq!(extract_json(fenced), Some(json!({"b": [1, 2]})));

    let embedded = r#"The result is {"c": {"nested": "yes, {braces} in strings"}} as requested."#;
    assert_eq!(
        extract_json(embedded),
        Some(json!({"c": {"nested": "yes, {braces} in strings"}}))
    );

    let array = "values: [1, 2, 3] trailing";
    assert_eq!(extract_json(array), Some(json!([1, 2, 3])));

    assert_eq!(extract_json("no json at all"), None);
}

#[test]
fn output_parse_module_schema_validator_checks_types_and_required_keys() {
    let schema = json!({
        "type": "object",
        "required": ["name", "count"],
        "properties": {
            "name": {"type": "string"},
            "count": {"type": "number"},
            "tags": {"type": "array", "items": {"type": "string"}}
        }
    });

    assert!(validate_schema(&json!({"name": "a", "count": 2, "tags": ["x"]}), &schema).is_ok());
    assert!(validate_schema(&json!({"name": "a"}), &schema)
        .unwrap_err()
        .contains("count"));
    assert!(validate_schema(&json!({"name": 1, "count": 2}), &schema)
        .unwrap_err()
        .contains("name"));
    assert!(
        validate_schema(&json!({"name": "a", "count": 2, "tags": ["x", 3]}), &schema)
            .unwrap_err()
            .contains("[1]")
    );
    assert!(validate_schema(&json!([1]), &json!({"type": "object"})).is_err());
    assert!(validate_schema(&json!(true), &json!({"type": "boolean"})).is_ok());
}
