//! C2: the plan parser. Pure and synchronous — turns raw LLM output into a
//! `Plan`, never touching a collaborator or the filesystem. `spec.md` §4.2
//! lists five recovery rules for coaxing a `Plan` out of prose the model may
//! have wrapped in commentary or fences; anything that survives them still
//! has to satisfy `shared_types::Plan`'s own closed shape (rule 5), which
//! folds straight into a `shape_invalid` error plan via `serde`'s own
//! rejection of unknown `safety_level` strings.

use serde_json::Value;
use shared_types::Plan;

const FENCE: &str = "```";

/// Turns the model's raw text output into a `Plan`. Never panics; any
/// failure along the way collapses into `Plan::error_plan(reason)` so the
/// pipeline always has a `Plan` to hand the validator, never a `Result` to
/// unwrap.
pub fn parse(text: &str) -> Plan {
    let body = extract_body(text);

    let value: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(_) => return Plan::error_plan("invalid_json"),
    };

    match serde_json::from_value::<Plan>(value) {
        Ok(plan) => plan,
        Err(_) => Plan::error_plan("shape_invalid"),
    }
}

/// Rule 1: a ` ```json ` fenced block. Rule 2: any fenced block. Rule 3:
/// the raw text, for models that skip fencing entirely.
fn extract_body(text: &str) -> String {
    if let Some(block) = extract_fenced(text, Some("json")) {
        return block;
    }
    if let Some(block) = extract_fenced(text, None) {
        return block;
    }
    text.trim().to_string()
}

fn extract_fenced(text: &str, label: Option<&str>) -> Option<String> {
    let marker = match label {
        Some(lang) => format!("{FENCE}{lang}"),
        None => FENCE.to_string(),
    };

    let start = text.find(&marker)?;
    let after_marker = start + marker.len();

    let body_start = match text[after_marker..].find('\n') {
        Some(offset) => after_marker + offset + 1,
        None => after_marker,
    };

    let end_offset = text[body_start..].find(FENCE)?;
    Some(text[body_start..body_start + end_offset].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::SafetyLevel;

    const VALID_PLAN_JSON: &str = r#"{
        "intent": "open firefox",
        "actions": [
            {"type": "system_action", "tool": "open_app", "arguments": {"name": "firefox"}}
        ],
        "requires_confirmation": false,
        "estimated_duration_s": 2
    }"#;

    #[test]
    fn parses_bare_json() {
        let plan = parse(VALID_PLAN_JSON);
        assert!(!plan.is_error());
        assert_eq!(plan.intent, "open firefox");
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].safety_level, SafetyLevel::Medium);
    }

    #[test]
    fn parses_json_fenced_block_surrounded_by_prose() {
        let text = format!(
            "Sure, here is the plan:\n```json\n{VALID_PLAN_JSON}\n```\nLet me know if you need changes."
        );
        let plan = parse(&text);
        assert!(!plan.is_error());
        assert_eq!(plan.intent, "open firefox");
    }

    #[test]
    fn parses_generic_fenced_block_when_unlabeled() {
        let text = format!("```\n{VALID_PLAN_JSON}\n```");
        let plan = parse(&text);
        assert!(!plan.is_error());
    }

    #[test]
    fn fenced_and_bare_text_are_equivalent() {
        let bare = parse(VALID_PLAN_JSON);
        let fenced = parse(&format!("```json\n{VALID_PLAN_JSON}\n```"));
        assert_eq!(bare.intent, fenced.intent);
        assert_eq!(bare.actions.len(), fenced.actions.len());
    }

    #[test]
    fn malformed_json_becomes_invalid_json_error_plan() {
        let plan = parse("not json at all {{{");
        assert!(plan.is_error());
        assert_eq!(plan.error.as_deref(), Some("invalid_json"));
    }

    #[test]
    fn wrong_shape_becomes_shape_invalid_error_plan() {
        let plan = parse(r#"{"intent": "do a thing", "actions": "not a list"}"#);
        assert!(plan.is_error());
        assert_eq!(plan.error.as_deref(), Some("shape_invalid"));
    }

    #[test]
    fn unknown_safety_level_becomes_shape_invalid() {
        let text = r#"{
            "intent": "test",
            "actions": [
                {"type": "system_action", "tool": "open_app", "safety_level": "apocalyptic"}
            ]
        }"#;
        let plan = parse(text);
        assert!(plan.is_error());
        assert_eq!(plan.error.as_deref(), Some("shape_invalid"));
    }

    #[test]
    fn missing_optional_fields_fall_back_to_defaults() {
        let text = r#"{"intent": "noop", "actions": []}"#;
        let plan = parse(text);
        assert!(!plan.is_error());
        assert!(!plan.requires_confirmation);
        assert_eq!(plan.estimated_duration_s, 0);
    }

    #[test]
    fn parse_is_idempotent_through_reserialization() {
        let plan = parse(VALID_PLAN_JSON);
        let reserialized = serde_json::to_string(&plan).unwrap();
        let reparsed = parse(&reserialized);
        assert_eq!(plan.intent, reparsed.intent);
        assert_eq!(plan.actions.len(), reparsed.actions.len());
    }
}
