//! Achievement condition evaluation.
//!
//! Conditions are stored as a JSON list of `{field, op, value}` predicates
//! and AND-ed against the triggering event's payload. Dotted-path extraction
//! distinguishes "absent" from "present and null": `neq` on an absent field
//! does not match.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

const LOG_TARGET: &str = "agora::achievements";

#[derive(Deserialize, Debug, Clone)]
pub struct Condition {
    pub field: String,
    pub op: String,
    #[serde(default)]
    pub value: Value,
}

/// Dotted-path lookup result; `Absent` is distinct from `Present(Null)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extracted<'v> {
    Absent,
    Present(&'v Value),
}

pub fn extract_path<'v>(payload: &'v Map<String, Value>, path: &str) -> Extracted<'v> {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Extracted::Absent;
    };
    let Some(mut current) = payload.get(first) else {
        return Extracted::Absent;
    };
    for segment in segments {
        match current.as_object().and_then(|o| o.get(segment)) {
            Some(next) => current = next,
            None => return Extracted::Absent,
        }
    }
    Extracted::Present(current)
}

fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn eval_one(condition: &Condition, payload: &Map<String, Value>) -> bool {
    let extracted = extract_path(payload, &condition.field);

    match condition.op.as_str() {
        "eq" => matches!(extracted, Extracted::Present(v) if *v == condition.value),
        // Absent is not "different from": an event that never mentions the
        // field does not satisfy `neq`.
        "neq" => matches!(extracted, Extracted::Present(v) if *v != condition.value),
        "gt" | "gte" | "lt" | "lte" => {
            let Extracted::Present(actual) = extracted else {
                return false;
            };
            let (Some(actual), Some(expected)) = (as_f64(actual), as_f64(&condition.value))
            else {
                return false;
            };
            match condition.op.as_str() {
                "gt" => expected < actual,
                "gte" => expected <= actual,
                "lt" => actual < expected,
                _ => actual <= expected,
            }
        }
        "in" => {
            let Extracted::Present(actual) = extracted else {
                return false;
            };
            // `in` requires the condition value to be a list.
            condition
                .value
                .as_array()
                .is_some_and(|list| list.contains(actual))
        }
        "contains" => {
            let Extracted::Present(actual) = extracted else {
                return false;
            };
            match actual {
                Value::String(s) => condition
                    .value
                    .as_str()
                    .is_some_and(|needle| s.contains(needle)),
                Value::Array(items) => items.contains(&condition.value),
                _ => false,
            }
        }
        other => {
            warn!(target: LOG_TARGET, op = %other, "Unknown condition op, treating as no-match");
            false
        }
    }
}

/// Evaluate a stored condition list against a payload. `None`/empty list
/// matches everything; an unparsable list matches nothing.
pub fn eval_conditions(conditions: Option<&str>, payload: &Map<String, Value>) -> bool {
    let Some(raw) = conditions else {
        return true;
    };
    if raw.trim().is_empty() {
        return true;
    }
    let parsed: Vec<Condition> = match serde_json::from_str(raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(target: LOG_TARGET, err = %err, "Unparsable condition list, treating as no-match");
            return false;
        }
    };
    parsed.iter().all(|condition| eval_one(condition, payload))
}

#[cfg(test)]
mod tests {
    use agora_core::payload;

    use super::*;

    #[test]
    fn empty_conditions_match() {
        assert!(eval_conditions(None, &payload! {}));
        assert!(eval_conditions(Some(""), &payload! {}));
        assert!(eval_conditions(Some("[]"), &payload! {}));
    }

    #[test]
    fn eq_and_neq() {
        let p = payload! { "kind" => "physical", "empty" => Value::Null };
        assert!(eval_conditions(
            Some(r#"[{"field":"kind","op":"eq","value":"physical"}]"#),
            &p
        ));
        assert!(!eval_conditions(
            Some(r#"[{"field":"kind","op":"neq","value":"physical"}]"#),
            &p
        ));
        // neq on an absent field is false, not true.
        assert!(!eval_conditions(
            Some(r#"[{"field":"missing","op":"neq","value":"x"}]"#),
            &p
        ));
        // ...but present-and-null is a real value.
        assert!(eval_conditions(
            Some(r#"[{"field":"empty","op":"neq","value":"x"}]"#),
            &p
        ));
    }

    #[test]
    fn numeric_comparisons() {
        let p = payload! { "attendees" => 42 };
        assert!(eval_conditions(
            Some(r#"[{"field":"attendees","op":"gte","value":42}]"#),
            &p
        ));
        assert!(eval_conditions(
            Some(r#"[{"field":"attendees","op":"gt","value":41}]"#),
            &p
        ));
        assert!(!eval_conditions(
            Some(r#"[{"field":"attendees","op":"lt","value":42}]"#),
            &p
        ));
        // Non-numeric payload value never satisfies an ordering op.
        let p = payload! { "attendees" => "many" };
        assert!(!eval_conditions(
            Some(r#"[{"field":"attendees","op":"gt","value":0}]"#),
            &p
        ));
    }

    #[test]
    fn in_requires_a_list() {
        let p = payload! { "platform" => "meetup" };
        assert!(eval_conditions(
            Some(r#"[{"field":"platform","op":"in","value":["meetup","luma"]}]"#),
            &p
        ));
        assert!(!eval_conditions(
            Some(r#"[{"field":"platform","op":"in","value":"meetup"}]"#),
            &p
        ));
    }

    #[test]
    fn contains_on_strings_and_arrays() {
        let p = payload! { "title" => "Rust meetup night", "tags" => ["rust", "talks"] };
        assert!(eval_conditions(
            Some(r#"[{"field":"title","op":"contains","value":"meetup"}]"#),
            &p
        ));
        assert!(eval_conditions(
            Some(r#"[{"field":"tags","op":"contains","value":"rust"}]"#),
            &p
        ));
        assert!(!eval_conditions(
            Some(r#"[{"field":"tags","op":"contains","value":"golf"}]"#),
            &p
        ));
    }

    #[test]
    fn dotted_paths_descend() {
        let p = payload! { "event" => { "venue": { "city": "Denver" } } };
        assert!(eval_conditions(
            Some(r#"[{"field":"event.venue.city","op":"eq","value":"Denver"}]"#),
            &p
        ));
        assert!(!eval_conditions(
            Some(r#"[{"field":"event.venue.state","op":"eq","value":"CO"}]"#),
            &p
        ));
    }

    #[test]
    fn unknown_op_and_garbage_never_match() {
        let p = payload! { "x" => 1 };
        assert!(!eval_conditions(
            Some(r#"[{"field":"x","op":"matches","value":1}]"#),
            &p
        ));
        assert!(!eval_conditions(Some("not json"), &p));
    }

    #[test]
    fn all_conditions_are_anded() {
        let p = payload! { "a" => 1, "b" => 2 };
        let both = r#"[
            {"field":"a","op":"eq","value":1},
            {"field":"b","op":"eq","value":2}
        ]"#;
        let one_off = r#"[
            {"field":"a","op":"eq","value":1},
            {"field":"b","op":"eq","value":3}
        ]"#;
        assert!(eval_conditions(Some(both), &p));
        assert!(!eval_conditions(Some(one_off), &p));
    }
}
