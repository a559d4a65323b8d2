//! Declarative argument validation.
//!
//! Tool input schemas use a JSON-schema subset: object `type`, `properties`
//! with scalar types, `required`, `enum`. Violations come back as a list of
//! human-readable strings that `tools/call` surfaces in an `isError` result.

use serde_json::{Map, Value};

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

/// Validate `args` against `schema`. Empty vec means valid.
pub fn validate_arguments(args: &Map<String, Value>, schema: &Value) -> Vec<String> {
    let mut violations = Vec::new();

    let Some(schema) = schema.as_object() else {
        return violations;
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !args.contains_key(name) {
                violations.push(format!("missing required argument `{name}`"));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return violations;
    };

    for (name, value) in args {
        let Some(property) = properties.get(name).and_then(Value::as_object) else {
            violations.push(format!("unknown argument `{name}`"));
            continue;
        };
        if let Some(expected) = property.get("type").and_then(Value::as_str) {
            if !type_matches(expected, value) {
                violations.push(format!("argument `{name}` must be a {expected}"));
            }
        }
        if let Some(allowed) = property.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                violations.push(format!("argument `{name}` must be one of {allowed:?}"));
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use agora_core::payload;
    use serde_json::json;

    use super::*;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "slug": { "type": "string" },
                "limit": { "type": "integer" },
                "order": { "type": "string", "enum": ["asc", "desc"] },
            },
            "required": ["slug"],
        })
    }

    #[test]
    fn valid_arguments_pass() {
        let args = payload! { "slug" => "rustaceans", "limit" => 10, "order" => "asc" };
        assert!(validate_arguments(&args, &schema()).is_empty());
    }

    #[test]
    fn missing_required_is_reported() {
        let args = payload! { "limit" => 10 };
        let violations = validate_arguments(&args, &schema());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("slug"));
    }

    #[test]
    fn wrong_types_and_unknowns_are_reported() {
        let args = payload! { "slug" => 5, "bogus" => true };
        let violations = validate_arguments(&args, &schema());
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn enums_are_enforced() {
        let args = payload! { "slug" => "x", "order" => "sideways" };
        let violations = validate_arguments(&args, &schema());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("order"));
    }
}
