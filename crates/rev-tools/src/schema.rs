use serde_json::Value;

/// Structural validation of tool arguments against a JSON schema value.
///
/// Checks `required` membership and the declared `type` of each property
/// that is present. Unknown schema constructs are ignored rather than
/// rejected; the tool handler is the final authority on its inputs.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    let Some(args_map) = args.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !args_map.contains_key(field) {
                return Err(format!("missing required argument '{field}'"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, value) in args_map {
            let Some(declared) = properties.get(key) else {
                continue;
            };
            let Some(expected) = declared.get("type").and_then(Value::as_str) else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(format!(
                    "argument '{key}' has wrong type: expected {expected}, got {}",
                    type_name(value)
                ));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "max_lines": {"type": "integer"},
                "recursive": {"type": "boolean"}
            },
            "required": ["path"]
        })
    }

    #[test]
    fn test_valid_args() {
        assert!(validate_args(&schema(), &json!({"path": "a.py", "max_lines": 10})).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = validate_args(&schema(), &json!({"max_lines": 10})).unwrap_err();
        assert!(err.contains("required argument 'path'"));
    }

    #[test]
    fn test_wrong_type() {
        let err = validate_args(&schema(), &json!({"path": 42})).unwrap_err();
        assert!(err.contains("expected string"));
        let err = validate_args(&schema(), &json!({"path": "a", "recursive": "yes"})).unwrap_err();
        assert!(err.contains("expected boolean"));
    }

    #[test]
    fn test_undeclared_keys_are_allowed() {
        assert!(validate_args(&schema(), &json!({"path": "a", "extra": [1, 2]})).is_ok());
    }

    #[test]
    fn test_non_object_args_rejected() {
        assert!(validate_args(&schema(), &json!("path")).is_err());
    }
}
