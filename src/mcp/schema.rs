//! Structural validation of `tools/call` arguments against a tool's input schema
//!
//! Only the parts of JSON Schema that describe shape are enforced: `required`,
//! `type`, `properties`, `items` and `additionalProperties: false`. Formats,
//! patterns and numeric bounds are left to the handler.

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    pub path: String,
    pub reason: String,
}

pub fn validate_arguments(
    schema: &Value,
    arguments: &Map<String, Value>,
) -> Result<(), Vec<SchemaViolation>> {
    let mut violations = Vec::new();
    validate_object(schema, arguments, "", &mut violations);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn validate_object(
    schema: &Value,
    object: &Map<String, Value>,
    path: &str,
    violations: &mut Vec<SchemaViolation>,
) {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                violations.push(SchemaViolation {
                    path: join_path(path, key),
                    reason: "required property is missing".to_string(),
                });
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);

    for (key, value) in object {
        let property_path = join_path(path, key);
        match properties.and_then(|declared| declared.get(key)) {
            Some(property_schema) => {
                validate_value(property_schema, value, &property_path, violations)
            }
            None => {
                if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                    violations.push(SchemaViolation {
                        path: property_path,
                        reason: "property is not declared".to_string(),
                    });
                }
            }
        }
    }
}

fn validate_value(
    schema: &Value,
    value: &Value,
    path: &str,
    violations: &mut Vec<SchemaViolation>,
) {
    if let Some(declared) = schema.get("type") {
        let allowed: Vec<&str> = match declared {
            Value::String(single) => vec![single.as_str()],
            Value::Array(many) => many.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };

        if !allowed.is_empty() && !allowed.iter().any(|kind| matches_type(kind, value)) {
            violations.push(SchemaViolation {
                path: path.to_string(),
                reason: format!(
                    "expected {}, found {}",
                    allowed.join(" or "),
                    type_name(value)
                ),
            });
            return;
        }
    }

    match value {
        Value::Object(object) => validate_object(schema, object, path, violations),
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items").filter(|items| items.is_object()) {
                for (index, item) in items.iter().enumerate() {
                    validate_value(item_schema, item, &format!("{path}[{index}]"), violations);
                }
            }
        }
        _ => {}
    }
}

fn matches_type(kind: &str, value: &Value) -> bool {
    match kind {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => is_integral(value),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        // Unknown type keywords are not ours to reject.
        _ => true,
    }
}

fn is_integral(value: &Value) -> bool {
    if value.is_i64() || value.is_u64() {
        return true;
    }

    value
        .as_f64()
        .is_some_and(|number| number.is_finite() && number.fract() == 0.0)
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

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}
