//! Importing outputs written by the provisioning engine

use serde_json::Value as JsonValue;
use stratus_core::output::SECRET_KEY;
use stratus_core::{StackKind, StackOutputs};

use crate::error::{Result, StateError};

/// Parse an outputs document for a stack
///
/// Accepts JSON or YAML. Keys the stack declares as secret are wrapped in a
/// secret envelope unless the document already wraps them.
pub fn parse_outputs(kind: StackKind, content: &str) -> Result<StackOutputs> {
    let value: JsonValue = match serde_json::from_str(content) {
        Ok(value) => value,
        Err(_) => serde_yaml::from_str(content)?,
    };
    outputs_from_value(kind, value)
}

/// Build outputs from an already parsed document
pub fn outputs_from_value(kind: StackKind, value: JsonValue) -> Result<StackOutputs> {
    let JsonValue::Object(map) = value else {
        return Err(StateError::InvalidOutputs {
            stack: kind.project().to_string(),
            reason: format!("expected a mapping of output names, found {}", type_name(&value)),
        });
    };

    let secrets = kind.secret_outputs();
    let mut outputs = StackOutputs::new();
    for (key, value) in map {
        if secrets.contains(&key.as_str()) && !is_enveloped(&value) {
            outputs.insert_secret(key, value);
        } else {
            outputs.insert(key, value);
        }
    }
    Ok(outputs)
}

fn is_enveloped(value: &JsonValue) -> bool {
    matches!(value, JsonValue::Object(map) if map.len() == 1 && map.contains_key(SECRET_KEY))
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "a mapping",
    }
}
