//! Layered stack configuration values
//!
//! A stack's raw configuration is assembled from one or more YAML files
//! (merged in order) followed by `--set key=value` overrides, then turned
//! into a typed config with [`crate::config::StackConfig::from_values`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Raw configuration tree with deep merge capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Load values from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse values from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        match value {
            // An empty file parses to null; treat it as an empty config
            JsonValue::Null => Ok(Self::new()),
            value => Ok(Self(value)),
        }
    }

    /// Parse values from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(json)?;
        Ok(Self(value))
    }

    /// Load and merge files in order, then apply `--set` overrides
    pub fn layered<P: AsRef<Path>>(files: &[P], set_args: &[String]) -> Result<Self> {
        let mut values = Values::new();
        for file in files {
            values.merge(&Values::from_file(file)?);
        }
        if !set_args.is_empty() {
            values.merge(&parse_set_values(set_args)?);
        }
        Ok(values)
    }

    /// Deep merge another Values into this one
    ///
    /// Rules:
    /// - Scalars: overlay replaces base
    /// - Objects: recursive merge
    /// - Arrays: overlay replaces base (not appended)
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Set a value by dotted path (e.g., "app_hostnames")
    pub fn set(&mut self, path: &str, value: JsonValue) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();
        set_nested(&mut self.0, &parts, value)
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested(&self.0, &parts)
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert to JSON value
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }

    /// Deserialize into a typed structure
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.0.clone())?)
    }
}

/// Deep merge two JSON values
fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Set a nested value by path
fn set_nested(value: &mut JsonValue, path: &[&str], new_value: JsonValue) -> Result<()> {
    let Some((key, remaining)) = path.split_first() else {
        *value = new_value;
        return Ok(());
    };

    if key.is_empty() {
        return Err(CoreError::ValuesMerge {
            message: "empty path segment".to_string(),
        });
    }

    if !value.is_object() {
        *value = JsonValue::Object(serde_json::Map::new());
    }

    let JsonValue::Object(map) = value else {
        unreachable!("value was just replaced by an object");
    };

    if remaining.is_empty() {
        map.insert(key.to_string(), new_value);
        Ok(())
    } else {
        let entry = map
            .entry(key.to_string())
            .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
        set_nested(entry, remaining, new_value)
    }
}

/// Get a nested value by path
fn get_nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let Some((key, remaining)) = path.split_first() else {
        return Some(value);
    };

    match value {
        JsonValue::Object(map) => map.get(*key).and_then(|v| get_nested(v, remaining)),
        _ => None,
    }
}

/// Parse --set arguments (key=value format)
pub fn parse_set_values(set_args: &[String]) -> Result<Values> {
    let mut values = Values::new();

    for arg in set_args {
        let (key, val) = arg.split_once('=').ok_or_else(|| CoreError::ValuesMerge {
            message: format!("Invalid --set format: '{}'. Expected key=value", arg),
        })?;

        // Try to parse as JSON, fallback to string
        let json_value = if val == "true" {
            JsonValue::Bool(true)
        } else if val == "false" {
            JsonValue::Bool(false)
        } else if val == "null" {
            JsonValue::Null
        } else if let Ok(num) = val.parse::<i64>() {
            JsonValue::Number(num.into())
        } else if val.starts_with('[') || val.starts_with('{') {
            serde_json::from_str(val).unwrap_or_else(|_| JsonValue::String(val.to_string()))
        } else {
            JsonValue::String(val.to_string())
        };

        values.set(key, json_value)?;
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_merge() {
        let mut base = Values::from_yaml(
            r#"
app_image: registry/demoapp:1.0
app_environment_variables:
  LOG_LEVEL: info
  PORT: "3000"
app_min_replicas: 1
"#,
        )
        .unwrap();

        let overlay = Values::from_yaml(
            r#"
app_environment_variables:
  LOG_LEVEL: debug
app_min_replicas: 2
"#,
        )
        .unwrap();

        base.merge(&overlay);

        assert_eq!(base.get("app_image").unwrap(), "registry/demoapp:1.0");
        assert_eq!(base.get("app_environment_variables.LOG_LEVEL").unwrap(), "debug");
        assert_eq!(base.get("app_environment_variables.PORT").unwrap(), "3000");
        assert_eq!(base.get("app_min_replicas").unwrap(), 2);
    }

    #[test]
    fn test_arrays_are_replaced() {
        let mut base = Values::from_yaml("availability_zones: [a, b, c]").unwrap();
        let overlay = Values::from_yaml("availability_zones: [x]").unwrap();
        base.merge(&overlay);
        assert_eq!(base.get("availability_zones").unwrap(), &serde_json::json!(["x"]));
    }

    #[test]
    fn test_empty_yaml_is_empty_values() {
        let values = Values::from_yaml("").unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_set_nested() {
        let mut values = Values::new();
        values.set("eks_images.1.27", JsonValue::String("ami-1".into())).unwrap();
        values.set("eks_worker_max_size", JsonValue::Number(3.into())).unwrap();

        assert_eq!(values.get("eks_images.1").unwrap()["27"], "ami-1");
        assert_eq!(values.get("eks_worker_max_size").unwrap(), 3);
    }

    #[test]
    fn test_set_rejects_empty_segment() {
        let mut values = Values::new();
        assert!(values.set("a..b", JsonValue::Null).is_err());
    }

    #[test]
    fn test_parse_set_values() {
        let args = vec![
            "app_image=nginx:1.27".to_string(),
            "app_max_replicas=5".to_string(),
            "is_prod_database=true".to_string(),
            r#"app_hostnames=[{"name":"a.cloudlan.net"}]"#.to_string(),
        ];

        let values = parse_set_values(&args).unwrap();

        assert_eq!(values.get("app_image").unwrap(), "nginx:1.27");
        assert_eq!(values.get("app_max_replicas").unwrap(), 5);
        assert_eq!(values.get("is_prod_database").unwrap(), true);
        assert_eq!(
            values.get("app_hostnames").unwrap()[0]["name"],
            "a.cloudlan.net"
        );
    }

    #[test]
    fn test_parse_set_values_rejects_missing_equals() {
        let err = parse_set_values(&["app_image".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Expected key=value"));
    }

    #[test]
    fn test_layered_files_then_set() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.yaml");
        let env = dir.path().join("env.yaml");
        std::fs::write(&base, "vpc_cidr: 10.0.0.0/16\ncreate_s3_endpoint: true\n").unwrap();
        std::fs::write(&env, "create_s3_endpoint: false\n").unwrap();

        let values =
            Values::layered(&[base, env], &["vpc_cidr=10.1.0.0/16".to_string()]).unwrap();

        assert_eq!(values.get("vpc_cidr").unwrap(), "10.1.0.0/16");
        assert_eq!(values.get("create_s3_endpoint").unwrap(), false);
    }
}
