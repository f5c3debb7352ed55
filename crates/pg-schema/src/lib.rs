//! `SchemaValidator` — per-tool JSON-Schema-subset validator.

use std::collections::HashMap;

use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// `None` = no type constraint. A union is represented as multiple
    /// entries (e.g. `["string", "null"]`).
    pub schema_type: Option<Vec<String>>,
    pub required: Vec<String>,
    pub enum_values: Option<Vec<Value>>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub pattern: Option<String>,
    pub items: Option<Box<Schema>>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub properties: Option<HashMap<String, Schema>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn validate_value(schema: &Schema, value: &Value, path: &str, errors: &mut Vec<ValidationError>) {
    if let Some(types) = &schema.schema_type {
        let actual = json_type_name(value);
        if !types.iter().any(|t| t == actual) {
            errors.push(ValidationError {
                path: path.to_string(),
                message: format!("expected type {}, got {actual}", types.join(" | ")),
            });
            return;
        }
    }

    if let Some(allowed) = &schema.enum_values {
        if !allowed.contains(value) {
            errors.push(ValidationError {
                path: path.to_string(),
                message: "value not in enum".to_string(),
            });
        }
    }

    match value {
        Value::String(s) => {
            if let Some(min) = schema.min_length {
                if (s.chars().count() as u64) < min {
                    errors.push(ValidationError { path: path.to_string(), message: format!("shorter than minLength {min}") });
                }
            }
            if let Some(max) = schema.max_length {
                if (s.chars().count() as u64) > max {
                    errors.push(ValidationError { path: path.to_string(), message: format!("longer than maxLength {max}") });
                }
            }
            if let Some(pattern) = &schema.pattern {
                match Regex::new(pattern) {
                    Ok(re) if !re.is_match(s) => {
                        errors.push(ValidationError { path: path.to_string(), message: format!("does not match pattern {pattern}") });
                    }
                    Err(_) => {
                        errors.push(ValidationError { path: path.to_string(), message: format!("invalid pattern {pattern}") });
                    }
                    _ => {}
                }
            }
        }
        Value::Number(n) => {
            let as_f64 = n.as_f64().unwrap_or(f64::NAN);
            if let Some(min) = schema.minimum {
                if as_f64 < min {
                    errors.push(ValidationError { path: path.to_string(), message: format!("below minimum {min}") });
                }
            }
            if let Some(max) = schema.maximum {
                if as_f64 > max {
                    errors.push(ValidationError { path: path.to_string(), message: format!("above maximum {max}") });
                }
            }
        }
        Value::Array(items) => {
            if let Some(min) = schema.min_items {
                if (items.len() as u64) < min {
                    errors.push(ValidationError { path: path.to_string(), message: format!("fewer than minItems {min}") });
                }
            }
            if let Some(max) = schema.max_items {
                if (items.len() as u64) > max {
                    errors.push(ValidationError { path: path.to_string(), message: format!("more than maxItems {max}") });
                }
            }
            if let Some(item_schema) = &schema.items {
                for (i, item) in items.iter().enumerate() {
                    validate_value(item_schema, item, &format!("{path}[{i}]"), errors);
                }
            }
        }
        Value::Object(map) => {
            for field in &schema.required {
                if !map.contains_key(field) {
                    errors.push(ValidationError {
                        path: format!("{path}.{field}"),
                        message: "required field missing".to_string(),
                    });
                }
            }
            if let Some(properties) = &schema.properties {
                for (key, prop_schema) in properties {
                    if let Some(child) = map.get(key) {
                        let child_path = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
                        validate_value(prop_schema, child, &child_path, errors);
                    }
                }
            }
        }
        _ => {}
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ToolValidationStats {
    pub validation_count: u64,
    pub failure_count: u64,
}

pub struct SchemaValidator {
    schemas: DashMap<String, Schema>,
    stats: DashMap<String, ToolValidationStats>,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self {
            schemas: DashMap::new(),
            stats: DashMap::new(),
        }
    }

    pub fn register(&self, tool: impl Into<String>, schema: Schema) {
        self.schemas.insert(tool.into(), schema);
    }

    pub fn unregister(&self, tool: &str) {
        self.schemas.remove(tool);
    }

    /// Unregistered tools always pass.
    pub fn validate(&self, tool: &str, data: &Value) -> Vec<ValidationError> {
        let mut entry = self.stats.entry(tool.to_string()).or_default();
        entry.validation_count += 1;

        let schema = match self.schemas.get(tool) {
            Some(s) => s,
            None => return Vec::new(),
        };

        let mut errors = Vec::new();
        validate_value(&schema, data, "", &mut errors);
        if !errors.is_empty() {
            entry.failure_count += 1;
        }
        errors
    }

    pub fn stats_for(&self, tool: &str) -> ToolValidationStats {
        self.stats.get(tool).map(|s| *s.value()).unwrap_or_default()
    }
}
