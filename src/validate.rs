// Supabase MCP Gateway - Argument Validator
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Checks caller arguments against a capability's declared input shape:
// - Required parameters present
// - Defaults applied for absent optionals
// - Kind coercion (numeric strings, "true"/"false", single string → array)
// - Enum membership
// Excess keys are ignored with a warning, never an error.

use crate::backend::Arguments;
use crate::registry::{ParamKind, ParamSpec};
use serde_json::{Number, Value};

/// Validation result
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub arguments: Arguments,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self { valid: true, ..Default::default() }
    }

    pub fn warn(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    pub fn error(&mut self, msg: String) {
        self.valid = false;
        self.errors.push(msg);
    }

    /// All errors as one caller-facing sentence
    pub fn error_message(&self) -> String {
        self.errors.join("; ")
    }
}

/// Validate and normalize raw arguments against an input shape
pub fn validate_arguments(shape: &[ParamSpec], raw: &Value) -> ValidationResult {
    let mut result = ValidationResult::ok();

    let supplied = match raw {
        Value::Object(map) => map.clone(),
        Value::Null => Arguments::new(),
        other => {
            result.error(format!(
                "arguments must be a JSON object, got {}",
                json_type_name(other)
            ));
            return result;
        }
    };

    for spec in shape {
        let value = supplied.get(spec.name).filter(|v| !v.is_null());

        let value = match value {
            Some(v) => v,
            None => {
                if let Some(default) = &spec.default {
                    result.arguments.insert(spec.name.to_string(), default.clone());
                } else if spec.required {
                    result.error(format!("missing required argument '{}'", spec.name));
                }
                continue;
            }
        };

        match coerce(&spec.kind, value) {
            Ok(normalized) => {
                if &normalized != value {
                    log::debug!("Coerced argument '{}' to {}", spec.name, spec.kind);
                }
                result.arguments.insert(spec.name.to_string(), normalized);
            }
            Err(reason) => result.error(format!("argument '{}': {}", spec.name, reason)),
        }
    }

    for key in supplied.keys() {
        if !shape.iter().any(|spec| spec.name == key.as_str()) {
            result.warn(format!("ignored unknown argument '{}'", key));
        }
    }

    result
}

/// Coerce one value to a declared kind, or explain why it can't be
fn coerce(kind: &ParamKind, value: &Value) -> Result<Value, String> {
    match kind {
        ParamKind::String => match value {
            Value::String(_) => Ok(value.clone()),
            other => Err(format!("expected string, got {}", json_type_name(other))),
        },
        ParamKind::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => parse_number(s.trim())
                .ok_or_else(|| format!("expected number, got \"{}\"", s)),
            other => Err(format!("expected number, got {}", json_type_name(other))),
        },
        ParamKind::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            other => Err(format!("expected boolean, got {}", json_type_name(other))),
        },
        ParamKind::StringArray => match value {
            Value::String(s) => Ok(Value::Array(vec![Value::String(s.clone())])),
            Value::Array(items) => {
                if let Some(bad) = items.iter().find(|v| !v.is_string()) {
                    Err(format!("expected array of strings, found {}", json_type_name(bad)))
                } else {
                    Ok(value.clone())
                }
            }
            other => Err(format!("expected array of strings, got {}", json_type_name(other))),
        },
        ParamKind::Enum(choices) => match value.as_str() {
            Some(s) if choices.contains(&s) => Ok(value.clone()),
            Some(s) => Err(format!("'{}' is not one of: {}", s, choices.join(", "))),
            None => Err(format!(
                "expected one of: {}, got {}",
                choices.join(", "),
                json_type_name(value)
            )),
        },
    }
}

fn parse_number(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
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

// ============================================================================
// TESTS
// ============================================================================
