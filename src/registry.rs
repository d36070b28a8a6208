// Supabase MCP Gateway - Capability Registry
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// The exposed operation surface. Built once at startup, sealed, then
// shared read-only. Anything not registered here is never forwarded.

use crate::backend::{Arguments, Backend, BackendError};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Declared type of one parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    StringArray,
    Enum(Vec<&'static str>),
}

impl ParamKind {
    /// Does `value` already have this kind, without coercion?
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Number => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::StringArray => value
                .as_array()
                .map(|items| items.iter().all(Value::is_string))
                .unwrap_or(false),
            ParamKind::Enum(choices) => value
                .as_str()
                .map(|s| choices.contains(&s))
                .unwrap_or(false),
        }
    }

    fn json_schema(&self) -> Value {
        match self {
            ParamKind::String => json!({"type": "string"}),
            ParamKind::Number => json!({"type": "number"}),
            ParamKind::Boolean => json!({"type": "boolean"}),
            ParamKind::StringArray => json!({"type": "array", "items": {"type": "string"}}),
            ParamKind::Enum(choices) => json!({"type": "string", "enum": choices}),
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::String => f.write_str("string"),
            ParamKind::Number => f.write_str("number"),
            ParamKind::Boolean => f.write_str("boolean"),
            ParamKind::StringArray => f.write_str("array<string>"),
            ParamKind::Enum(choices) => write!(f, "enum{{{}}}", choices.join(", ")),
        }
    }
}

/// One entry of a capability's input shape
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
    pub description: &'static str,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, required: true, default: None, description }
    }

    pub fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, required: false, default: None, description }
    }

    pub fn with_default(
        name: &'static str,
        kind: ParamKind,
        default: Value,
        description: &'static str,
    ) -> Self {
        Self { name, kind, required: false, default: Some(default), description }
    }
}

/// Backend binding of a capability: how to call it, how to present the result
pub trait Handler: Send + Sync {
    fn dispatch(&self, backend: &dyn Backend, args: &Arguments) -> Result<Value, BackendError>;

    /// Render a successful backend result for display. Deterministic.
    fn render(&self, result: &Value) -> String;
}

/// One exposed operation
#[derive(Clone)]
pub struct Capability {
    name: String,
    description: String,
    input_shape: Vec<ParamSpec>,
    handler: Arc<dyn Handler>,
}

impl Capability {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_shape: Vec::new(),
            handler,
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.input_shape.push(spec);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_shape(&self) -> &[ParamSpec] {
        &self.input_shape
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    /// JSON Schema for the input shape, as MCP `inputSchema`
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for spec in &self.input_shape {
            let mut prop = spec.kind.json_schema();
            prop["description"] = json!(spec.description);
            if let Some(default) = &spec.default {
                prop["default"] = default.clone();
            }
            properties.insert(spec.name.to_string(), prop);
            if spec.required {
                required.push(spec.name);
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("input_shape", &self.input_shape)
            .finish_non_exhaustive()
    }
}

/// Startup-time registry failures. Fatal to initialization.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate capability name '{0}'")]
    DuplicateName(String),
    #[error("registry is sealed; cannot register '{0}'")]
    Sealed(String),
    #[error("capability '{capability}': default for '{param}' is not a valid {kind}")]
    InvalidDefault { capability: String, param: String, kind: String },
}

/// Ordered, name-indexed set of capabilities
#[derive(Default)]
pub struct Registry {
    capabilities: Vec<Capability>,
    index: HashMap<String, usize>,
    sealed: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: Capability) -> Result<(), RegistryError> {
        if self.sealed {
            return Err(RegistryError::Sealed(capability.name));
        }
        if self.index.contains_key(&capability.name) {
            return Err(RegistryError::DuplicateName(capability.name));
        }
        for spec in &capability.input_shape {
            if let Some(default) = &spec.default {
                if !spec.kind.accepts(default) {
                    return Err(RegistryError::InvalidDefault {
                        capability: capability.name.clone(),
                        param: spec.name.to_string(),
                        kind: spec.kind.to_string(),
                    });
                }
            }
        }
        log::debug!("Registered capability {}", capability.name);
        self.index.insert(capability.name.clone(), self.capabilities.len());
        self.capabilities.push(capability);
        Ok(())
    }

    /// Freeze the surface. Idempotent.
    pub fn seal(&mut self) {
        if !self.sealed {
            log::info!("Capability registry sealed with {} entries", self.capabilities.len());
        }
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn lookup(&self, name: &str) -> Option<&Capability> {
        self.index.get(name).map(|&i| &self.capabilities[i])
    }

    /// All capabilities in registration order
    pub fn list(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Handler for Echo {
        fn dispatch(&self, _backend: &dyn Backend, args: &Arguments) -> Result<Value, BackendError> {
            Ok(Value::Object(args.clone()))
        }

        fn render(&self, result: &Value) -> String {
            result.to_string()
        }
    }

    fn cap(name: &str) -> Capability {
        Capability::new(name, "test capability", Arc::new(Echo))
    }

    #[test]
    fn lookup_finds_registered_capability() {
        let mut reg = Registry::new();
        reg.register(cap("a")).unwrap();
        reg.register(cap("b")).unwrap();
        assert_eq!(reg.lookup("b").map(Capability::name), Some("b"));
        assert!(reg.lookup("c").is_none());
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut reg = Registry::new();
        reg.register(cap("a")).unwrap();
        assert_eq!(reg.register(cap("a")), Err(RegistryError::DuplicateName("a".into())));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn register_after_seal_rejected() {
        let mut reg = Registry::new();
        reg.register(cap("a")).unwrap();
        reg.seal();
        assert!(reg.is_sealed());
        assert_eq!(reg.register(cap("b")), Err(RegistryError::Sealed("b".into())));
        assert!(reg.lookup("b").is_none());
    }

    #[test]
    fn list_keeps_registration_order_and_is_repeatable() {
        let mut reg = Registry::new();
        for name in ["zeta", "alpha", "mid"] {
            reg.register(cap(name)).unwrap();
        }
        reg.seal();
        let first: Vec<&str> = reg.list().iter().map(Capability::name).collect();
        let second: Vec<&str> = reg.list().iter().map(Capability::name).collect();
        assert_eq!(first, vec!["zeta", "alpha", "mid"]);
        assert_eq!(first, second);
    }

    #[test]
    fn default_must_match_kind() {
        let mut reg = Registry::new();
        let bad = cap("a").param(ParamSpec::with_default(
            "n", ParamKind::Number, json!("ten"), "count",
        ));
        assert!(matches!(reg.register(bad), Err(RegistryError::InvalidDefault { .. })));

        let bad_enum = cap("b").param(ParamSpec::with_default(
            "t", ParamKind::Enum(vec!["x", "y"]), json!("z"), "type",
        ));
        assert!(matches!(reg.register(bad_enum), Err(RegistryError::InvalidDefault { .. })));
    }

    #[test]
    fn input_schema_lists_required_and_defaults() {
        let c = cap("apply")
            .param(ParamSpec::required("sql", ParamKind::String, "SQL"))
            .param(ParamSpec::with_default(
                "type", ParamKind::Enum(vec!["all", "security"]), json!("all"), "kind",
            ));
        let schema = c.input_schema();
        assert_eq!(schema["required"], json!(["sql"]));
        assert_eq!(schema["properties"]["type"]["enum"], json!(["all", "security"]));
        assert_eq!(schema["properties"]["type"]["default"], json!("all"));
        assert_eq!(schema["properties"]["sql"]["type"], json!("string"));
    }
}
