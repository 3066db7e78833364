//! Runtime variables: a typed registry backing the `SET`/`RESET`/`SHOW`
//! commands.
//!
//! Generalized from the teacher's `cluster::config::{Parameter, Value}`
//! (itself a thin wrapper over PostgreSQL's own GUC system) to a local,
//! in-process registry — `archivectl`'s own runtime variables, not the
//! upstream server's settings (those are reached through
//! [`crate::stream::ReplicationStream::get_server_setting`] instead).

use std::collections::BTreeMap;
use std::fmt;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("no such runtime variable {0:?}")]
    NoSuchVariable(String),

    #[error("{0:?} is not a valid value for {1:?}")]
    InvalidValue(String, String),

    #[error("{value} is out of range [{min}, {max}] for {name:?}")]
    OutOfRange { name: String, value: i64, min: i64, max: i64 },

    #[error("{0:?} is not one of the permitted values for {1:?}")]
    NotInEnum(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableValue {
    Bool(bool),
    String(String),
    Integer(i64),
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableValue::Bool(b) => write!(f, "{b}"),
            VariableValue::String(s) => write!(f, "{s}"),
            VariableValue::Integer(i) => write!(f, "{i}"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum VariableKind {
    Bool,
    String,
    Integer { min: Option<i64>, max: Option<i64> },
    Enum(Vec<String>),
}

/// One named, typed runtime variable with a default, a current value, and
/// an optional hook run after every successful `set`.
pub struct RuntimeVariable {
    name: String,
    kind: VariableKind,
    default: VariableValue,
    current: VariableValue,
    on_set: Option<Box<dyn FnMut(&VariableValue) + Send>>,
}

impl fmt::Debug for RuntimeVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeVariable")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl RuntimeVariable {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: VariableKind, default: VariableValue) -> Self {
        Self { name: name.into(), kind, current: default.clone(), default, on_set: None }
    }

    #[must_use]
    pub fn with_hook(mut self, hook: impl FnMut(&VariableValue) + Send + 'static) -> Self {
        self.on_set = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn current(&self) -> &VariableValue {
        &self.current
    }

    #[must_use]
    pub fn default_value(&self) -> &VariableValue {
        &self.default
    }

    fn validate(&self, value: &VariableValue) -> Result<(), ConfigError> {
        match (&self.kind, value) {
            (VariableKind::Bool, VariableValue::Bool(_))
            | (VariableKind::String, VariableValue::String(_)) => Ok(()),
            (VariableKind::Integer { min, max }, VariableValue::Integer(n)) => {
                let min = min.unwrap_or(i64::MIN);
                let max = max.unwrap_or(i64::MAX);
                if *n < min || *n > max {
                    Err(ConfigError::OutOfRange { name: self.name.clone(), value: *n, min, max })
                } else {
                    Ok(())
                }
            }
            (VariableKind::Enum(allowed), VariableValue::String(s)) => {
                if allowed.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(ConfigError::NotInEnum(s.clone(), self.name.clone()))
                }
            }
            _ => Err(ConfigError::InvalidValue(value.to_string(), self.name.clone())),
        }
    }

    pub fn set(&mut self, value: VariableValue) -> Result<(), ConfigError> {
        self.validate(&value)?;
        self.current = value;
        if let Some(hook) = &mut self.on_set {
            hook(&self.current);
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.current = self.default.clone();
        if let Some(hook) = &mut self.on_set {
            hook(&self.current);
        }
    }
}

/// `SET`/`RESET`/`SHOW` operate exclusively through this registry.
#[derive(Default)]
pub struct VariableRegistry {
    variables: BTreeMap<String, RuntimeVariable>,
}

impl VariableRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, variable: RuntimeVariable) {
        self.variables.insert(variable.name().to_owned(), variable);
    }

    pub fn set(&mut self, name: &str, value: VariableValue) -> Result<(), ConfigError> {
        self.variables
            .get_mut(name)
            .ok_or_else(|| ConfigError::NoSuchVariable(name.to_owned()))?
            .set(value)
    }

    pub fn reset(&mut self, name: &str) -> Result<(), ConfigError> {
        self.variables
            .get_mut(name)
            .ok_or_else(|| ConfigError::NoSuchVariable(name.to_owned()))?
            .reset();
        Ok(())
    }

    pub fn show(&self, name: &str) -> Result<&VariableValue, ConfigError> {
        self.variables
            .get(name)
            .map(RuntimeVariable::current)
            .ok_or_else(|| ConfigError::NoSuchVariable(name.to_owned()))
    }

    pub fn show_all(&self) -> impl Iterator<Item = (&str, &VariableValue)> {
        self.variables.values().map(|v| (v.name(), v.current()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn set_validates_against_kind() {
        let mut registry = VariableRegistry::new();
        registry.register(RuntimeVariable::new(
            "max_workers",
            VariableKind::Integer { min: Some(1), max: Some(64) },
            VariableValue::Integer(4),
        ));

        assert!(registry.set("max_workers", VariableValue::Integer(10)).is_ok());
        assert!(matches!(
            registry.set("max_workers", VariableValue::Integer(100)),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn reset_restores_default() {
        let mut registry = VariableRegistry::new();
        registry.register(RuntimeVariable::new(
            "compress_type",
            VariableKind::Enum(vec!["none".into(), "gzip".into(), "zstd".into()]),
            VariableValue::String("none".into()),
        ));
        registry.set("compress_type", VariableValue::String("zstd".into())).unwrap();
        assert_eq!(*registry.show("compress_type").unwrap(), VariableValue::String("zstd".into()));
        registry.reset("compress_type").unwrap();
        assert_eq!(*registry.show("compress_type").unwrap(), VariableValue::String("none".into()));
    }

    #[test]
    fn hook_runs_on_set_and_reset() {
        let calls = Arc::new(Mutex::new(0));
        let calls_in_hook = Arc::clone(&calls);
        let mut registry = VariableRegistry::new();
        registry.register(
            RuntimeVariable::new("fast_checkpoint", VariableKind::Bool, VariableValue::Bool(false))
                .with_hook(move |_| *calls_in_hook.lock().unwrap() += 1),
        );
        registry.set("fast_checkpoint", VariableValue::Bool(true)).unwrap();
        registry.reset("fast_checkpoint").unwrap();
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn rejects_unknown_variable() {
        let mut registry = VariableRegistry::new();
        assert!(matches!(
            registry.set("nope", VariableValue::Bool(true)),
            Err(ConfigError::NoSuchVariable(_))
        ));
    }
}
