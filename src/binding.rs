//! Trigger bindings: declared, ordered `(component, action)` invocations.
//!
//! A table is pure data. A driver asks for the bindings of a trigger and
//! invokes them itself; nothing here calls into components.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use scomp_spec::{ConfigPath, Spec, SpecError};

/// Errors reading a binding table from configuration.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("binding table must be a mapping of trigger to list, got {found}")]
    NotATable { found: String },

    #[error("bindings for trigger '{trigger}' must be a list")]
    NotAList { trigger: String },

    #[error("binding {index} of trigger '{trigger}' is invalid: {source}")]
    InvalidBinding {
        trigger: String,
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("binding table not found: {0}")]
    Missing(#[from] SpecError),
}

/// One invocation entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Name of the component to invoke
    pub component: String,
    pub action: String,
    #[serde(default)]
    pub params: Value,
    /// Lower runs first; ties keep declaration order
    #[serde(default)]
    pub order: i64,
}

impl Binding {
    pub fn new(component: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            action: action.into(),
            params: Value::Null,
            order: 0,
        }
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// Trigger name to ordered bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingTable {
    triggers: BTreeMap<String, Vec<Binding>>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a binding. It lands after every existing entry whose order
    /// is not greater than its own, so equal orders keep declaration order.
    pub fn bind(&mut self, trigger: impl Into<String>, binding: Binding) {
        let entries = self.triggers.entry(trigger.into()).or_default();
        let at = entries.partition_point(|existing| existing.order <= binding.order);
        entries.insert(at, binding);
    }

    /// Bindings for `trigger` in invocation order; empty when none exist.
    pub fn bindings_for(&self, trigger: &str) -> &[Binding] {
        self.triggers.get(trigger).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        self.triggers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.triggers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.values().all(Vec::is_empty)
    }

    /// Read `{trigger: [{component, action, params?, order?}, ...]}`.
    pub fn from_value(value: &Value) -> Result<Self, BindingError> {
        let Value::Object(map) = value else {
            return Err(BindingError::NotATable {
                found: kind_of(value).to_string(),
            });
        };

        let mut table = BindingTable::new();
        for (trigger, entries) in map {
            let Value::Array(entries) = entries else {
                return Err(BindingError::NotAList {
                    trigger: trigger.clone(),
                });
            };
            for (index, entry) in entries.iter().enumerate() {
                let binding = Binding::deserialize(entry).map_err(|source| {
                    BindingError::InvalidBinding {
                        trigger: trigger.clone(),
                        index,
                        source,
                    }
                })?;
                table.bind(trigger.clone(), binding);
            }
        }

        debug!(triggers = table.triggers.len(), bindings = table.len(), "loaded binding table");
        Ok(table)
    }

    /// Read the table stored at `path` of a composed tree.
    pub fn from_spec(tree: &Spec, path: &ConfigPath) -> Result<Self, BindingError> {
        let node = tree.lookup(path)?;
        let value = match node.as_value() {
            Some(value) => value.clone(),
            None => node.to_spec().to_value(),
        };
        Self::from_value(&value)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
