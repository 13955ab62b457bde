//! Target factories and the values they receive and produce.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use scomp_spec::Instance;
use serde_json::Value;

/// Error type factories may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A constructor: built keyword arguments in, object out.
pub type Factory = Arc<dyn Fn(Kwargs) -> Result<Instance, BoxError> + Send + Sync>;

/// A fully built value.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Value(Value),
    /// Built mapping, in declaration order
    Map(Vec<(String, Resolved)>),
    List(Vec<Resolved>),
    Object(Instance),
}

impl Resolved {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Resolved::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Resolved::Object(i) => Some(i),
            _ => None,
        }
    }

    /// Shared handle to the built object, if it is a `T`.
    pub fn object<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.as_instance().and_then(Instance::downcast::<T>)
    }

    /// Entry of a built mapping.
    pub fn get(&self, key: &str) -> Option<&Resolved> {
        match self {
            Resolved::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Render as JSON; objects render as a placeholder naming their type.
    pub fn to_value(&self) -> Value {
        match self {
            Resolved::Value(v) => v.clone(),
            Resolved::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
            Resolved::List(items) => Value::Array(items.iter().map(Resolved::to_value).collect()),
            Resolved::Object(i) => Value::String(format!("<instance {}>", i.type_name())),
        }
    }
}

/// Errors reading keyword arguments inside a factory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KwargError {
    #[error("missing argument '{name}'")]
    Missing { name: String },

    #[error("argument '{name}' should be {expected}")]
    WrongType {
        name: String,
        expected: &'static str,
    },
}

/// Built arguments handed to a factory, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Kwargs {
    entries: Vec<(String, Resolved)>,
}

impl Kwargs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Resolved) {
        self.entries.push((name.into(), value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Resolved> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn require(&self, name: &str) -> Result<&Resolved, KwargError> {
        self.get(name).ok_or_else(|| KwargError::Missing {
            name: name.to_string(),
        })
    }

    fn value(&self, name: &str, expected: &'static str) -> Result<&Value, KwargError> {
        self.require(name)?
            .as_value()
            .ok_or_else(|| wrong(name, expected))
    }

    pub fn i64(&self, name: &str) -> Result<i64, KwargError> {
        self.value(name, "an integer")?
            .as_i64()
            .ok_or_else(|| wrong(name, "an integer"))
    }

    pub fn f64(&self, name: &str) -> Result<f64, KwargError> {
        self.value(name, "a number")?
            .as_f64()
            .ok_or_else(|| wrong(name, "a number"))
    }

    pub fn bool(&self, name: &str) -> Result<bool, KwargError> {
        self.value(name, "a boolean")?
            .as_bool()
            .ok_or_else(|| wrong(name, "a boolean"))
    }

    pub fn str(&self, name: &str) -> Result<&str, KwargError> {
        self.value(name, "a string")?
            .as_str()
            .ok_or_else(|| wrong(name, "a string"))
    }

    /// Built object argument of type `T`.
    pub fn object<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, KwargError> {
        self.require(name)?
            .object::<T>()
            .ok_or_else(|| wrong(name, std::any::type_name::<T>()))
    }
}

impl IntoIterator for Kwargs {
    type Item = (String, Resolved);
    type IntoIter = std::vec::IntoIter<(String, Resolved)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

fn wrong(name: &str, expected: &'static str) -> KwargError {
    KwargError::WrongType {
        name: name.to_string(),
        expected,
    }
}

/// Maps target identifiers to constructors.
#[derive(Clone, Default)]
pub struct FactoryRegistry {
    factories: BTreeMap<String, Factory>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor returning a plain value of type `T`.
    /// A later registration under the same name replaces the earlier one.
    pub fn register<T, E, F>(&mut self, target: impl Into<String>, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        E: Into<BoxError>,
        F: Fn(Kwargs) -> Result<T, E> + Send + Sync + 'static,
    {
        let wrapped: Factory =
            Arc::new(move |kwargs| factory(kwargs).map(Instance::new).map_err(Into::into));
        self.factories.insert(target.into(), wrapped);
        self
    }

    /// Register a constructor that already produces an [`Instance`].
    pub fn register_raw(&mut self, target: impl Into<String>, factory: Factory) -> &mut Self {
        self.factories.insert(target.into(), factory);
        self
    }

    pub fn get(&self, target: &str) -> Option<&Factory> {
        self.factories.get(target)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.factories.contains_key(target)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("targets", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
