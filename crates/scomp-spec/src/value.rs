//! Conversion between spec trees and plain JSON documents.
//!
//! Documents mark construction requests with a `_target_` key and
//! references with whole-string `${path}` interpolations.

use std::sync::{Arc, OnceLock};

use regex_lite::Regex;
use serde_json::{Map, Value};

use crate::error::SpecError;
use crate::path::ConfigPath;
use crate::spec::{Spec, SpecMap, TargetSpec};

/// Key naming the factory of a construction request.
pub const TARGET_KEY: &str = "_target_";

/// Whole-string reference: `${timing.fps}`.
pub const REF_PATTERN: &str = r"^\$\{\s*([^{}\s]+)\s*\}$";

fn ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(REF_PATTERN).expect("reference pattern is valid"))
}

fn reference_target(s: &str) -> Option<&str> {
    ref_regex()
        .captures(s)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// True if the value holds neither targets nor references anywhere.
fn is_plain(value: &Value) -> bool {
    match value {
        Value::Object(obj) => !obj.contains_key(TARGET_KEY) && obj.values().all(is_plain),
        Value::Array(items) => items.iter().all(is_plain),
        Value::String(s) => reference_target(s).is_none(),
        _ => true,
    }
}

impl Spec {
    /// Build a spec tree from a JSON document.
    ///
    /// Objects become mappings (or targets when they carry `_target_`),
    /// arrays stay literal unless an item needs building, and `${a.b}`
    /// strings become references.
    pub fn from_value(value: Value) -> Result<Spec, SpecError> {
        from_value_at(value, &ConfigPath::root())
    }

    /// Render the tree as a JSON document. Instances render as a
    /// placeholder string naming their type.
    pub fn to_value(&self) -> Value {
        match self {
            Spec::Literal(v) => v.clone(),
            Spec::Map(map) => Value::Object(map_to_object(map)),
            Spec::List(items) => Value::Array(items.iter().map(Spec::to_value).collect()),
            Spec::Target(target) => {
                let mut obj = Map::new();
                obj.insert(TARGET_KEY.to_string(), Value::String(target.target.clone()));
                obj.extend(map_to_object(&target.params));
                Value::Object(obj)
            }
            Spec::Instance(instance) => Value::String(format!("<instance {}>", instance.type_name())),
            Spec::Ref(path) => Value::String(format!("${{{}}}", path)),
        }
    }
}

fn map_to_object(map: &SpecMap) -> Map<String, Value> {
    map.iter().map(|(k, v)| (k.to_string(), v.to_value())).collect()
}

fn from_value_at(value: Value, path: &ConfigPath) -> Result<Spec, SpecError> {
    match value {
        Value::Object(obj) => {
            let mut target_value = None;
            let mut params = SpecMap::new();
            for (key, child) in obj {
                if key == TARGET_KEY {
                    target_value = Some(child);
                    continue;
                }
                let child_path = path.child(key.clone());
                params.insert(key, from_value_at(child, &child_path)?);
            }

            let target = match target_value {
                None => None,
                Some(Value::String(name)) if !name.trim().is_empty() => Some(name),
                Some(_) => {
                    return Err(SpecError::InvalidTarget {
                        path: display(path),
                        reason: format!("{} must be a non-empty string", TARGET_KEY),
                    })
                }
            };

            Ok(match target {
                Some(name) => Spec::Target(Arc::new(TargetSpec {
                    target: name,
                    params,
                })),
                None => Spec::Map(params),
            })
        }
        Value::Array(items) => {
            if items.iter().all(is_plain) {
                return Ok(Spec::Literal(Value::Array(items)));
            }
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| from_value_at(item, &path.child(i.to_string())))
                .collect::<Result<Vec<_>, _>>()
                .map(Spec::List)
        }
        Value::String(s) => match reference_target(&s) {
            Some(inner) => Ok(Spec::Ref(ConfigPath::parse(inner)?)),
            None => Ok(Spec::Literal(Value::String(s))),
        },
        other => Ok(Spec::Literal(other)),
    }
}

fn display(path: &ConfigPath) -> String {
    if path.is_root() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}
