//! Structural merge of spec trees.
//!
//! Merge semantics (right side wins):
//! - Mappings: deep-merge by key
//! - Targets: deep-merge params by key, target name from the overlay
//! - Literal objects: deep-merge by key, also against mappings
//! - Lists and everything else: replace

use std::sync::Arc;

use serde_json::Value;

use crate::spec::{Spec, SpecMap};

/// Deep merge `overlay` onto `base`.
pub fn deep_merge(base: Spec, overlay: Spec) -> Spec {
    match (base, overlay) {
        (Spec::Map(base_map), Spec::Map(overlay_map)) => Spec::Map(merge_maps(base_map, overlay_map)),

        (Spec::Target(base_target), Spec::Target(overlay_target)) => {
            if Arc::ptr_eq(&base_target, &overlay_target) {
                return Spec::Target(overlay_target);
            }
            let mut merged = Arc::try_unwrap(base_target).unwrap_or_else(|shared| (*shared).clone());
            let overlay =
                Arc::try_unwrap(overlay_target).unwrap_or_else(|shared| (*shared).clone());
            merged.target = overlay.target;
            merged.params = merge_maps(merged.params, overlay.params);
            Spec::Target(Arc::new(merged))
        }

        (Spec::Literal(Value::Object(base_obj)), Spec::Literal(Value::Object(overlay_obj))) => {
            Spec::Literal(merge_documents(Value::Object(base_obj), Value::Object(overlay_obj)))
        }

        (Spec::Map(base_map), Spec::Literal(Value::Object(overlay_obj))) => {
            Spec::Map(merge_maps(base_map, literal_entries(overlay_obj)))
        }

        (Spec::Literal(Value::Object(base_obj)), Spec::Map(overlay_map)) => {
            Spec::Map(merge_maps(literal_entries(base_obj), overlay_map))
        }

        // Lists, scalars, instances, references and mixed pairings: overlay wins
        (_, overlay) => overlay,
    }
}

/// Merge several trees in order (first is base, last has highest precedence).
pub fn merge_all(layers: impl IntoIterator<Item = Spec>) -> Spec {
    layers.into_iter().fold(Spec::default(), deep_merge)
}

fn merge_maps(mut base: SpecMap, overlay: SpecMap) -> SpecMap {
    for (key, overlay_value) in overlay {
        let merged = match base.remove_in_place(&key) {
            Some(base_value) => deep_merge(base_value, overlay_value),
            None => overlay_value,
        };
        base.insert(key, merged);
    }
    base
}

fn literal_entries(obj: serde_json::Map<String, Value>) -> SpecMap {
    obj.into_iter().map(|(k, v)| (k, Spec::Literal(v))).collect()
}

/// Deep merge plain JSON documents: objects merge by key, anything else
/// is replaced by the overlay.
pub fn merge_documents(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => {
                        let base_value = slot.take();
                        *slot = merge_documents(base_value, overlay_value);
                    }
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

impl SpecMap {
    /// Take the value out of an entry while keeping the entry's position,
    /// so a following `insert` lands where the key was declared.
    fn remove_in_place(&mut self, key: &str) -> Option<Spec> {
        self.get_mut(key).map(std::mem::take)
    }
}
