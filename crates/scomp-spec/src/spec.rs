//! The spec tree and path-addressed edits on it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::SpecError;
use crate::path::ConfigPath;

/// An already-constructed object carried through a spec tree unchanged.
///
/// Equality is identity: two instances are equal only if they share the
/// same allocation.
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Instance {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Shared handle to the concrete object, if it is a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Rust type name recorded at construction, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// True if both handles point at the same object.
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::as_ptr(&self.value) as *const () == Arc::as_ptr(&other.value) as *const ()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({})", self.type_name)
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// Insertion-ordered mapping of name to spec.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecMap {
    entries: Vec<(String, Spec)>,
}

impl SpecMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Spec> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Spec> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace. A replaced entry keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: Spec) -> Option<Spec> {
        let key = key.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Spec> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Spec)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: Spec) -> Self {
        self.insert(key, value);
        self
    }
}

impl IntoIterator for SpecMap {
    type Item = (String, Spec);
    type IntoIter = std::vec::IntoIter<(String, Spec)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>> FromIterator<(K, Spec)> for SpecMap {
    fn from_iter<I: IntoIterator<Item = (K, Spec)>>(iter: I) -> Self {
        let mut map = SpecMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// A deferred construction request: the factory named by `target` is
/// invoked with `params` once they have been built.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSpec {
    pub target: String,
    pub params: SpecMap,
}

impl TargetSpec {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            params: SpecMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Spec) -> Self {
        self.params.insert(name, value);
        self
    }
}

/// A node of the spec tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Spec {
    /// A scalar, or a plain container holding only literals.
    Literal(Value),
    /// Keyed container whose values are specs.
    Map(SpecMap),
    /// Ordered container whose items are specs.
    List(Vec<Spec>),
    /// Construction request. Shared subtrees are shared by `Arc` identity.
    Target(Arc<TargetSpec>),
    /// Already-built object, passed through unchanged.
    Instance(Instance),
    /// Reference to another path of the same tree (`${timing.fps}`).
    Ref(ConfigPath),
}

impl Default for Spec {
    fn default() -> Self {
        Spec::Map(SpecMap::new())
    }
}

impl From<TargetSpec> for Spec {
    fn from(target: TargetSpec) -> Self {
        Spec::Target(Arc::new(target))
    }
}

impl From<SpecMap> for Spec {
    fn from(map: SpecMap) -> Self {
        Spec::Map(map)
    }
}

impl From<Instance> for Spec {
    fn from(instance: Instance) -> Self {
        Spec::Instance(instance)
    }
}

impl Spec {
    pub fn literal(value: impl Into<Value>) -> Self {
        Spec::Literal(value.into())
    }

    /// Wrap an existing shared target without re-allocating, so the same
    /// node can be mounted under several parents.
    pub fn shared(target: &Arc<TargetSpec>) -> Self {
        Spec::Target(Arc::clone(target))
    }

    pub fn instance<T: std::any::Any + Send + Sync>(value: T) -> Self {
        Spec::Instance(Instance::new(value))
    }

    pub fn reference(path: &str) -> Result<Self, SpecError> {
        Ok(Spec::Ref(ConfigPath::parse(path)?))
    }

    /// Short name of the node kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Spec::Literal(Value::Object(_)) => "literal mapping",
            Spec::Literal(Value::Array(_)) => "literal list",
            Spec::Literal(_) => "scalar",
            Spec::Map(_) => "mapping",
            Spec::List(_) => "list",
            Spec::Target(_) => "target",
            Spec::Instance(_) => "instance",
            Spec::Ref(_) => "reference",
        }
    }

    pub fn as_target(&self) -> Option<&Arc<TargetSpec>> {
        match self {
            Spec::Target(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Spec::Literal(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&SpecMap> {
        match self {
            Spec::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Read the node at `path`. Walks through mappings, target params,
    /// lists and literal containers.
    pub fn lookup(&self, path: &ConfigPath) -> Result<SpecRef<'_>, SpecError> {
        let mut node = SpecRef::Spec(self);
        for (depth, segment) in path.segments().iter().enumerate() {
            node = node.child(segment, path, depth)?;
        }
        Ok(node)
    }

    /// True if `path` resolves to an existing node.
    pub fn contains(&self, path: &ConfigPath) -> bool {
        self.lookup(path).is_ok()
    }

    /// Replace the existing node at `path`.
    pub fn set(&mut self, path: &ConfigPath, value: Spec) -> Result<Spec, SpecError> {
        let Some(leaf) = path.leaf() else {
            return Ok(std::mem::replace(self, value));
        };
        let depth = path.len() - 1;
        let parent = self.walk_mut(path, depth)?;
        let slot = child_slot(parent, leaf, path, depth)?;
        Ok(std::mem::replace(slot, value))
    }

    /// Add a node that must not exist yet. The parent must exist.
    pub fn insert(&mut self, path: &ConfigPath, value: Spec) -> Result<(), SpecError> {
        let Some(leaf) = path.leaf() else {
            return Err(SpecError::FieldExists {
                path: "<root>".to_string(),
            });
        };
        let depth = path.len() - 1;
        let parent = self.walk_mut(path, depth)?;
        parent.lift_literal_container();
        let map = match parent {
            Spec::Map(m) => m,
            Spec::Target(t) => &mut Arc::make_mut(t).params,
            other => return Err(SpecError::mismatch(at(path, depth), other.kind())),
        };
        if map.contains_key(leaf) {
            return Err(SpecError::FieldExists {
                path: path.to_string(),
            });
        }
        map.insert(leaf, value);
        Ok(())
    }

    /// Remove an existing node and return it.
    pub fn remove(&mut self, path: &ConfigPath) -> Result<Spec, SpecError> {
        let Some(leaf) = path.leaf() else {
            return Err(SpecError::InvalidPath {
                path: String::new(),
                reason: "cannot remove the root".to_string(),
            });
        };
        let depth = path.len() - 1;
        let parent = self.walk_mut(path, depth)?;
        parent.lift_literal_container();
        match parent {
            Spec::Map(m) => m
                .remove(leaf)
                .ok_or_else(|| SpecError::not_found(path.to_string())),
            Spec::Target(t) => Arc::make_mut(t)
                .params
                .remove(leaf)
                .ok_or_else(|| SpecError::not_found(path.to_string())),
            Spec::List(items) => {
                let index = ConfigPath::as_index(leaf)
                    .ok_or_else(|| SpecError::mismatch(at(path, depth), "list"))?;
                if index < items.len() {
                    Ok(items.remove(index))
                } else {
                    Err(SpecError::not_found(path.to_string()))
                }
            }
            other => Err(SpecError::mismatch(at(path, depth), other.kind())),
        }
    }

    /// Walk the first `depth` segments mutably, copying shared targets on
    /// the way down so edits never leak into other holders of the tree.
    fn walk_mut(&mut self, path: &ConfigPath, depth: usize) -> Result<&mut Spec, SpecError> {
        let mut node = self;
        for (i, segment) in path.segments()[..depth].iter().enumerate() {
            node = child_slot(node, segment, path, i)?;
        }
        Ok(node)
    }

    /// Turn a literal object/array into a `Map`/`List` of literals so that
    /// its children become addressable specs. No-op for other nodes.
    fn lift_literal_container(&mut self) {
        let lifted = match self {
            Spec::Literal(Value::Object(obj)) => Spec::Map(
                std::mem::take(obj)
                    .into_iter()
                    .map(|(k, v)| (k, Spec::Literal(v)))
                    .collect(),
            ),
            Spec::Literal(Value::Array(items)) => Spec::List(
                std::mem::take(items)
                    .into_iter()
                    .map(Spec::Literal)
                    .collect(),
            ),
            _ => return,
        };
        *self = lifted;
    }
}

fn at(path: &ConfigPath, depth: usize) -> String {
    if depth == 0 {
        "<root>".to_string()
    } else {
        path.prefix_string(depth)
    }
}

fn child_slot<'a>(
    node: &'a mut Spec,
    segment: &str,
    path: &ConfigPath,
    depth: usize,
) -> Result<&'a mut Spec, SpecError> {
    node.lift_literal_container();
    let missing = || SpecError::not_found(path.prefix_string(depth + 1));
    match node {
        Spec::Map(m) => m.get_mut(segment).ok_or_else(missing),
        Spec::Target(t) => Arc::make_mut(t).params.get_mut(segment).ok_or_else(missing),
        Spec::List(items) => {
            let index = ConfigPath::as_index(segment)
                .ok_or_else(|| SpecError::mismatch(at(path, depth), "list"))?;
            items.get_mut(index).ok_or_else(missing)
        }
        other => Err(SpecError::mismatch(at(path, depth), other.kind())),
    }
}

/// Borrowed view of a node found by [`Spec::lookup`]. Nodes inside literal
/// containers are plain JSON values.
#[derive(Debug, Clone, Copy)]
pub enum SpecRef<'a> {
    Spec(&'a Spec),
    Value(&'a Value),
}

impl<'a> SpecRef<'a> {
    fn child(self, segment: &str, path: &ConfigPath, depth: usize) -> Result<SpecRef<'a>, SpecError> {
        let missing = || SpecError::not_found(path.prefix_string(depth + 1));
        match self {
            SpecRef::Spec(Spec::Map(m)) => m.get(segment).map(SpecRef::Spec).ok_or_else(missing),
            SpecRef::Spec(Spec::Target(t)) => {
                t.params.get(segment).map(SpecRef::Spec).ok_or_else(missing)
            }
            SpecRef::Spec(Spec::List(items)) => {
                let index = ConfigPath::as_index(segment)
                    .ok_or_else(|| SpecError::mismatch(at(path, depth), "list"))?;
                items.get(index).map(SpecRef::Spec).ok_or_else(missing)
            }
            SpecRef::Spec(Spec::Literal(value)) => SpecRef::Value(value).child(segment, path, depth),
            SpecRef::Spec(other) => Err(SpecError::mismatch(at(path, depth), other.kind())),
            SpecRef::Value(Value::Object(obj)) => {
                obj.get(segment).map(SpecRef::Value).ok_or_else(missing)
            }
            SpecRef::Value(Value::Array(items)) => {
                let index = ConfigPath::as_index(segment)
                    .ok_or_else(|| SpecError::mismatch(at(path, depth), "literal list"))?;
                items.get(index).map(SpecRef::Value).ok_or_else(missing)
            }
            SpecRef::Value(_) => Err(SpecError::mismatch(at(path, depth), "scalar")),
        }
    }

    /// Owned copy of the node as a spec.
    pub fn to_spec(&self) -> Spec {
        match self {
            SpecRef::Spec(spec) => (*spec).clone(),
            SpecRef::Value(value) => Spec::Literal((*value).clone()),
        }
    }

    /// The node's literal value, if it is one.
    pub fn as_value(&self) -> Option<&'a Value> {
        match *self {
            SpecRef::Spec(Spec::Literal(v)) => Some(v),
            SpecRef::Value(v) => Some(v),
            SpecRef::Spec(_) => None,
        }
    }

    pub fn as_spec(&self) -> Option<&'a Spec> {
        match *self {
            SpecRef::Spec(s) => Some(s),
            SpecRef::Value(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> ConfigPath {
        ConfigPath::parse(p).unwrap()
    }

    fn scene_tree() -> Spec {
        let grid = TargetSpec::new("Grid").with_param("width", Spec::literal(10));
        let scene = TargetSpec::new("Scene").with_param(
            "widgets",
            Spec::Map(SpecMap::new().with("grid", grid.into())),
        );
        Spec::Map(SpecMap::new().with("scene", scene.into()))
    }

    #[test]
    fn test_lookup_through_targets_and_maps() {
        let tree = scene_tree();
        let found = tree.lookup(&path("scene.widgets.grid.width")).unwrap();
        assert_eq!(found.as_value(), Some(&json!(10)));
    }

    #[test]
    fn test_lookup_missing_reports_prefix() {
        let tree = scene_tree();
        let err = tree.lookup(&path("scene.widgets.ghost.x")).unwrap_err();
        assert_eq!(
            err,
            SpecError::PathNotFound {
                path: "scene.widgets.ghost".to_string()
            }
        );
    }

    #[test]
    fn test_lookup_into_scalar_is_mismatch() {
        let tree = scene_tree();
        let err = tree.lookup(&path("scene.widgets.grid.width.x")).unwrap_err();
        assert!(matches!(err, SpecError::TypeMismatch { found: "scalar", .. }));
    }

    #[test]
    fn test_lookup_inside_literal_container() {
        let tree = Spec::Map(SpecMap::new().with(
            "theme",
            Spec::literal(json!({"palette": ["#000", "#fff"]})),
        ));
        let found = tree.lookup(&path("theme.palette.1")).unwrap();
        assert_eq!(found.as_value(), Some(&json!("#fff")));
    }

    #[test]
    fn test_set_replaces_leaf() {
        let mut tree = scene_tree();
        let old = tree
            .set(&path("scene.widgets.grid.width"), Spec::literal(15))
            .unwrap();
        assert_eq!(old, Spec::literal(10));
        let found = tree.lookup(&path("scene.widgets.grid.width")).unwrap();
        assert_eq!(found.as_value(), Some(&json!(15)));
    }

    #[test]
    fn test_set_does_not_touch_shared_copy() {
        let original = scene_tree();
        let mut edited = original.clone();
        edited
            .set(&path("scene.widgets.grid.width"), Spec::literal(99))
            .unwrap();

        let before = original.lookup(&path("scene.widgets.grid.width")).unwrap();
        assert_eq!(before.as_value(), Some(&json!(10)));
    }

    #[test]
    fn test_set_inside_literal_container_lifts() {
        let mut tree = Spec::Map(SpecMap::new().with(
            "theme",
            Spec::literal(json!({"colors": {"bg": "black"}})),
        ));
        tree.set(&path("theme.colors.bg"), Spec::literal("white"))
            .unwrap();
        let found = tree.lookup(&path("theme.colors.bg")).unwrap();
        assert_eq!(found.as_value(), Some(&json!("white")));
    }

    #[test]
    fn test_set_list_index() {
        let mut tree = Spec::Map(SpecMap::new().with(
            "layers",
            Spec::List(vec![Spec::literal(1), Spec::literal(2)]),
        ));
        tree.set(&path("layers.1"), Spec::literal(5)).unwrap();
        assert_eq!(
            tree.lookup(&path("layers.1")).unwrap().as_value(),
            Some(&json!(5))
        );
        assert!(matches!(
            tree.set(&path("layers.7"), Spec::literal(0)),
            Err(SpecError::PathNotFound { .. })
        ));
        assert!(matches!(
            tree.set(&path("layers.first"), Spec::literal(0)),
            Err(SpecError::TypeMismatch { found: "list", .. })
        ));
    }

    #[test]
    fn test_insert_rejects_existing() {
        let mut tree = scene_tree();
        let err = tree
            .insert(&path("scene.widgets.grid.width"), Spec::literal(1))
            .unwrap_err();
        assert!(matches!(err, SpecError::FieldExists { .. }));

        tree.insert(&path("scene.widgets.grid.height"), Spec::literal(4))
            .unwrap();
        assert!(tree.contains(&path("scene.widgets.grid.height")));
    }

    #[test]
    fn test_insert_requires_parent() {
        let mut tree = scene_tree();
        let err = tree
            .insert(&path("scene.missing.height"), Spec::literal(4))
            .unwrap_err();
        assert!(matches!(err, SpecError::PathNotFound { .. }));
    }

    #[test]
    fn test_remove() {
        let mut tree = scene_tree();
        let removed = tree.remove(&path("scene.widgets.grid")).unwrap();
        assert_eq!(removed.as_target().unwrap().target, "Grid");
        assert!(!tree.contains(&path("scene.widgets.grid")));
        assert!(tree.remove(&path("scene.widgets.grid")).is_err());
    }

    #[test]
    fn test_spec_map_keeps_position_on_replace() {
        let mut map = SpecMap::new()
            .with("a", Spec::literal(1))
            .with("b", Spec::literal(2));
        map.insert("a", Spec::literal(3));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map.get("a"), Some(&Spec::literal(3)));
    }

    #[test]
    fn test_instance_identity() {
        let a = Instance::new(5u32);
        let b = a.clone();
        let c = Instance::new(5u32);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.downcast_ref::<u32>(), Some(&5));
        assert!(a.downcast::<String>().is_none());
    }
}
