//! Instantiation: turn a spec tree into built objects.
//!
//! The walk is depth-first and synchronous. Each target node is built at
//! most once per call, keyed by the node's `Arc` identity, so a subtree
//! mounted under two parents (or reached through a reference) yields one
//! shared object. Params are built in declaration order before the
//! target's factory runs.

mod factory;

pub use factory::{BoxError, Factory, FactoryRegistry, KwargError, Kwargs, Resolved};

use std::collections::HashMap;

use scomp_spec::{ConfigPath, Instance, Spec, SpecError, SpecRef, TargetSpec};
use thiserror::Error;
use tracing::debug;

/// Errors raised while building a spec tree.
#[derive(Debug, Error)]
pub enum InstantiateError {
    #[error("unknown target '{target}' at {path}")]
    UnknownTarget { target: String, path: String },

    #[error("constructing '{target}' at {path} failed: {source}")]
    Construction {
        target: String,
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("reference cycle: {}", .chain.join(" -> "))]
    CycleDetected { chain: Vec<String> },

    #[error("reference '${{{reference}}}' at {path} does not resolve: {source}")]
    BrokenReference {
        path: String,
        reference: String,
        #[source]
        source: SpecError,
    },

    #[error(transparent)]
    Path(#[from] SpecError),
}

/// Builds spec trees with a set of factories.
#[derive(Debug, Clone, Copy)]
pub struct Instantiator<'f> {
    factories: &'f FactoryRegistry,
}

impl<'f> Instantiator<'f> {
    pub fn new(factories: &'f FactoryRegistry) -> Self {
        Self { factories }
    }

    /// Build the whole tree. References resolve against `spec` itself.
    pub fn instantiate(&self, spec: &Spec) -> Result<Resolved, InstantiateError> {
        Walk::new(self.factories, spec).build(spec, &ConfigPath::root())
    }

    /// Build only the node at `path`; references still resolve against
    /// the whole of `root`.
    pub fn instantiate_at(
        &self,
        root: &Spec,
        path: &ConfigPath,
    ) -> Result<Resolved, InstantiateError> {
        let mut walk = Walk::new(self.factories, root);
        match root.lookup(path)? {
            SpecRef::Spec(node) => walk.build(node, path),
            SpecRef::Value(value) => Ok(Resolved::Value(value.clone())),
        }
    }
}

/// State of one instantiation call.
struct Walk<'a> {
    factories: &'a FactoryRegistry,
    root: &'a Spec,
    built: HashMap<*const TargetSpec, Instance>,
    /// References currently being followed, outermost first
    following: Vec<ConfigPath>,
}

impl<'a> Walk<'a> {
    fn new(factories: &'a FactoryRegistry, root: &'a Spec) -> Self {
        Self {
            factories,
            root,
            built: HashMap::new(),
            following: Vec::new(),
        }
    }

    fn build(&mut self, spec: &'a Spec, path: &ConfigPath) -> Result<Resolved, InstantiateError> {
        match spec {
            Spec::Literal(value) => Ok(Resolved::Value(value.clone())),
            Spec::Instance(instance) => Ok(Resolved::Object(instance.clone())),
            Spec::Map(map) => map
                .iter()
                .map(|(key, child)| {
                    self.build(child, &path.child(key))
                        .map(|built| (key.to_string(), built))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Resolved::Map),
            Spec::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.build(item, &path.child(i.to_string())))
                .collect::<Result<Vec<_>, _>>()
                .map(Resolved::List),
            Spec::Target(target) => {
                let key = std::sync::Arc::as_ptr(target);
                if let Some(existing) = self.built.get(&key) {
                    debug!(target = %target.target, path = %display(path), "reusing shared object");
                    return Ok(Resolved::Object(existing.clone()));
                }
                let instance = self.construct(target, path)?;
                self.built.insert(key, instance.clone());
                Ok(Resolved::Object(instance))
            }
            Spec::Ref(reference) => self.follow(reference, path),
        }
    }

    fn construct(&mut self, target: &'a TargetSpec, path: &ConfigPath) -> Result<Instance, InstantiateError> {
        // Look the factory up first so params with side effects are not
        // built for a target that cannot be constructed.
        let factory = self
            .factories
            .get(&target.target)
            .cloned()
            .ok_or_else(|| InstantiateError::UnknownTarget {
                target: target.target.clone(),
                path: display(path),
            })?;

        let mut kwargs = Kwargs::new();
        for (name, param) in target.params.iter() {
            let value = self.build(param, &path.child(name))?;
            kwargs.push(name, value);
        }

        debug!(target = %target.target, path = %display(path), params = kwargs.len(), "constructing");
        factory(kwargs).map_err(|source| InstantiateError::Construction {
            target: target.target.clone(),
            path: display(path),
            source,
        })
    }

    fn follow(&mut self, reference: &ConfigPath, path: &ConfigPath) -> Result<Resolved, InstantiateError> {
        // A node referring to itself or one of its ancestors can never finish.
        if path.starts_with(reference) {
            return Err(InstantiateError::CycleDetected {
                chain: vec![display(path), display(reference)],
            });
        }
        if self.following.contains(reference) {
            let mut chain: Vec<String> = self.following.iter().map(display).collect();
            chain.push(display(reference));
            return Err(InstantiateError::CycleDetected { chain });
        }

        let node = self
            .root
            .lookup(reference)
            .map_err(|source| InstantiateError::BrokenReference {
                path: display(path),
                reference: reference.to_string(),
                source,
            })?;

        match node {
            SpecRef::Value(value) => Ok(Resolved::Value(value.clone())),
            SpecRef::Spec(spec) => {
                self.following.push(reference.clone());
                let result = self.build(spec, reference);
                self.following.pop();
                result
            }
        }
    }
}

fn display(path: &ConfigPath) -> String {
    if path.is_root() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scomp_spec::SpecMap;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug)]
    struct Grid {
        width: i64,
    }

    #[derive(Debug)]
    struct Scene {
        widgets: Vec<Arc<Grid>>,
    }

    fn factories(counter: Arc<AtomicUsize>) -> FactoryRegistry {
        let mut factories = FactoryRegistry::new();
        factories.register("Grid", move |kw: Kwargs| -> Result<Grid, KwargError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Grid {
                width: kw.i64("width")?,
            })
        });
        factories.register("Scene", |kw: Kwargs| -> Result<Scene, KwargError> {
            let mut widgets = Vec::new();
            for (_, value) in kw {
                if let Some(grid) = value.object::<Grid>() {
                    widgets.push(grid);
                }
            }
            Ok(Scene { widgets })
        });
        factories
    }

    fn grid(width: i64) -> TargetSpec {
        TargetSpec::new("Grid").with_param("width", Spec::literal(width))
    }

    #[test]
    fn test_literal_and_instance_pass_through() {
        let factories = FactoryRegistry::new();
        let instantiator = Instantiator::new(&factories);
        let resolved = instantiator.instantiate(&Spec::literal(json!([1, 2]))).unwrap();
        assert_eq!(resolved, Resolved::Value(json!([1, 2])));

        let built = Instance::new(Grid { width: 4 });
        let resolved = instantiator
            .instantiate(&Spec::Instance(built.clone()))
            .unwrap();
        assert!(resolved.as_instance().unwrap().ptr_eq(&built));
    }

    #[test]
    fn test_shared_node_built_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let factories = factories(Arc::clone(&counter));
        let shared = Arc::new(grid(3));
        let scene = TargetSpec::new("Scene")
            .with_param("left", Spec::shared(&shared))
            .with_param("right", Spec::shared(&shared));

        let resolved = Instantiator::new(&factories)
            .instantiate(&Spec::from(scene))
            .unwrap();
        let scene = resolved.object::<Scene>().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&scene.widgets[0], &scene.widgets[1]));
    }

    #[test]
    fn test_equal_but_distinct_nodes_built_twice() {
        let counter = Arc::new(AtomicUsize::new(0));
        let factories = factories(Arc::clone(&counter));
        let scene = TargetSpec::new("Scene")
            .with_param("left", Spec::from(grid(3)))
            .with_param("right", Spec::from(grid(3)));

        let resolved = Instantiator::new(&factories)
            .instantiate(&Spec::from(scene))
            .unwrap();
        let scene = resolved.object::<Scene>().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(!Arc::ptr_eq(&scene.widgets[0], &scene.widgets[1]));
    }

    #[test]
    fn test_params_built_in_declaration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut factories = FactoryRegistry::new();
        let log = Arc::clone(&seen);
        factories.register("Tag", move |kw: Kwargs| -> Result<String, KwargError> {
            let name = kw.str("name")?.to_string();
            log.lock().unwrap().push(name.clone());
            Ok(name)
        });
        factories.register("Pair", |_kw: Kwargs| -> Result<(), KwargError> { Ok(()) });

        let tag = |name: &str| Spec::from(TargetSpec::new("Tag").with_param("name", Spec::literal(name)));
        let pair = TargetSpec::new("Pair")
            .with_param("zeta", tag("zeta"))
            .with_param("alpha", tag("alpha"))
            .with_param("mid", tag("mid"));
        Instantiator::new(&factories)
            .instantiate(&Spec::from(pair))
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_unknown_target() {
        let factories = FactoryRegistry::new();
        let tree = Spec::Map(SpecMap::new().with("scene", Spec::from(TargetSpec::new("Ghost"))));
        let err = Instantiator::new(&factories).instantiate(&tree).unwrap_err();
        match err {
            InstantiateError::UnknownTarget { target, path } => {
                assert_eq!(target, "Ghost");
                assert_eq!(path, "scene");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_construction_error_wraps_cause() {
        let counter = Arc::new(AtomicUsize::new(0));
        let factories = factories(counter);
        let bad = TargetSpec::new("Grid").with_param("width", Spec::literal("wide"));
        let err = Instantiator::new(&factories)
            .instantiate(&Spec::from(bad))
            .unwrap_err();
        let InstantiateError::Construction { target, source, .. } = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(target, "Grid");
        let cause = source.downcast_ref::<KwargError>().unwrap();
        assert!(matches!(cause, KwargError::WrongType { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_reference_resolves_against_root() {
        let factories = FactoryRegistry::new();
        let tree = Spec::from_value(json!({
            "timing": {"fps": 30},
            "video": {"fps": "${timing.fps}"}
        }))
        .unwrap();
        let resolved = Instantiator::new(&factories).instantiate(&tree).unwrap();
        assert_eq!(resolved.to_value()["video"]["fps"], json!(30));
    }

    #[test]
    fn test_reference_shares_target() {
        let counter = Arc::new(AtomicUsize::new(0));
        let factories = factories(Arc::clone(&counter));
        let tree = Spec::from_value(json!({
            "grid": {"_target_": "Grid", "width": 5},
            "scene": {"_target_": "Scene", "main": "${grid}"}
        }))
        .unwrap();
        let resolved = Instantiator::new(&factories).instantiate(&tree).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let grid = resolved.get("grid").unwrap().object::<Grid>().unwrap();
        let scene = resolved.get("scene").unwrap().object::<Scene>().unwrap();
        assert!(Arc::ptr_eq(&grid, &scene.widgets[0]));
    }

    #[test]
    fn test_reference_cycle_detected() {
        let factories = FactoryRegistry::new();
        let tree = Spec::from_value(json!({"a": "${b}", "b": "${a}"})).unwrap();
        let err = Instantiator::new(&factories).instantiate(&tree).unwrap_err();
        let InstantiateError::CycleDetected { chain } = err else {
            panic!("expected a cycle");
        };
        assert_eq!(chain.first().map(String::as_str), Some("b"));
        assert_eq!(chain.last().map(String::as_str), Some("b"));
    }

    #[test]
    fn test_reference_to_ancestor_detected() {
        let factories = FactoryRegistry::new();
        let tree = Spec::from_value(json!({"scene": {"inner": {"loop": "${scene}"}}})).unwrap();
        let err = Instantiator::new(&factories).instantiate(&tree).unwrap_err();
        assert!(matches!(err, InstantiateError::CycleDetected { .. }));
    }

    #[test]
    fn test_broken_reference() {
        let factories = FactoryRegistry::new();
        let tree = Spec::from_value(json!({"fps": "${timing.fps}"})).unwrap();
        let err = Instantiator::new(&factories).instantiate(&tree).unwrap_err();
        assert!(matches!(
            err,
            InstantiateError::BrokenReference { ref reference, .. } if reference == "timing.fps"
        ));
    }

    #[test]
    fn test_instantiate_at_subtree() {
        let counter = Arc::new(AtomicUsize::new(0));
        let factories = factories(Arc::clone(&counter));
        let tree = Spec::from_value(json!({
            "scene": {"widgets": {"grid": {"_target_": "Grid", "width": "${size}"}}},
            "size": 12
        }))
        .unwrap();
        let resolved = Instantiator::new(&factories)
            .instantiate_at(&tree, &ConfigPath::parse("scene.widgets.grid").unwrap())
            .unwrap();
        assert_eq!(resolved.object::<Grid>().unwrap().width, 12);

        let err = Instantiator::new(&factories)
            .instantiate_at(&tree, &ConfigPath::parse("scene.ghost").unwrap())
            .unwrap_err();
        assert!(matches!(err, InstantiateError::Path(SpecError::PathNotFound { .. })));
    }
}
