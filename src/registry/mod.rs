//! Config registry
//!
//! Holds named variants per group and composes a defaults list into one
//! merged spec tree. A selection mounts its variant at the group name;
//! nested groups (`scene/widgets`) mount at the matching dotted path.

mod defaults;

pub use defaults::{DefaultsEntry, DefaultsList, SELF_MARKER};

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use scomp_spec::{deep_merge, ConfigPath, Spec, SpecError, SpecMap};
use tracing::debug;

/// Registry errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("variant '{variant}' is already registered in group '{group}'")]
    DuplicateVariant { group: String, variant: String },

    #[error("unknown variant '{variant}' for group '{group}'")]
    UnknownVariant { group: String, variant: String },

    #[error("invalid group name '{group}': {source}")]
    InvalidGroup {
        group: String,
        #[source]
        source: SpecError,
    },

    #[error("invalid defaults entry {entry}: {reason}")]
    InvalidDefaults { entry: String, reason: String },

    #[error("registry lock poisoned")]
    Poisoned,
}

/// Variants per group.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    groups: BTreeMap<String, Group>,
}

#[derive(Debug, Clone)]
struct Group {
    mount: ConfigPath,
    variants: BTreeMap<String, Spec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variant. Fails if `(group, variant)` already exists.
    pub fn register(
        &mut self,
        group: &str,
        variant: &str,
        spec: Spec,
    ) -> Result<(), RegistryError> {
        if !self.groups.contains_key(group) {
            let mount = ConfigPath::for_group(group).map_err(|source| RegistryError::InvalidGroup {
                group: group.to_string(),
                source,
            })?;
            self.groups.insert(
                group.to_string(),
                Group {
                    mount,
                    variants: BTreeMap::new(),
                },
            );
        }

        let entry = self
            .groups
            .get_mut(group)
            .ok_or_else(|| unknown(group, variant))?;
        if entry.variants.contains_key(variant) {
            return Err(RegistryError::DuplicateVariant {
                group: group.to_string(),
                variant: variant.to_string(),
            });
        }

        debug!(group, variant, "registered variant");
        entry.variants.insert(variant.to_string(), spec);
        Ok(())
    }

    /// Registered spec for `(group, variant)`.
    pub fn get(&self, group: &str, variant: &str) -> Result<&Spec, RegistryError> {
        self.groups
            .get(group)
            .and_then(|g| g.variants.get(variant))
            .ok_or_else(|| unknown(group, variant))
    }

    pub fn contains(&self, group: &str, variant: &str) -> bool {
        self.get(group, variant).is_ok()
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Group names in sorted order.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Variant names of `group` in sorted order.
    pub fn variants(&self, group: &str) -> Option<Vec<&str>> {
        self.groups
            .get(group)
            .map(|g| g.variants.keys().map(String::as_str).collect())
    }

    /// Group mounted exactly at `path`, if any.
    pub fn group_at(&self, path: &ConfigPath) -> Option<&str> {
        self.groups
            .iter()
            .find(|(_, g)| &g.mount == path)
            .map(|(name, _)| name.as_str())
    }

    /// Compose a defaults list into one tree by left-to-right deep merge.
    pub fn resolve(&self, defaults: &DefaultsList) -> Result<Spec, RegistryError> {
        let mut tree = Spec::default();

        for entry in defaults.merge_order() {
            let layer = match &entry {
                DefaultsEntry::Select { group, variant } => {
                    self.mounted(group, variant)?
                }
                DefaultsEntry::Optional { group, variant } => {
                    if !self.contains(group, variant) {
                        debug!(group = %group, variant = %variant, "optional selection absent, skipping");
                        continue;
                    }
                    self.mounted(group, variant)?
                }
                DefaultsEntry::SelfMarker => defaults.inline().clone(),
            };
            tree = deep_merge(tree, layer);
        }

        Ok(tree)
    }

    fn mounted(&self, group: &str, variant: &str) -> Result<Spec, RegistryError> {
        let g = self.groups.get(group).ok_or_else(|| unknown(group, variant))?;
        let spec = g.variants.get(variant).ok_or_else(|| unknown(group, variant))?;
        debug!(group, variant, mount = %g.mount, "merging selection");
        Ok(mount_at(&g.mount, spec.clone()))
    }
}

fn unknown(group: &str, variant: &str) -> RegistryError {
    RegistryError::UnknownVariant {
        group: group.to_string(),
        variant: variant.to_string(),
    }
}

/// Wrap `spec` in nested mappings so it sits at `path`.
fn mount_at(path: &ConfigPath, spec: Spec) -> Spec {
    path.segments()
        .iter()
        .rev()
        .fold(spec, |inner, segment| Spec::Map(SpecMap::new().with(segment.clone(), inner)))
}

/// Registry shared between a registering writer and resolving readers.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<RwLock<Registry>>,
}

impl SharedRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(registry)),
        }
    }

    pub fn register(&self, group: &str, variant: &str, spec: Spec) -> Result<(), RegistryError> {
        self.write()?.register(group, variant, spec)
    }

    pub fn resolve(&self, defaults: &DefaultsList) -> Result<Spec, RegistryError> {
        self.read()?.resolve(defaults)
    }

    /// Shared read access, e.g. to run a composition against a stable view.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, Registry>, RegistryError> {
        self.inner.read().map_err(|_| RegistryError::Poisoned)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, Registry>, RegistryError> {
        self.inner.write().map_err(|_| RegistryError::Poisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scomp_spec::TargetSpec;
    use serde_json::json;

    fn path(p: &str) -> ConfigPath {
        ConfigPath::parse(p).unwrap()
    }

    fn grid(width: i64) -> Spec {
        TargetSpec::new("Grid")
            .with_param("width", Spec::literal(width))
            .with_param("color", Spec::literal("gray"))
            .into()
    }

    #[test]
    fn test_duplicate_variant() {
        let mut registry = Registry::new();
        registry.register("grid", "small", grid(5)).unwrap();
        let err = registry.register("grid", "small", grid(6)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateVariant {
                group: "grid".to_string(),
                variant: "small".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_variant() {
        let mut registry = Registry::new();
        registry.register("grid", "small", grid(5)).unwrap();
        let defaults = DefaultsList::new(vec![DefaultsEntry::select("grid", "huge")]);
        assert!(matches!(
            registry.resolve(&defaults),
            Err(RegistryError::UnknownVariant { .. })
        ));
        let defaults = DefaultsList::new(vec![DefaultsEntry::select("axes", "small")]);
        assert!(matches!(
            registry.resolve(&defaults),
            Err(RegistryError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn test_invalid_group_name() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.register("bad group", "x", grid(1)),
            Err(RegistryError::InvalidGroup { .. })
        ));
    }

    #[test]
    fn test_single_selection_mounts_identity() {
        let mut registry = Registry::new();
        registry.register("grid", "small", grid(5)).unwrap();
        let tree = registry
            .resolve(&DefaultsList::new(vec![DefaultsEntry::select("grid", "small")]))
            .unwrap();
        let mounted = tree.lookup(&path("grid")).unwrap().to_spec();
        assert_eq!(&mounted, registry.get("grid", "small").unwrap());
    }

    #[test]
    fn test_later_selection_wins() {
        let mut registry = Registry::new();
        registry.register("grid", "small", grid(5)).unwrap();
        registry.register("grid", "large", grid(50)).unwrap();
        let tree = registry
            .resolve(&DefaultsList::new(vec![
                DefaultsEntry::select("grid", "small"),
                DefaultsEntry::select("grid", "large"),
            ]))
            .unwrap();
        assert_eq!(
            tree.lookup(&path("grid.width")).unwrap().as_value(),
            Some(&json!(50))
        );
    }

    #[test]
    fn test_nested_group_mount() {
        let mut registry = Registry::new();
        registry
            .register("scene/widgets", "grid_only", Spec::from_value(json!({"grid": {"_target_": "Grid"}})).unwrap())
            .unwrap();
        let tree = registry
            .resolve(&DefaultsList::new(vec![DefaultsEntry::select("scene/widgets", "grid_only")]))
            .unwrap();
        assert!(tree.contains(&path("scene.widgets.grid")));
        assert_eq!(registry.group_at(&path("scene.widgets")), Some("scene/widgets"));
    }

    #[test]
    fn test_self_position() {
        let mut registry = Registry::new();
        registry
            .register("timing", "fast", Spec::from_value(json!({"fps": 60})).unwrap())
            .unwrap();
        let inline = Spec::from_value(json!({"timing": {"fps": 24}})).unwrap();

        let self_first = DefaultsList::new(vec![
            DefaultsEntry::SelfMarker,
            DefaultsEntry::select("timing", "fast"),
        ])
        .with_inline(inline.clone());
        let tree = registry.resolve(&self_first).unwrap();
        assert_eq!(tree.lookup(&path("timing.fps")).unwrap().as_value(), Some(&json!(60)));

        let self_implicit_last =
            DefaultsList::new(vec![DefaultsEntry::select("timing", "fast")]).with_inline(inline);
        let tree = registry.resolve(&self_implicit_last).unwrap();
        assert_eq!(tree.lookup(&path("timing.fps")).unwrap().as_value(), Some(&json!(24)));
    }

    #[test]
    fn test_optional_selection_skipped() {
        let registry = Registry::new();
        let defaults = DefaultsList::new(vec![DefaultsEntry::Optional {
            group: "theme".to_string(),
            variant: "dark".to_string(),
        }]);
        assert_eq!(registry.resolve(&defaults).unwrap(), Spec::default());
    }

    #[test]
    fn test_listing() {
        let mut registry = Registry::new();
        registry.register("theme", "light", Spec::default()).unwrap();
        registry.register("theme", "dark", Spec::default()).unwrap();
        registry.register("grid", "small", grid(5)).unwrap();
        assert_eq!(registry.groups().collect::<Vec<_>>(), vec!["grid", "theme"]);
        assert_eq!(registry.variants("theme"), Some(vec!["dark", "light"]));
        assert_eq!(registry.variants("ghost"), None);
    }

    #[test]
    fn test_shared_registry_across_threads() {
        let shared = SharedRegistry::default();
        std::thread::scope(|s| {
            for i in 0..4 {
                let shared = shared.clone();
                s.spawn(move || {
                    shared
                        .register("grid", &format!("v{}", i), grid(i))
                        .unwrap();
                });
            }
        });
        assert_eq!(shared.read().unwrap().variants("grid").unwrap().len(), 4);
        let tree = shared
            .resolve(&DefaultsList::new(vec![DefaultsEntry::select("grid", "v2")]))
            .unwrap();
        assert_eq!(tree.lookup(&path("grid.width")).unwrap().as_value(), Some(&json!(2)));
    }
}
