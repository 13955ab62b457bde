//! Composition: defaults list plus overrides into one resolved tree.

use scomp_override::Override;
use scomp_spec::{ConfigPath, Spec, SpecError, SpecRef};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ComposeError;
use crate::overrides::{apply_all, ApplyError, OverridePlan};
use crate::registry::{DefaultsList, Registry};

/// The merged tree of one run, with what produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub tree: Spec,
    /// Defaults list after command-line selections
    pub defaults: DefaultsList,
    /// Canonical text of the applied overrides
    pub overrides: Vec<String>,
}

impl ResolvedConfig {
    pub fn to_value(&self) -> Value {
        self.tree.to_value()
    }

    pub fn lookup(&self, path: &ConfigPath) -> Result<SpecRef<'_>, SpecError> {
        self.tree.lookup(path)
    }

    /// Record written next to a run's output.
    pub fn overrides_record(&self) -> OverridesRecord<'_> {
        OverridesRecord {
            overrides: &self.overrides,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OverridesRecord<'a> {
    pub overrides: &'a [String],
}

/// Composes configurations from a registry.
#[derive(Debug, Clone, Copy)]
pub struct Composer<'r> {
    registry: &'r Registry,
}

impl<'r> Composer<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Compose a single run. Multi-valued overrides are rejected; use a
    /// sweep for those.
    pub fn compose(
        &self,
        defaults: &DefaultsList,
        overrides: &[Override],
    ) -> Result<ResolvedConfig, ComposeError> {
        let plan = OverridePlan::build(overrides, self.registry)?;
        self.compose_plan(defaults, &plan)
    }

    /// Compose from an already sorted plan: selections update the defaults
    /// list, the list resolves, then field edits apply in order.
    pub fn compose_plan(
        &self,
        defaults: &DefaultsList,
        plan: &OverridePlan,
    ) -> Result<ResolvedConfig, ComposeError> {
        if let Some(axis) = plan.axes.first() {
            return Err(ApplyError::SweepNotExpanded { raw: axis.label() }.into());
        }

        let mut defaults = defaults.clone();
        plan.select_into(&mut defaults);

        let mut tree = self.registry.resolve(&defaults)?;
        apply_all(&mut tree, &plan.fields)?;

        let overrides = plan.describe();
        debug!(selections = plan.selections.len(), fields = plan.fields.len(), "composed config");
        Ok(ResolvedConfig {
            tree,
            defaults,
            overrides,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DefaultsEntry;
    use scomp_override::{parse_all, parse_override};
    use serde_json::json;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                "scene",
                "basic",
                Spec::from_value(json!({
                    "_target_": "Scene",
                    "widgets": {"grid": {"_target_": "Grid", "width": 10}}
                }))
                .unwrap(),
            )
            .unwrap();
        registry
            .register(
                "scene",
                "advanced",
                Spec::from_value(json!({
                    "_target_": "Scene",
                    "widgets": {"grid": {"_target_": "Grid", "width": 40}, "axes": {"_target_": "Axes"}}
                }))
                .unwrap(),
            )
            .unwrap();
        registry
    }

    fn defaults() -> DefaultsList {
        DefaultsList::new(vec![DefaultsEntry::select("scene", "basic")])
    }

    fn width(config: &ResolvedConfig) -> Value {
        config
            .lookup(&ConfigPath::parse("scene.widgets.grid.width").unwrap())
            .unwrap()
            .as_value()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_compose_with_field_override() {
        let registry = registry();
        let overrides = parse_all(&["scene.widgets.grid.width=15"]).unwrap();
        let config = Composer::new(&registry).compose(&defaults(), &overrides).unwrap();
        assert_eq!(width(&config), json!(15));
        assert_eq!(config.overrides, vec!["scene.widgets.grid.width=15"]);
    }

    #[test]
    fn test_selection_applies_before_fields() {
        let registry = registry();
        let overrides = parse_all(&["+scene.widgets.axes.ticks=4", "scene=advanced"]).unwrap();
        let config = Composer::new(&registry).compose(&defaults(), &overrides).unwrap();
        assert_eq!(width(&config), json!(40));
        assert_eq!(config.defaults.selection("scene"), Some("advanced"));
        assert_eq!(
            config.overrides,
            vec!["scene=advanced", "+scene.widgets.axes.ticks=4"]
        );
    }

    #[test]
    fn test_unknown_selection_fails() {
        let registry = registry();
        let overrides = vec![parse_override("scene=ghost").unwrap()];
        let err = Composer::new(&registry).compose(&defaults(), &overrides).unwrap_err();
        assert!(matches!(err, ComposeError::Registry(_)));
    }

    #[test]
    fn test_sweep_rejected_in_single_compose() {
        let registry = registry();
        let overrides = vec![parse_override("scene.widgets.grid.width=1,2").unwrap()];
        let err = Composer::new(&registry).compose(&defaults(), &overrides).unwrap_err();
        assert!(matches!(err, ComposeError::Apply(ApplyError::SweepNotExpanded { .. })));
    }

    #[test]
    fn test_base_defaults_untouched() {
        let registry = registry();
        let base = defaults();
        let overrides = vec![parse_override("scene=advanced").unwrap()];
        Composer::new(&registry).compose(&base, &overrides).unwrap();
        assert_eq!(base.selection("scene"), Some("basic"));
    }
}
