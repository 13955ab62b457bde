//! Applying parsed overrides to a composed tree.
//!
//! Command-line overrides fall into three buckets: group selections
//! (`scene=advanced`, path equals a registered group mount), field edits
//! (`scene.widgets.grid.width=15`, `+path=v`, `~path`), and sweep axes (any
//! override carrying several comma-separated values).

use scomp_override::{Override, OverrideKind, OverrideValue};
use scomp_spec::{Spec, SpecError};
use serde_json::Value;
use tracing::debug;

use crate::registry::{DefaultsList, Registry};
use crate::sweep::{AxisTarget, Combination, SweepAxis};

/// Errors applying an override.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApplyError {
    #[error("override '{raw}' failed: {source}")]
    Path {
        raw: String,
        #[source]
        source: SpecError,
    },

    #[error("override '{raw}' has several values; expand it as a sweep first")]
    SweepNotExpanded { raw: String },

    #[error("group '{group}' must be selected by variant name, got {value}")]
    InvalidSelection { group: String, value: String },

    #[error("group '{group}' selection cannot use '{prefix}'")]
    SelectionKind { group: String, prefix: char },
}

impl ApplyError {
    /// Underlying path error, if this failure came from walking the tree.
    pub fn spec_error(&self) -> Option<&SpecError> {
        match self {
            ApplyError::Path { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Apply one single-valued override in place.
pub fn apply(tree: &mut Spec, ov: &Override) -> Result<(), ApplyError> {
    let raw = || ov.to_string();
    let path_err = |source: SpecError| ApplyError::Path { raw: raw(), source };

    match (&ov.kind, &ov.value) {
        (_, OverrideValue::Sweep(_)) => Err(ApplyError::SweepNotExpanded { raw: raw() }),
        (OverrideKind::Delete, _) => {
            tree.remove(&ov.path).map_err(path_err)?;
            debug!(path = %ov.path, "removed field");
            Ok(())
        }
        (OverrideKind::Change, OverrideValue::Single(value)) => {
            let spec = Spec::from_value(value.clone()).map_err(path_err)?;
            tree.set(&ov.path, spec).map_err(path_err)?;
            debug!(path = %ov.path, value = %value, "set field");
            Ok(())
        }
        (OverrideKind::Add, OverrideValue::Single(value)) => {
            let spec = Spec::from_value(value.clone()).map_err(path_err)?;
            tree.insert(&ov.path, spec).map_err(path_err)?;
            debug!(path = %ov.path, value = %value, "added field");
            Ok(())
        }
        (_, OverrideValue::Absent) => Err(ApplyError::Path {
            raw: raw(),
            source: SpecError::InvalidPath {
                path: ov.path.to_string(),
                reason: "override carries no value".to_string(),
            },
        }),
    }
}

/// Apply several overrides left to right.
pub fn apply_all<'a>(
    tree: &mut Spec,
    overrides: impl IntoIterator<Item = &'a Override>,
) -> Result<(), ApplyError> {
    overrides.into_iter().try_for_each(|ov| apply(tree, ov))
}

/// A group selection made on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub group: String,
    pub variant: String,
}

/// Overrides sorted into group selections, field edits and sweep axes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverridePlan {
    pub selections: Vec<Selection>,
    pub fields: Vec<Override>,
    pub axes: Vec<SweepAxis>,
}

impl OverridePlan {
    /// Sort `overrides` using `registry` to recognize group selections.
    pub fn build(overrides: &[Override], registry: &Registry) -> Result<Self, ApplyError> {
        let mut plan = OverridePlan::default();

        for ov in overrides {
            if let Some(group) = registry.group_at(&ov.path) {
                if ov.kind != OverrideKind::Change {
                    return Err(ApplyError::SelectionKind {
                        group: group.to_string(),
                        prefix: if ov.kind == OverrideKind::Add { '+' } else { '~' },
                    });
                }
                let variants = ov
                    .choices()
                    .iter()
                    .map(|v| variant_name(group, v))
                    .collect::<Result<Vec<_>, _>>()?;
                if ov.is_sweep() {
                    plan.axes.push(SweepAxis::group(group, variants.into_iter().map(Value::String).collect()));
                } else if let Some(variant) = variants.into_iter().next() {
                    plan.selections.push(Selection {
                        group: group.to_string(),
                        variant,
                    });
                }
                continue;
            }

            match &ov.value {
                OverrideValue::Sweep(values) => {
                    plan.axes.push(SweepAxis::field(ov.kind, ov.path.clone(), values.clone()))
                }
                _ => plan.fields.push(ov.clone()),
            }
        }

        Ok(plan)
    }

    pub fn is_sweep(&self) -> bool {
        !self.axes.is_empty()
    }

    /// The single-run plan for one combination of this plan's axes: group
    /// choices join the selections, field choices follow the fixed edits.
    pub fn for_combination(&self, combination: &Combination) -> OverridePlan {
        let mut plan = OverridePlan {
            selections: self.selections.clone(),
            fields: self.fields.clone(),
            axes: Vec::new(),
        };

        for choice in &combination.choices {
            let Some(axis) = self.axes.get(choice.axis) else {
                continue;
            };
            match &axis.target {
                AxisTarget::Group(group) => plan.selections.push(Selection {
                    group: group.clone(),
                    variant: choice.value.as_str().map(str::to_string).unwrap_or_else(|| choice.value.to_string()),
                }),
                AxisTarget::Field { kind, path } => plan.fields.push(Override {
                    kind: *kind,
                    path: path.clone(),
                    value: OverrideValue::Single(choice.value.clone()),
                }),
            }
        }

        plan
    }

    /// Apply the selections of this plan to a defaults list.
    pub fn select_into(&self, defaults: &mut DefaultsList) {
        for selection in &self.selections {
            defaults.select(&selection.group, &selection.variant);
        }
    }

    /// Canonical text of every single-run override, selections first.
    pub fn describe(&self) -> Vec<String> {
        self.selections
            .iter()
            .map(|s| format!("{}={}", s.group.replace('/', "."), s.variant))
            .chain(self.fields.iter().map(Override::to_string))
            .collect()
    }
}

fn variant_name(group: &str, value: &Value) -> Result<String, ApplyError> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        // Bare numeric names such as `quality=720` parse as numbers.
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ApplyError::InvalidSelection {
            group: group.to_string(),
            value: other.to_string(),
        }),
    }
}
