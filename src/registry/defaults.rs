//! Defaults lists: the ordered selection of variants that seeds a composition.

use serde_json::Value;

use scomp_spec::Spec;

use super::RegistryError;

/// Literal marker for "merge the inline fields here".
pub const SELF_MARKER: &str = "_self_";

/// Key prefix marking a selection that may be absent.
const OPTIONAL_PREFIX: &str = "optional ";

/// One entry of a defaults list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultsEntry {
    /// `{group: variant}`
    Select { group: String, variant: String },
    /// `{"optional group": variant}`, skipped when the variant is not registered
    Optional { group: String, variant: String },
    /// `_self_`
    SelfMarker,
}

impl DefaultsEntry {
    pub fn select(group: impl Into<String>, variant: impl Into<String>) -> Self {
        DefaultsEntry::Select {
            group: group.into(),
            variant: variant.into(),
        }
    }

    /// Group named by this entry, if any.
    pub fn group(&self) -> Option<&str> {
        match self {
            DefaultsEntry::Select { group, .. } | DefaultsEntry::Optional { group, .. } => {
                Some(group)
            }
            DefaultsEntry::SelfMarker => None,
        }
    }

    /// Parse one JSON entry: `"_self_"` or a single-key object.
    pub fn from_value(value: &Value) -> Result<Self, RegistryError> {
        match value {
            Value::String(s) if s == SELF_MARKER => Ok(DefaultsEntry::SelfMarker),
            Value::Object(obj) if obj.len() == 1 => {
                let (key, variant) = obj.iter().next().ok_or_else(|| invalid(value, "empty entry"))?;
                let variant = variant
                    .as_str()
                    .ok_or_else(|| invalid(value, "variant name must be a string"))?
                    .to_string();
                match key.strip_prefix(OPTIONAL_PREFIX) {
                    Some(group) => Ok(DefaultsEntry::Optional {
                        group: group.trim().to_string(),
                        variant,
                    }),
                    None => Ok(DefaultsEntry::Select {
                        group: key.trim().to_string(),
                        variant,
                    }),
                }
            }
            _ => Err(invalid(
                value,
                "expected \"_self_\" or a single-key {group: variant} mapping",
            )),
        }
    }
}

fn invalid(value: &Value, reason: &str) -> RegistryError {
    RegistryError::InvalidDefaults {
        entry: value.to_string(),
        reason: reason.to_string(),
    }
}

/// An ordered defaults list plus the inline fields of the primary config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultsList {
    entries: Vec<DefaultsEntry>,
    inline: Spec,
}

impl DefaultsList {
    pub fn new(entries: Vec<DefaultsEntry>) -> Self {
        Self {
            entries,
            inline: Spec::default(),
        }
    }

    /// Parse the `defaults` array of a primary config.
    pub fn from_value(value: &Value) -> Result<Self, RegistryError> {
        let items = value.as_array().ok_or_else(|| RegistryError::InvalidDefaults {
            entry: value.to_string(),
            reason: "defaults must be a list".to_string(),
        })?;
        let entries = items
            .iter()
            .map(DefaultsEntry::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(entries))
    }

    pub fn with_inline(mut self, inline: Spec) -> Self {
        self.inline = inline;
        self
    }

    pub fn entries(&self) -> &[DefaultsEntry] {
        &self.entries
    }

    pub fn inline(&self) -> &Spec {
        &self.inline
    }

    pub fn has_self_marker(&self) -> bool {
        self.entries.contains(&DefaultsEntry::SelfMarker)
    }

    /// Variant currently selected for `group`.
    pub fn selection(&self, group: &str) -> Option<&str> {
        self.entries.iter().find_map(|entry| match entry {
            DefaultsEntry::Select { group: g, variant } | DefaultsEntry::Optional { group: g, variant }
                if g == group =>
            {
                Some(variant.as_str())
            }
            _ => None,
        })
    }

    /// Point `group` at `variant`. An existing entry is replaced in place
    /// (an optional entry becomes mandatory); otherwise the selection is
    /// appended.
    pub fn select(&mut self, group: &str, variant: &str) {
        let replacement = DefaultsEntry::select(group, variant);
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.group() == Some(group))
        {
            Some(slot) => *slot = replacement,
            None => self.entries.push(replacement),
        }
    }

    /// Entries in merge order. Without an explicit `_self_` the inline
    /// fields merge last.
    pub(crate) fn merge_order(&self) -> Vec<DefaultsEntry> {
        let mut order = self.entries.clone();
        if !self.has_self_marker() {
            order.push(DefaultsEntry::SelfMarker);
        }
        order
    }
}
