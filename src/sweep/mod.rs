//! Sweep expansion and execution
//!
//! A sweep is the cross product of its axes, enumerated in odometer order
//! (the last axis varies fastest). Combinations are decoded from their
//! index on demand, so workers never need the full product in memory.

mod executor;
mod report;
mod state;

pub use executor::{SweepExecutor, SweepOptions, MAX_PARALLEL_LIMIT};
pub use report::{CombinationFailure, CombinationResult, SweepReport, SweepStatus, SWEEP_SUMMARY_FILE};
pub use state::{CombinationState, CombinationStateError};

use scomp_override::OverrideKind;
use scomp_spec::ConfigPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Longest output id kept verbatim.
pub const MAX_OUTPUT_ID_LEN: usize = 96;

/// Hex characters of the digest suffix on shortened ids.
const DIGEST_SUFFIX_LEN: usize = 16;

/// What a sweep axis varies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisTarget {
    /// Selection of a config group's variant.
    Group(String),
    /// A field edit at `path`.
    Field { kind: OverrideKind, path: ConfigPath },
}

/// An axis: a target plus its candidate values in declaration order.
/// Duplicate values are kept and produce distinct runs.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepAxis {
    pub target: AxisTarget,
    pub values: Vec<Value>,
}

impl SweepAxis {
    pub fn group(group: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            target: AxisTarget::Group(group.into()),
            values,
        }
    }

    pub fn field(kind: OverrideKind, path: ConfigPath, values: Vec<Value>) -> Self {
        Self {
            target: AxisTarget::Field { kind, path },
            values,
        }
    }

    /// Name used in output ids and reports.
    pub fn label(&self) -> String {
        match &self.target {
            AxisTarget::Group(group) => group.replace('/', "."),
            AxisTarget::Field { path, .. } => path.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The value picked for one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Position of the axis in the sweep.
    pub axis: usize,
    pub label: String,
    pub value: Value,
}

/// One point of the cross product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Combination {
    pub index: usize,
    pub choices: Vec<Choice>,
}

impl Combination {
    /// Deterministic id used for the combination's output directory:
    /// `{index}_{label=value,...}`.
    pub fn output_id(&self) -> String {
        let assignments: Vec<String> = self
            .choices
            .iter()
            .map(|c| format!("{}={}", c.label, render_value(&c.value)))
            .collect();

        let raw = if assignments.is_empty() {
            self.index.to_string()
        } else {
            format!("{}_{}", self.index, assignments.join(","))
        };
        let id = sanitize(&raw);

        if id.len() <= MAX_OUTPUT_ID_LEN {
            return id;
        }

        // All characters are ASCII after sanitizing, so byte slicing is safe.
        let keep = MAX_OUTPUT_ID_LEN - DIGEST_SUFFIX_LEN - 1;
        format!("{}_{}", &id[..keep], &self.choices_digest()[..DIGEST_SUFFIX_LEN])
    }

    /// SHA-256 of the canonical JSON of the chosen `(label, value)` pairs.
    pub fn choices_digest(&self) -> String {
        let pairs: Vec<(&str, &Value)> = self
            .choices
            .iter()
            .map(|c| (c.label.as_str(), &c.value))
            .collect();
        let bytes = serde_json_canonicalizer::to_vec(&pairs).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '=' | ',' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Number of combinations: the product of the axis lengths. No axes means
/// a single run; an empty axis means none.
pub fn cardinality(axes: &[SweepAxis]) -> usize {
    axes.iter()
        .map(SweepAxis::len)
        .try_fold(1usize, |acc, n| acc.checked_mul(n))
        .unwrap_or(usize::MAX)
}

/// Decode combination `index` by mixed-radix counting, last axis fastest.
pub fn combination_at(axes: &[SweepAxis], index: usize) -> Option<Combination> {
    if index >= cardinality(axes) {
        return None;
    }

    let mut rest = index;
    let mut choices = Vec::with_capacity(axes.len());
    for (axis_index, axis) in axes.iter().enumerate().rev() {
        let digit = rest % axis.len();
        rest /= axis.len();
        choices.push(Choice {
            axis: axis_index,
            label: axis.label(),
            value: axis.values[digit].clone(),
        });
    }
    choices.reverse();

    Some(Combination { index, choices })
}

/// All combinations in odometer order.
pub fn expand(axes: &[SweepAxis]) -> impl Iterator<Item = Combination> + '_ {
    (0..cardinality(axes)).filter_map(move |index| combination_at(axes, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(path: &str, values: Vec<Value>) -> SweepAxis {
        SweepAxis::field(OverrideKind::Change, ConfigPath::parse(path).unwrap(), values)
    }

    #[test]
    fn test_odometer_order() {
        let axes = vec![
            field("a", vec![json!("a1"), json!("a2")]),
            field("b", vec![json!("b1"), json!("b2"), json!("b3")]),
        ];
        assert_eq!(cardinality(&axes), 6);

        let picked: Vec<(Value, Value)> = expand(&axes)
            .map(|c| (c.choices[0].value.clone(), c.choices[1].value.clone()))
            .collect();
        assert_eq!(
            picked,
            vec![
                (json!("a1"), json!("b1")),
                (json!("a1"), json!("b2")),
                (json!("a1"), json!("b3")),
                (json!("a2"), json!("b1")),
                (json!("a2"), json!("b2")),
                (json!("a2"), json!("b3")),
            ]
        );
    }

    #[test]
    fn test_no_axes_is_one_run() {
        assert_eq!(cardinality(&[]), 1);
        let only = combination_at(&[], 0).unwrap();
        assert!(only.choices.is_empty());
        assert_eq!(only.output_id(), "0");
        assert!(combination_at(&[], 1).is_none());
    }

    #[test]
    fn test_empty_axis_means_no_runs() {
        let axes = vec![field("a", vec![json!(1)]), field("b", vec![])];
        assert_eq!(cardinality(&axes), 0);
        assert_eq!(expand(&axes).count(), 0);
    }

    #[test]
    fn test_duplicates_are_distinct_runs() {
        let axes = vec![field("a", vec![json!(1), json!(1)])];
        let ids: Vec<String> = expand(&axes).map(|c| c.output_id()).collect();
        assert_eq!(ids, vec!["0_a=1", "1_a=1"]);
    }

    #[test]
    fn test_output_id_sanitized() {
        let axes = vec![
            SweepAxis::group("scene/widgets", vec![json!("grid only")]),
            field("theme.accent", vec![json!("#ff0000")]),
        ];
        let combination = combination_at(&axes, 0).unwrap();
        assert_eq!(combination.output_id(), "0_scene.widgets=grid_only,theme.accent=_ff0000");
    }

    #[test]
    fn test_long_output_id_is_shortened() {
        let long = "x".repeat(200);
        let axes = vec![field("scene.title", vec![json!(long.clone()), json!(format!("{}y", long))])];
        let first = combination_at(&axes, 0).unwrap().output_id();
        let second = combination_at(&axes, 1).unwrap().output_id();
        assert_eq!(first.len(), MAX_OUTPUT_ID_LEN);
        assert!(first.starts_with("0_scene.title=xxx"));
        assert_ne!(first[2..], second[2..]);
        assert_eq!(first, combination_at(&axes, 0).unwrap().output_id());
    }
}
