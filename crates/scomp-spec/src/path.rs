//! Dotted config paths (`scene.widgets.grid.width`, `layers.0.opacity`).

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SpecError;

/// Identifier or non-negative index.
const SEGMENT_PATTERN: &str = r"^(?:[A-Za-z_][A-Za-z0-9_-]*|[0-9]+)$";

fn segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SEGMENT_PATTERN).expect("segment pattern is valid"))
}

/// A path into a spec tree. The empty path addresses the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigPath {
    segments: Vec<String>,
}

impl ConfigPath {
    /// The root path (no segments).
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dot-separated path. Every segment must be an identifier
    /// (`[A-Za-z_][A-Za-z0-9_-]*`) or a decimal index.
    pub fn parse(raw: &str) -> Result<Self, SpecError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SpecError::InvalidPath {
                path: raw.to_string(),
                reason: "path is empty".to_string(),
            });
        }

        let mut segments = Vec::new();
        for segment in trimmed.split('.') {
            if segment.is_empty() {
                return Err(SpecError::InvalidPath {
                    path: raw.to_string(),
                    reason: "empty segment".to_string(),
                });
            }
            if !segment_regex().is_match(segment) {
                return Err(SpecError::InvalidPath {
                    path: raw.to_string(),
                    reason: format!("invalid segment '{}'", segment),
                });
            }
            segments.push(segment.to_string());
        }

        Ok(Self { segments })
    }

    /// Mount path for a config group. Nested groups use `/`
    /// (`scene/widgets` mounts at `scene.widgets`).
    pub fn for_group(group: &str) -> Result<Self, SpecError> {
        Self::parse(&group.replace('/', "."))
    }

    /// Build a path from already-validated segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment, if any.
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Path without its last segment. The root has no parent.
    pub fn parent(&self) -> Option<ConfigPath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append one segment.
    pub fn child(&self, segment: impl Into<String>) -> ConfigPath {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// True if `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &ConfigPath) -> bool {
        self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    /// Render the first `depth` segments, used to report where a walk stopped.
    pub fn prefix_string(&self, depth: usize) -> String {
        self.segments[..depth.min(self.segments.len())].join(".")
    }

    /// Interpret a segment as a list index.
    pub fn as_index(segment: &str) -> Option<usize> {
        if segment.bytes().all(|b| b.is_ascii_digit()) {
            segment.parse().ok()
        } else {
            None
        }
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl FromStr for ConfigPath {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ConfigPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ConfigPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ConfigPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotted() {
        let path = ConfigPath::parse("scene.widgets.grid.width").unwrap();
        assert_eq!(path.len(), 4);
        assert_eq!(path.leaf(), Some("width"));
        assert_eq!(path.to_string(), "scene.widgets.grid.width");
    }

    #[test]
    fn test_parse_index_segment() {
        let path = ConfigPath::parse("layers.0.opacity").unwrap();
        assert_eq!(ConfigPath::as_index(&path.segments()[1]), Some(0));
        assert_eq!(ConfigPath::as_index("grid"), None);
    }

    #[test]
    fn test_reject_empty_segment() {
        assert!(matches!(
            ConfigPath::parse("scene..grid"),
            Err(SpecError::InvalidPath { .. })
        ));
        assert!(ConfigPath::parse("").is_err());
        assert!(ConfigPath::parse("scene.").is_err());
    }

    #[test]
    fn test_reject_bad_characters() {
        assert!(ConfigPath::parse("scene.grid width").is_err());
        assert!(ConfigPath::parse("scene.$grid").is_err());
    }

    #[test]
    fn test_group_mount() {
        let path = ConfigPath::for_group("scene/widgets").unwrap();
        assert_eq!(path.to_string(), "scene.widgets");
    }

    #[test]
    fn test_parent_and_child() {
        let path = ConfigPath::parse("a.b.c").unwrap();
        assert_eq!(path.parent().unwrap().to_string(), "a.b");
        assert_eq!(path.parent().unwrap().child("d").to_string(), "a.b.d");
        assert!(ConfigPath::root().parent().is_none());
    }

    #[test]
    fn test_starts_with() {
        let path = ConfigPath::parse("timing.fps").unwrap();
        assert!(path.starts_with(&ConfigPath::parse("timing").unwrap()));
        assert!(path.starts_with(&ConfigPath::root()));
        assert!(!path.starts_with(&ConfigPath::parse("theme").unwrap()));
    }
}
