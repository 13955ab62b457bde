//! Override parsing.

use std::fmt;

use scomp_spec::ConfigPath;
use serde_json::Value;

use crate::error::ParseError;
use crate::lexer::{read_quoted, split_top_level};

/// What an override does to its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverrideKind {
    /// `path=value`: replace an existing node.
    Change,
    /// `+path=value`: add a node that must not exist yet.
    Add,
    /// `~path`: remove an existing node.
    Delete,
}

impl OverrideKind {
    fn prefix(self) -> &'static str {
        match self {
            OverrideKind::Change => "",
            OverrideKind::Add => "+",
            OverrideKind::Delete => "~",
        }
    }
}

/// Right-hand side of an override.
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideValue {
    Single(Value),
    /// Two or more comma-separated values, one per sweep run.
    Sweep(Vec<Value>),
    /// Deletes carry no value.
    Absent,
}

/// A parsed `path=value` assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub kind: OverrideKind,
    pub path: ConfigPath,
    pub value: OverrideValue,
}

impl Override {
    pub fn change(path: ConfigPath, value: impl Into<Value>) -> Self {
        Self {
            kind: OverrideKind::Change,
            path,
            value: OverrideValue::Single(value.into()),
        }
    }

    pub fn is_sweep(&self) -> bool {
        matches!(self.value, OverrideValue::Sweep(_))
    }

    /// Values this override expands to. A single assignment yields one
    /// value, a delete yields none.
    pub fn choices(&self) -> &[Value] {
        match &self.value {
            OverrideValue::Single(v) => std::slice::from_ref(v),
            OverrideValue::Sweep(vs) => vs,
            OverrideValue::Absent => &[],
        }
    }

    /// Same override narrowed to one of its sweep choices.
    pub fn with_value(&self, value: Value) -> Override {
        Override {
            kind: self.kind,
            path: self.path.clone(),
            value: OverrideValue::Single(value),
        }
    }
}

impl fmt::Display for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.path)?;
        match &self.value {
            OverrideValue::Absent => Ok(()),
            OverrideValue::Single(v) => write!(f, "={}", render_element(v)),
            OverrideValue::Sweep(vs) => {
                let parts: Vec<String> = vs.iter().map(render_element).collect();
                write!(f, "={}", parts.join(","))
            }
        }
    }
}

/// Parse one override.
pub fn parse_override(raw: &str) -> Result<Override, ParseError> {
    let trimmed = raw.trim();
    let (kind, rest) = match trimmed.as_bytes().first() {
        Some(b'+') => (OverrideKind::Add, &trimmed[1..]),
        Some(b'~') => (OverrideKind::Delete, &trimmed[1..]),
        _ => (OverrideKind::Change, trimmed),
    };

    let (path_text, value_text) = match rest.split_once('=') {
        Some((p, v)) => (p, Some(v)),
        None => (rest, None),
    };

    let path = ConfigPath::parse(path_text).map_err(|source| ParseError::InvalidPath {
        raw: raw.to_string(),
        source,
    })?;

    let value = match (kind, value_text) {
        (OverrideKind::Delete, None) => OverrideValue::Absent,
        (OverrideKind::Delete, Some(_)) => {
            return Err(ParseError::DeleteWithValue {
                raw: raw.to_string(),
            })
        }
        (_, None) => {
            return Err(ParseError::MissingEquals {
                raw: raw.to_string(),
            })
        }
        (_, Some(text)) => parse_values(raw, text)?,
    };

    Ok(Override { kind, path, value })
}

/// Parse a list of overrides, stopping at the first error.
pub fn parse_all<S: AsRef<str>>(raws: &[S]) -> Result<Vec<Override>, ParseError> {
    raws.iter().map(|r| parse_override(r.as_ref())).collect()
}

fn parse_values(raw: &str, text: &str) -> Result<OverrideValue, ParseError> {
    // `path=` assigns the empty string
    if text.trim().is_empty() {
        return Ok(OverrideValue::Single(Value::String(String::new())));
    }

    let parts = split_top_level(raw, text)?;
    let mut values = Vec::with_capacity(parts.len());
    for (position, part) in parts.iter().enumerate() {
        values.push(parse_element(raw, part, position)?);
    }

    if values.len() == 1 {
        Ok(OverrideValue::Single(values.remove(0)))
    } else {
        Ok(OverrideValue::Sweep(values))
    }
}

fn parse_element(raw: &str, text: &str, position: usize) -> Result<Value, ParseError> {
    let element = text.trim();
    if element.is_empty() {
        return Err(ParseError::EmptyElement {
            raw: raw.to_string(),
            position,
        });
    }

    if element.starts_with('"') || element.starts_with('\'') {
        let (s, rest) = read_quoted(raw, element)?;
        if !rest.trim().is_empty() {
            return Err(ParseError::TrailingInput {
                raw: raw.to_string(),
                rest: rest.to_string(),
            });
        }
        return Ok(Value::String(s));
    }

    if let Some(inner) = element.strip_prefix('[') {
        let Some(inner) = inner.strip_suffix(']') else {
            return Err(ParseError::UnbalancedBracket {
                raw: raw.to_string(),
            });
        };
        if inner.trim().is_empty() {
            return Ok(Value::Array(Vec::new()));
        }
        let items = split_top_level(raw, inner)?
            .into_iter()
            .enumerate()
            .map(|(i, item)| parse_element(raw, item, i))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Value::Array(items));
    }

    Ok(parse_bare(element))
}

/// Type a bare word: booleans, null, integers and finite floats are
/// recognized, anything else is a string.
fn parse_bare(word: &str) -> Value {
    if word.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if word.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if word.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Ok(n) = word.parse::<i64>() {
        return Value::from(n);
    }
    if word.bytes().any(|b| b.is_ascii_digit()) {
        if let Ok(f) = word.parse::<f64>() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    Value::String(word.to_string())
}

fn render_element(value: &Value) -> String {
    match value {
        Value::String(s) if needs_quotes(s) => {
            serde_json::to_string(s).unwrap_or_else(|_| format!("{:?}", s))
        }
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s != s.trim()
        || s.contains(|c: char| matches!(c, ',' | '[' | ']' | '"' | '\'' | '\\'))
        || !matches!(parse_bare(s), Value::String(_))
}
