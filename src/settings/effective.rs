//! Effective settings with full provenance
//!
//! Captures the merged settings plus where each layer came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use scomp_spec::merge_documents;

use super::defaults::BuiltinSettings;
use crate::sweep::{SweepOptions, MAX_PARALLEL_LIMIT};

/// Schema version for effective settings
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "scomp/effective_settings@1";

/// Project settings file, relative to the working directory
pub const PROJECT_SETTINGS_FILE: &str = "scomp.toml";

/// Host settings file: `$HOME/.config/scomp/settings.toml`.
pub fn host_settings_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("scomp")
            .join("settings.toml")
    })
}

/// Origin of a settings layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SettingsOrigin {
    Builtin,
    Host,
    Project,
    Cli,
}

/// A contributing settings layer with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsSource {
    pub origin: SettingsOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Effective settings with full provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveSettings {
    pub schema_version: u32,
    pub schema_id: String,

    /// When these settings were computed
    pub created_at: DateTime<Utc>,

    /// The merged settings object
    pub settings: Value,

    /// Contributing layers in precedence order
    pub sources: Vec<SettingsSource>,
}

impl EffectiveSettings {
    /// Build effective settings from layers. Missing files are skipped.
    pub fn build(
        host_path: Option<&Path>,
        project_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, SettingsError> {
        let mut merged = BuiltinSettings::default().to_value();
        let mut sources = vec![SettingsSource {
            origin: SettingsOrigin::Builtin,
            path: None,
            digest: None,
        }];

        for (origin, path) in [
            (SettingsOrigin::Host, host_path),
            (SettingsOrigin::Project, project_path),
        ] {
            let Some(path) = path.filter(|p| p.exists()) else {
                continue;
            };
            let (value, digest) = load_toml_file(path)?;
            merged = merge_documents(merged, value);
            sources.push(SettingsSource {
                origin,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            merged = merge_documents(merged, cli);
            sources.push(SettingsSource {
                origin: SettingsOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        validate(&merged)?;

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            settings: merged,
            sources,
        })
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }

    /// Get a value by dot-separated path
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.settings;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(Value::as_u64)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    pub fn config_dir(&self) -> PathBuf {
        PathBuf::from(self.get_str("config_dir").unwrap_or("conf"))
    }

    pub fn config_name(&self) -> &str {
        self.get_str("config_name").unwrap_or("config")
    }

    pub fn output_root(&self) -> PathBuf {
        PathBuf::from(self.get_str("output.root").unwrap_or("outputs"))
    }

    pub fn log_level(&self) -> &str {
        self.get_str("logging.level").unwrap_or("warn")
    }

    /// Sweep policy taken from `sweep.*`.
    pub fn sweep_options(&self) -> SweepOptions {
        let defaults = SweepOptions::default();
        SweepOptions {
            max_parallel: self
                .get_u64("sweep.max_parallel")
                .map(|n| n as usize)
                .unwrap_or(defaults.max_parallel),
            fail_fast: self.get_bool("sweep.fail_fast").unwrap_or(defaults.fail_fast),
        }
    }
}

/// Load and parse a TOML file, returning the value and digest
fn load_toml_file(path: &Path) -> Result<(Value, String), SettingsError> {
    let bytes = fs::read(path).map_err(|e| SettingsError::IoError(format!("{}: {}", path.display(), e)))?;
    let digest = hex::encode(Sha256::digest(&bytes));

    let contents = String::from_utf8(bytes)
        .map_err(|e| SettingsError::ParseError(format!("{}: invalid UTF-8: {}", path.display(), e)))?;
    let table: toml::Value = toml::from_str(&contents)
        .map_err(|e| SettingsError::ParseError(format!("{}: {}", path.display(), e)))?;

    Ok((toml_to_json(table), digest))
}

/// Convert a TOML value to JSON. Datetimes become strings; non-finite
/// floats become null.
pub fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn validate(settings: &Value) -> Result<(), SettingsError> {
    let sweep = settings.get("sweep");
    if let Some(parallel) = sweep.and_then(|s| s.get("max_parallel")) {
        let ok = parallel
            .as_u64()
            .is_some_and(|n| n >= 1 && n <= MAX_PARALLEL_LIMIT as u64);
        if !ok {
            return Err(SettingsError::ValidationError(format!(
                "sweep.max_parallel must be in [1, {}]",
                MAX_PARALLEL_LIMIT
            )));
        }
    }

    if let Some(fail_fast) = sweep.and_then(|s| s.get("fail_fast")) {
        if !fail_fast.is_boolean() {
            return Err(SettingsError::ValidationError(
                "sweep.fail_fast must be a boolean".to_string(),
            ));
        }
    }

    let root = settings.get("output").and_then(|o| o.get("root"));
    if !root.and_then(Value::as_str).is_some_and(|r| !r.trim().is_empty()) {
        return Err(SettingsError::ValidationError(
            "output.root must be a non-empty string".to_string(),
        ));
    }

    for key in ["config_dir", "config_name"] {
        if !settings.get(key).and_then(Value::as_str).is_some_and(|v| !v.is_empty()) {
            return Err(SettingsError::ValidationError(format!(
                "{} must be a non-empty string",
                key
            )));
        }
    }

    Ok(())
}

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
