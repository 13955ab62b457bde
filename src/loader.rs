//! Config directory loading
//!
//! Layout:
//! - `<dir>/<group>/<variant>.toml|json` registers a variant; nested
//!   directories give nested groups (`scene/widgets/grid.toml`).
//! - `<dir>/<name>.toml|json` is the primary config. Its `defaults` array
//!   is the defaults list and its other keys are inline fields.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use scomp_spec::{Spec, SpecError};

use crate::registry::{DefaultsList, Registry, RegistryError};
use crate::settings::toml_to_json;

/// Key of the defaults list in a primary config
pub const DEFAULTS_KEY: &str = "defaults";

const EXTENSIONS: &[&str] = &["toml", "json"];

/// Errors loading a config directory.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("config directory not found: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("primary config '{name}' not found in {}", .dir.display())]
    MissingPrimary { dir: PathBuf, name: String },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("invalid spec in {}: {source}", .path.display())]
    Spec {
        path: PathBuf,
        #[source]
        source: SpecError,
    },

    #[error("in {}: {source}", .path.display())]
    Registry {
        path: PathBuf,
        #[source]
        source: RegistryError,
    },

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// A loaded config directory.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub registry: Registry,
    pub defaults: DefaultsList,
}

/// Load variants and the primary config from `dir`.
pub fn load(dir: &Path, name: &str) -> Result<LoadedConfig, LoadError> {
    let registry = load_registry(dir)?;
    let defaults = load_primary(dir, name)?;
    Ok(LoadedConfig { registry, defaults })
}

/// Register every variant file below `dir`, in file-name order.
pub fn load_registry(dir: &Path) -> Result<Registry, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::NotADirectory(dir.to_path_buf()));
    }

    let mut registry = Registry::new();
    for entry in WalkDir::new(dir)
        .min_depth(2)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some((group, variant)) = group_and_variant(dir, path) else {
            continue;
        };

        let spec = read_spec(path)?;
        registry
            .register(&group, &variant, spec)
            .map_err(|source| LoadError::Registry {
                path: path.to_path_buf(),
                source,
            })?;
    }

    debug!(dir = %dir.display(), groups = registry.groups().count(), "loaded config directory");
    Ok(registry)
}

/// Read the primary config `<dir>/<name>.toml|json`.
pub fn load_primary(dir: &Path, name: &str) -> Result<DefaultsList, LoadError> {
    let path = EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", name, ext)))
        .find(|p| p.is_file())
        .ok_or_else(|| LoadError::MissingPrimary {
            dir: dir.to_path_buf(),
            name: name.to_string(),
        })?;

    let mut document = read_document(&path)?;
    let defaults_value = match document.as_object_mut() {
        Some(obj) => obj.shift_remove(DEFAULTS_KEY),
        None => {
            return Err(LoadError::Parse {
                path,
                reason: "primary config must be a table".to_string(),
            })
        }
    };

    let defaults = match defaults_value {
        Some(value) => DefaultsList::from_value(&value).map_err(|source| LoadError::Registry {
            path: path.clone(),
            source,
        })?,
        None => DefaultsList::default(),
    };
    let inline = Spec::from_value(document).map_err(|source| LoadError::Spec {
        path: path.clone(),
        source,
    })?;

    debug!(path = %path.display(), entries = defaults.entries().len(), "loaded primary config");
    Ok(defaults.with_inline(inline))
}

/// `(group, variant)` for a variant file, or None for files to ignore.
fn group_and_variant(dir: &Path, path: &Path) -> Option<(String, String)> {
    let ext = path.extension()?.to_str()?;
    if !EXTENSIONS.contains(&ext) {
        return None;
    }
    let variant = path.file_stem()?.to_str()?.to_string();
    let group_dir = path.parent()?.strip_prefix(dir).ok()?;
    let segments: Option<Vec<&str>> = group_dir.components().map(|c| c.as_os_str().to_str()).collect();
    let group = segments?.join("/");
    if group.is_empty() {
        return None;
    }
    Some((group, variant))
}

fn read_spec(path: &Path) -> Result<Spec, LoadError> {
    let document = read_document(path)?;
    Spec::from_value(document).map_err(|source| LoadError::Spec {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a TOML or JSON file into a JSON document.
fn read_document(path: &Path) -> Result<Value, LoadError> {
    let contents = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_err = |reason: String| LoadError::Parse {
        path: path.to_path_buf(),
        reason,
    };

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&contents).map_err(|e| parse_err(e.to_string())),
        _ => toml::from_str::<toml::Value>(&contents)
            .map(toml_to_json)
            .map_err(|e| parse_err(e.to_string())),
    }
}
