//! Top-level error type and process exit codes.

use std::io;

use thiserror::Error;

use crate::binding::BindingError;
use crate::instantiate::InstantiateError;
use crate::loader::LoadError;
use crate::overrides::ApplyError;
use crate::registry::RegistryError;
use crate::settings::SettingsError;
use crate::sweep::CombinationStateError;
use scomp_override::ParseError;

/// Exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    /// Configuration, settings or usage error
    Config = 1,
    /// Override could not be parsed or applied
    Override = 2,
    /// Instantiation failed
    Instantiation = 3,
    /// Sweep had no successes, or fail-fast tripped
    SweepFailed = 50,
    /// Cancelled by a shutdown request
    Cancelled = 80,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Errors from composing, instantiating or sweeping a configuration.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("override error: {0}")]
    Parse(#[from] ParseError),

    #[error("override error: {0}")]
    Apply(#[from] ApplyError),

    #[error("instantiation error: {0}")]
    Instantiate(#[from] InstantiateError),

    #[error("binding error: {0}")]
    Binding(#[from] BindingError),

    #[error("config load error: {0}")]
    Load(#[from] LoadError),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("state error: {0}")]
    State(#[from] CombinationStateError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cancelled")]
    Cancelled,
}

impl ComposeError {
    /// Short machine-readable category, recorded in sweep summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ComposeError::Registry(_) => "registry",
            ComposeError::Parse(_) => "override",
            ComposeError::Apply(_) => "apply",
            ComposeError::Instantiate(_) => "instantiate",
            ComposeError::Binding(_) => "binding",
            ComposeError::Load(_) => "load",
            ComposeError::Settings(_) => "settings",
            ComposeError::State(_) => "state",
            ComposeError::Io(_) => "io",
            ComposeError::Serialization(_) => "serialization",
            ComposeError::Cancelled => "cancelled",
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            ComposeError::Parse(_) | ComposeError::Apply(_) => ExitCode::Override,
            ComposeError::Instantiate(_) => ExitCode::Instantiation,
            ComposeError::Cancelled => ExitCode::Cancelled,
            ComposeError::Registry(_)
            | ComposeError::Binding(_)
            | ComposeError::Load(_)
            | ComposeError::Settings(_)
            | ComposeError::State(_)
            | ComposeError::Io(_)
            | ComposeError::Serialization(_) => ExitCode::Config,
        }
    }
}
