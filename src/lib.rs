//! scomp - config-driven object composition
//!
//! Named configuration variants are registered per group, merged from a
//! defaults list, patched with command-line overrides, and built into
//! object graphs by target factories. Multi-valued overrides expand into
//! sweeps whose combinations run independently under bounded parallelism.

pub mod binding;
pub mod compose;
pub mod error;
pub mod instantiate;
pub mod loader;
pub mod overrides;
pub mod pipeline;
pub mod registry;
pub mod settings;
pub mod signal;
pub mod sweep;

pub use binding::{Binding, BindingError, BindingTable};
pub use compose::{Composer, ResolvedConfig};
pub use error::{ComposeError, ExitCode};
pub use instantiate::{
    FactoryRegistry, InstantiateError, Instantiator, KwargError, Kwargs, Resolved,
};
pub use loader::{load, LoadError, LoadedConfig};
pub use overrides::{apply, apply_all, ApplyError, OverridePlan};
pub use pipeline::{Pipeline, RunOutput, SweepOutcome};
pub use registry::{DefaultsEntry, DefaultsList, Registry, RegistryError, SharedRegistry};
pub use settings::{EffectiveSettings, SettingsError};
pub use signal::{CancellationToken, SignalHandler};
pub use sweep::{
    CombinationState, SweepAxis, SweepExecutor, SweepOptions, SweepReport, SweepStatus,
};

pub use scomp_override::{parse_all, parse_override, Override, OverrideKind, OverrideValue, ParseError};
pub use scomp_spec::{ConfigPath, Instance, Spec, SpecError, SpecMap, TargetSpec};
