//! Engine settings
//!
//! Four layers merged in precedence order:
//! 1. Built-in defaults
//! 2. Host settings (~/.config/scomp/settings.toml)
//! 3. Project settings (./scomp.toml)
//! 4. CLI flags

mod defaults;
mod effective;

pub use defaults::BuiltinSettings;
pub use effective::{
    host_settings_path, toml_to_json, EffectiveSettings, SettingsError, SettingsOrigin,
    SettingsSource, PROJECT_SETTINGS_FILE, SCHEMA_ID, SCHEMA_VERSION,
};
