//! Built-in settings (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default settings values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinSettings {
    /// Directory holding group variants and the primary config (default: "conf")
    pub config_dir: String,

    /// Primary config file stem inside `config_dir` (default: "config")
    pub config_name: String,

    /// Root directory for run outputs (default: "outputs")
    pub output_root: String,

    /// Sweep worker threads (default: 1)
    pub max_parallel: u64,

    /// Stop a sweep at its first failure (default: false)
    pub fail_fast: bool,

    /// Log filter used when SCOMP_LOG is unset (default: "warn")
    pub log_level: String,
}

impl Default for BuiltinSettings {
    fn default() -> Self {
        Self {
            config_dir: "conf".to_string(),
            config_name: "config".to_string(),
            output_root: "outputs".to_string(),
            max_parallel: 1,
            fail_fast: false,
            log_level: "warn".to_string(),
        }
    }
}

impl BuiltinSettings {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "config_dir": self.config_dir,
            "config_name": self.config_name,
            "output": {
                "root": self.output_root
            },
            "sweep": {
                "max_parallel": self.max_parallel,
                "fail_fast": self.fail_fast
            },
            "logging": {
                "level": self.log_level
            }
        })
    }
}
