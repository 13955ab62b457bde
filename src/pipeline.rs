//! Pipeline orchestration
//!
//! One run is: sort overrides into a plan, compose the tree (selections,
//! then field edits), optionally instantiate it, and materialize the
//! result. A sweep repeats that for every combination of the plan's axes
//! under the bounded-parallel executor, then writes the aggregate summary.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};
use ulid::Ulid;

use scomp_override::Override;

use crate::compose::{Composer, ResolvedConfig};
use crate::error::ComposeError;
use crate::instantiate::{FactoryRegistry, Instantiator, Resolved};
use crate::overrides::OverridePlan;
use crate::registry::{DefaultsList, Registry};
use crate::signal::CancellationToken;
use crate::sweep::{Combination, SweepExecutor, SweepOptions, SweepReport, SWEEP_SUMMARY_FILE};

/// Resolved tree of a run
pub const CONFIG_FILE: &str = "config.json";

/// Overrides that produced a run
pub const OVERRIDES_FILE: &str = "overrides.json";

/// Generate a sweep id (lowercase ULID)
pub fn generate_sweep_id() -> String {
    Ulid::new().to_string().to_lowercase()
}

/// Result of one composed (and possibly built) run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub config: ResolvedConfig,
    /// Built object graph, when factories were supplied
    pub built: Option<Resolved>,
}

/// Result of a sweep.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub report: SweepReport,
    /// `<output_root>/<sweep_id>`, when outputs were written
    pub sweep_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct OverridesFile<'a> {
    index: usize,
    output_id: &'a str,
    overrides: &'a [String],
}

/// Composition and sweep driver over one registry and defaults list.
#[derive(Debug, Clone)]
pub struct Pipeline<'a> {
    registry: &'a Registry,
    defaults: &'a DefaultsList,
    factories: Option<&'a FactoryRegistry>,
    output_root: Option<PathBuf>,
    options: SweepOptions,
    cancel: CancellationToken,
}

impl<'a> Pipeline<'a> {
    pub fn new(registry: &'a Registry, defaults: &'a DefaultsList) -> Self {
        Self {
            registry,
            defaults,
            factories: None,
            output_root: None,
            options: SweepOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Instantiate every run with `factories`.
    pub fn with_factories(mut self, factories: &'a FactoryRegistry) -> Self {
        self.factories = Some(factories);
        self
    }

    /// Write each sweep run's files below `root`.
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = Some(root.into());
        self
    }

    pub fn with_options(mut self, options: SweepOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Sort overrides, recognizing group selections from the registry.
    pub fn plan(&self, overrides: &[Override]) -> Result<OverridePlan, ComposeError> {
        Ok(OverridePlan::build(overrides, self.registry)?)
    }

    /// Compose and build a single run.
    pub fn run(&self, overrides: &[Override]) -> Result<RunOutput, ComposeError> {
        let plan = self.plan(overrides)?;
        self.run_plan(&plan)
    }

    /// Compose and build one single-valued plan.
    pub fn run_plan(&self, plan: &OverridePlan) -> Result<RunOutput, ComposeError> {
        let config = Composer::new(self.registry).compose_plan(self.defaults, plan)?;
        let built = match self.factories {
            Some(factories) => Some(Instantiator::new(factories).instantiate(&config.tree)?),
            None => None,
        };
        Ok(RunOutput { config, built })
    }

    /// Run every combination of the overrides' sweep axes.
    pub fn sweep(&self, overrides: &[Override]) -> Result<SweepOutcome, ComposeError> {
        self.sweep_with(overrides, |_, _| Ok(()))
    }

    /// Like [`Pipeline::sweep`], handing each successful run to `on_run`.
    /// An error from `on_run` fails that combination only.
    pub fn sweep_with<F>(&self, overrides: &[Override], on_run: F) -> Result<SweepOutcome, ComposeError>
    where
        F: Fn(&Combination, &RunOutput) -> Result<(), ComposeError> + Sync,
    {
        let plan = self.plan(overrides)?;
        let sweep_id = generate_sweep_id();

        let sweep_dir = match &self.output_root {
            Some(root) => {
                let dir = root.join(&sweep_id);
                fs::create_dir_all(&dir)?;
                info!(sweep_id = %sweep_id, dir = %dir.display(), "sweep output directory");
                Some(dir)
            }
            None => None,
        };

        let executor = SweepExecutor::new(self.options).with_cancellation(self.cancel.clone());
        let report = executor.run(&sweep_id, &plan.axes, |combination| {
            let output = self.run_plan(&plan.for_combination(combination))?;
            if let Some(dir) = &sweep_dir {
                write_run(dir, combination, &output.config)?;
            }
            on_run(combination, &output)
        });

        if let Some(dir) = &sweep_dir {
            report.write_to_file(&dir.join(SWEEP_SUMMARY_FILE))?;
        }

        Ok(SweepOutcome { report, sweep_dir })
    }
}

/// Write `config.json` and `overrides.json` for one combination.
fn write_run(sweep_dir: &Path, combination: &Combination, config: &ResolvedConfig) -> Result<PathBuf, ComposeError> {
    let output_id = combination.output_id();
    let dir = sweep_dir.join(&output_id);
    fs::create_dir_all(&dir)?;

    fs::write(dir.join(CONFIG_FILE), serde_json::to_string_pretty(&config.to_value())?)?;
    let record = OverridesFile {
        index: combination.index,
        output_id: &output_id,
        overrides: &config.overrides,
    };
    fs::write(dir.join(OVERRIDES_FILE), serde_json::to_string_pretty(&record)?)?;

    debug!(index = combination.index, dir = %dir.display(), "wrote run outputs");
    Ok(dir)
}
