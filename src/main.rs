//! scomp CLI
//!
//! Entry point for the `scomp` command-line tool.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scomp::settings::{host_settings_path, PROJECT_SETTINGS_FILE};
use scomp::{
    loader, parse_all, ComposeError, EffectiveSettings, ExitCode, LoadedConfig, Override, Pipeline,
    SignalHandler,
};

#[derive(Parser)]
#[command(name = "scomp")]
#[command(about = "Compose configurations from variants and overrides, and run sweeps", version)]
struct Cli {
    /// Directory holding group variants and the primary config
    #[arg(long, short = 'd', global = true)]
    config_dir: Option<PathBuf>,

    /// Primary config name inside the config directory
    #[arg(long, short = 'n', global = true)]
    config_name: Option<String>,

    /// Log filter when SCOMP_LOG is unset (e.g. "info", "scomp=debug")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the composed configuration as JSON
    Compose {
        /// Overrides: path=value, +path=value, ~path, group=variant
        overrides: Vec<String>,
    },

    /// Run every combination of multi-valued overrides
    Sweep {
        /// Overrides; comma-separated values become sweep axes
        overrides: Vec<String>,

        /// Maximum combinations running at once
        #[arg(long, short = 'j')]
        max_parallel: Option<u64>,

        /// Stop starting combinations after the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Root directory for sweep outputs
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Print the sweep summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List config groups and their variants
    Groups {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print effective settings with provenance
    Settings,
}

fn main() {
    let cli = Cli::parse();

    let settings = match build_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            process::exit(e.exit_code().as_i32());
        }
    };
    init_tracing(settings.log_level());

    let code = match run(cli.command, &settings) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    process::exit(code.as_i32());
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_env("SCOMP_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// CLI flags as the highest settings layer.
fn cli_layer(cli: &Cli) -> Option<Value> {
    let mut layer = Map::new();
    if let Some(dir) = &cli.config_dir {
        layer.insert("config_dir".into(), json!(dir.to_string_lossy()));
    }
    if let Some(name) = &cli.config_name {
        layer.insert("config_name".into(), json!(name));
    }
    if let Some(level) = &cli.log_level {
        layer.insert("logging".into(), json!({ "level": level }));
    }
    if let Commands::Sweep {
        max_parallel,
        fail_fast,
        output,
        ..
    } = &cli.command
    {
        let mut sweep = Map::new();
        if let Some(n) = max_parallel {
            sweep.insert("max_parallel".into(), json!(n));
        }
        if *fail_fast {
            sweep.insert("fail_fast".into(), json!(true));
        }
        if !sweep.is_empty() {
            layer.insert("sweep".into(), Value::Object(sweep));
        }
        if let Some(out) = output {
            layer.insert("output".into(), json!({ "root": out.to_string_lossy() }));
        }
    }

    (!layer.is_empty()).then_some(Value::Object(layer))
}

fn build_settings(cli: &Cli) -> Result<EffectiveSettings, ComposeError> {
    let host = host_settings_path();
    let project = PathBuf::from(PROJECT_SETTINGS_FILE);
    Ok(EffectiveSettings::build(
        host.as_deref(),
        Some(project.as_path()),
        cli_layer(cli),
    )?)
}

fn run(command: Commands, settings: &EffectiveSettings) -> Result<ExitCode, ComposeError> {
    match command {
        Commands::Compose { overrides } => run_compose(settings, &overrides),
        Commands::Sweep {
            overrides, json, ..
        } => run_sweep(settings, &overrides, json),
        Commands::Groups { json } => run_groups(settings, json),
        Commands::Settings => {
            println!("{}", settings.to_json()?);
            Ok(ExitCode::Success)
        }
    }
}

fn load_config(settings: &EffectiveSettings) -> Result<LoadedConfig, ComposeError> {
    Ok(loader::load(&settings.config_dir(), settings.config_name())?)
}

fn parse_overrides(raw: &[String]) -> Result<Vec<Override>, ComposeError> {
    Ok(parse_all(raw)?)
}

fn run_compose(settings: &EffectiveSettings, raw: &[String]) -> Result<ExitCode, ComposeError> {
    let overrides = parse_overrides(raw)?;
    let loaded = load_config(settings)?;
    let output = Pipeline::new(&loaded.registry, &loaded.defaults).run(&overrides)?;
    println!("{}", serde_json::to_string_pretty(&output.config.to_value())?);
    Ok(ExitCode::Success)
}

fn run_sweep(settings: &EffectiveSettings, raw: &[String], json_output: bool) -> Result<ExitCode, ComposeError> {
    let overrides = parse_overrides(raw)?;
    let loaded = load_config(settings)?;

    let handler = SignalHandler::new();
    if let Err(e) = handler.install() {
        warn!(error = %e, "could not install signal handler");
    }

    let outcome = Pipeline::new(&loaded.registry, &loaded.defaults)
        .with_output_root(settings.output_root())
        .with_options(settings.sweep_options())
        .with_cancellation(handler.token())
        .sweep(&overrides)?;
    let report = &outcome.report;

    if json_output {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report.human_summary);
        for result in &report.results {
            match &result.failure {
                Some(failure) => println!("  [{}] {:?} {}: {}", result.index, result.state, result.output_id, failure.message),
                None => println!("  [{}] {:?} {}", result.index, result.state, result.output_id),
            }
        }
        if let Some(dir) = &outcome.sweep_dir {
            println!("Outputs: {}", dir.display());
        }
    }

    info!(sweep_id = %report.sweep_id, status = ?report.status, "sweep complete");
    Ok(report.exit_code_enum())
}

fn run_groups(settings: &EffectiveSettings, json_output: bool) -> Result<ExitCode, ComposeError> {
    let registry = loader::load_registry(&settings.config_dir())?;

    if json_output {
        let groups: Map<String, Value> = registry
            .groups()
            .map(|g| (g.to_string(), json!(registry.variants(g).unwrap_or_default())))
            .collect();
        println!("{}", serde_json::to_string_pretty(&groups)?);
    } else if registry.groups().next().is_none() {
        println!("No config groups found in {}", settings.config_dir().display());
    } else {
        for group in registry.groups() {
            let variants = registry.variants(group).unwrap_or_default();
            println!("{}: {}", group, variants.join(", "));
        }
    }
    Ok(ExitCode::Success)
}
