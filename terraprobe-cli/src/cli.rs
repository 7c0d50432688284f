//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use terraprobe_core::types::Platform;

/// terraprobe -- provision, verify and tear down infrastructure under test.
///
/// Use `terraprobe <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "terraprobe", version, about, long_about = None)]
pub struct Cli {
    /// Path to the terraprobe.toml configuration file.
    #[arg(short, long, default_value = "terraprobe.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scenarios and report the outcome of each.
    Run(RunArgs),

    /// List scenarios without running them.
    List(ListArgs),

    /// Generate collision-resistant resource names.
    Name(NameArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- scenario selection ----

/// Where scenarios come from. Exactly one of `--scenarios` and `--builtin` is required.
#[derive(Args, Debug, Default)]
pub struct ScenarioSource {
    /// TOML file with `[[scenario]]` tables.
    #[arg(long, conflicts_with = "builtin")]
    pub scenarios: Option<PathBuf>,

    /// Use the built-in catalog for a platform (gcs, aks).
    #[arg(long)]
    pub builtin: Option<Platform>,

    /// Terraform module directory for the built-in catalog.
    #[arg(long)]
    pub module_dir: Option<PathBuf>,

    /// Azure resource group for the built-in AKS catalog.
    #[arg(long)]
    pub resource_group: Option<String>,

    /// Keep only scenarios whose name contains this string.
    #[arg(long)]
    pub filter: Option<String>,
}

// ---- run ----

/// Run scenarios.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: ScenarioSource,

    /// Override `runner.max_concurrent_scenarios`.
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Keep every workdir after destroy, not only the ones whose destroy failed.
    #[arg(long)]
    pub keep_workdirs: bool,
}

// ---- list ----

/// List scenarios.
#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub source: ScenarioSource,
}

// ---- name ----

/// Generate resource names.
#[derive(Args, Debug)]
pub struct NameArgs {
    /// Name prefix, e.g. `tp-gcs`.
    pub prefix: String,

    /// Platform whose naming rules apply (gcs, aks).
    #[arg(long, default_value = "gcs")]
    pub platform: Platform,

    /// Number of names to generate.
    #[arg(long, default_value_t = 1)]
    pub count: usize,
}

// ---- config ----

/// Manage terraprobe configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section
        /// (general, terraform, retry, verify, runner, gcp, azure, metrics).
        #[arg(long)]
        section: Option<String>,
    },
}
