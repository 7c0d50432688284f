//! Scenario selection shared by `run` and `list`

use terraprobe_core::types::Platform;
use terraprobe_runner::{Scenario, catalog, load_scenarios};
use tracing::{debug, info};

use crate::cli::ScenarioSource;
use crate::error::CliError;

/// Resolve `--scenarios` / `--builtin` into a validated, filtered scenario list.
///
/// # Errors
///
/// - `CliError::Config` when neither source is given, a built-in catalog lacks
///   `--module-dir` (or `--resource-group` for AKS), or the filter matches nothing
/// - `CliError::Scenarios` when the scenario file cannot be read or parsed
pub async fn select(source: &ScenarioSource) -> Result<Vec<Scenario>, CliError> {
    let scenarios = match (&source.scenarios, source.builtin) {
        (Some(path), _) => {
            info!(path = %path.display(), "loading scenarios");
            load_scenarios(path).await?
        }
        (None, Some(platform)) => builtin(source, platform)?,
        (None, None) => {
            return Err(CliError::Config(
                "no scenarios selected: pass --scenarios <FILE> or --builtin <PLATFORM>"
                    .to_owned(),
            ));
        }
    };

    let total = scenarios.len();
    let selected = match &source.filter {
        Some(filter) => {
            let kept: Vec<Scenario> = scenarios
                .into_iter()
                .filter(|s| s.name.contains(filter.as_str()))
                .collect();
            if kept.is_empty() {
                return Err(CliError::Config(format!(
                    "filter '{}' matched none of {} scenario(s)",
                    filter, total
                )));
            }
            kept
        }
        None => scenarios,
    };

    debug!(total, selected = selected.len(), "scenarios selected");
    Ok(selected)
}

fn builtin(source: &ScenarioSource, platform: Platform) -> Result<Vec<Scenario>, CliError> {
    let module_dir = source.module_dir.as_deref().ok_or_else(|| {
        CliError::Config(format!("--builtin {} requires --module-dir", platform))
    })?;

    let resource_group = match platform {
        Platform::Aks => Some(source.resource_group.as_deref().ok_or_else(|| {
            CliError::Config("--builtin aks requires --resource-group".to_owned())
        })?),
        Platform::Gcs => None,
    };

    let scenarios = catalog::builtin(platform, module_dir, resource_group);
    for scenario in &scenarios {
        scenario.validate()?;
    }
    Ok(scenarios)
}

/// Distinct platforms in first-seen order, for context resolution.
pub fn platforms(scenarios: &[Scenario]) -> Vec<Platform> {
    let mut platforms = Vec::new();
    for scenario in scenarios {
        if !platforms.contains(&scenario.platform) {
            platforms.push(scenario.platform);
        }
    }
    platforms
}
