//! `terraprobe run` command handler

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use terraprobe_core::config::HarnessConfig;
use terraprobe_core::context::{PlatformContext, SystemAmbient};
use terraprobe_core::naming::IdentifierGenerator;
use terraprobe_core::types::{CleanupReport, ScenarioResult};
use terraprobe_lifecycle::{DriverSettings, LifecycleDriver, TerraformCli};
use terraprobe_runner::{ScenarioRunner, Suite, SuiteReport};
use terraprobe_verifier::{KubectlCli, PlatformClients, StateVerifier};

use crate::cli::RunArgs;
use crate::commands::source;
use crate::error::CliError;
use crate::metrics_server;
use crate::output::{OutputWriter, Render};

/// Execute the `run` command.
///
/// # Errors
///
/// - `CliError::Config` / `CliError::Scenarios` before anything is provisioned
/// - `CliError::ScenariosFailed` after the suite ran, if any scenario failed or leaked
pub async fn execute(
    args: RunArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let mut config = HarnessConfig::load_or_default(config_path).await?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let scenarios = source::select(&args.source).await?;
    let platforms = source::platforms(&scenarios);
    let context = PlatformContext::resolve(&config, &platforms, &SystemAmbient).await?;

    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
    }

    let provisioner = Arc::new(TerraformCli::new(config.terraform.binary.clone()));
    let driver = LifecycleDriver::new(provisioner, DriverSettings::from_config(&config, &context));
    let verifier = StateVerifier::new(
        Arc::new(
            PlatformClients::from_context(&context)
                .with_kubectl(KubectlCli::new(config.verify.kubectl_binary.clone())),
        ),
        config.verify.policy(),
        config.verify.timeout(),
    );
    let runner = ScenarioRunner::new(driver, verifier, Arc::new(IdentifierGenerator::new()))
        .with_scenario_deadline(config.runner.scenario_deadline());
    let suite = Suite::new(Arc::new(runner), config.runner.max_concurrent_scenarios);

    info!(
        scenarios = scenarios.len(),
        max_concurrent = suite.max_concurrent(),
        "running scenarios"
    );
    let report = suite.run(scenarios).await;

    writer.render(&report)?;

    if !report.is_clean() {
        return Err(CliError::ScenariosFailed {
            failed: report.failed,
            cleanup_failures: report.cleanup_failures,
        });
    }

    Ok(())
}

/// Apply `run` flags on top of file and env configuration.
pub fn apply_overrides(config: &mut HarnessConfig, args: &RunArgs) {
    if let Some(max) = args.max_concurrent {
        config.runner.max_concurrent_scenarios = max;
    }
    if args.keep_workdirs {
        config.terraform.keep_workdirs = true;
    }
}

impl Render for SuiteReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for result in &self.results {
            render_result(result, w)?;
        }

        writeln!(w)?;
        let summary = format!(
            "{} passed, {} failed, {} cleanup failure(s) in {:.1}s",
            self.passed,
            self.failed,
            self.cleanup_failures,
            self.duration.as_secs_f64()
        );
        if self.is_clean() {
            writeln!(w, "Result: {}", summary.green().bold())?;
        } else {
            writeln!(w, "Result: {}", summary.red().bold())?;
        }

        Ok(())
    }
}

fn render_result(result: &ScenarioResult, w: &mut dyn Write) -> std::io::Result<()> {
    use colored::Colorize;

    let status = if result.is_passed() {
        "PASS".green().bold()
    } else {
        "FAIL".red().bold()
    };
    writeln!(
        w,
        "{} {} ({}, {:.1}s)",
        status,
        result.scenario.bold(),
        result.identifier.as_deref().unwrap_or("no identifier"),
        result.duration.as_secs_f64()
    )?;

    if let (Some(phase), Some(kind)) = (result.failed_phase, result.kind) {
        writeln!(w, "  Failed in {} ({})", phase, kind.to_string().yellow())?;
    }
    if let Some(error) = &result.primary_error {
        writeln!(w, "  Error: {}", error.red())?;
    }
    for mismatch in result.mismatches() {
        writeln!(
            w,
            "  Mismatch {}: expected {}, got {}",
            mismatch.field.bold(),
            mismatch.expected,
            mismatch.actual.as_deref().unwrap_or("<absent>")
        )?;
    }

    match &result.cleanup {
        CleanupReport::Destroyed {
            absence_confirmed: Some(false),
        } => writeln!(w, "  Cleanup: {}", "destroyed, resource still reachable".red())?,
        CleanupReport::Destroyed { .. } | CleanupReport::NotRequired => {}
        CleanupReport::DestroyFailed { reason, workdir } => {
            writeln!(w, "  Cleanup: {} {}", "DESTROY FAILED".red().bold(), reason)?;
            if let Some(workdir) = workdir {
                writeln!(w, "  Workdir kept for manual cleanup: {}", workdir)?;
            }
        }
    }

    Ok(())
}
