//! `terraprobe list` command handler

use std::io::Write;

use serde::Serialize;

use terraprobe_core::types::Platform;
use terraprobe_runner::{Expect, Scenario};

use crate::cli::ListArgs;
use crate::commands::source;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `list` command.
pub async fn execute(args: ListArgs, writer: &OutputWriter) -> Result<(), CliError> {
    let scenarios = source::select(&args.source).await?;
    let report = ScenarioListReport::from_scenarios(&scenarios);
    writer.render(&report)?;
    Ok(())
}

/// One scenario as shown by `list`.
#[derive(Serialize)]
pub struct ScenarioSummary {
    pub name: String,
    pub platform: Platform,
    pub module_dir: String,
    pub expect: Expect,
    /// Assertion group names, excluding the implicit spec group
    pub groups: Vec<String>,
    pub checks: usize,
    pub fixtures: usize,
    pub verify_destroyed: bool,
}

impl From<&Scenario> for ScenarioSummary {
    fn from(scenario: &Scenario) -> Self {
        Self {
            name: scenario.name.clone(),
            platform: scenario.platform,
            module_dir: scenario.module_dir.display().to_string(),
            expect: scenario.expect,
            groups: scenario.groups.iter().map(|g| g.name.clone()).collect(),
            checks: scenario.groups.iter().map(|g| g.checks.len()).sum(),
            fixtures: scenario.fixtures.len(),
            verify_destroyed: scenario.verify_destroyed,
        }
    }
}

/// Scenario list output.
#[derive(Serialize)]
pub struct ScenarioListReport {
    pub scenarios: Vec<ScenarioSummary>,
    pub total: usize,
}

impl ScenarioListReport {
    pub fn from_scenarios(scenarios: &[Scenario]) -> Self {
        let scenarios: Vec<ScenarioSummary> = scenarios.iter().map(ScenarioSummary::from).collect();
        Self {
            total: scenarios.len(),
            scenarios,
        }
    }
}

impl Render for ScenarioListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Scenarios: {}", self.total.to_string().bold())?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<28} {:<8} {:<14} {:<7} {:<8} {}",
            "NAME", "PLATFORM", "EXPECT", "CHECKS", "DESTROY", "GROUPS"
        )?;
        writeln!(w, "{}", "-".repeat(90))?;

        for s in &self.scenarios {
            let expect = match s.expect {
                Expect::ApplySucceeds => "apply".normal(),
                Expect::ApplyFails => "apply-fails".yellow(),
            };
            let destroy = if s.verify_destroyed { "verify" } else { "-" };
            writeln!(
                w,
                "{:<28} {:<8} {:<14} {:<7} {:<8} {}",
                s.name,
                s.platform,
                expect,
                s.checks,
                destroy,
                s.groups.join(", ")
            )?;
        }

        Ok(())
    }
}
