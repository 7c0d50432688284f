//! `terraprobe name` command handler

use std::io::Write;

use serde::Serialize;

use terraprobe_core::naming::{IdentifierGenerator, NamingRules};
use terraprobe_core::types::Platform;

use crate::cli::NameArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `name` command.
pub async fn execute(args: NameArgs, writer: &OutputWriter) -> Result<(), CliError> {
    let report = generate(&args.prefix, args.platform, args.count)?;
    writer.render(&report)?;
    Ok(())
}

/// Issue `count` distinct names that satisfy the platform's naming rules.
///
/// # Errors
///
/// Returns `CliError::Command` if `count` is zero or the prefix cannot produce a valid name.
pub fn generate(prefix: &str, platform: Platform, count: usize) -> Result<NameReport, CliError> {
    if count == 0 {
        return Err(CliError::Command("--count must be at least 1".to_owned()));
    }

    let generator = IdentifierGenerator::new();
    let names = (0..count)
        .map(|_| generator.issue(prefix, platform))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CliError::Command(e.to_string()))?;

    Ok(NameReport {
        platform,
        max_len: NamingRules::for_platform(platform).max_len(),
        names,
    })
}

/// Generated names.
#[derive(Serialize)]
pub struct NameReport {
    pub platform: Platform,
    /// Longest name the platform accepts
    pub max_len: usize,
    pub names: Vec<String>,
}

impl Render for NameReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        for name in &self.names {
            writeln!(w, "{}", name)?;
        }
        Ok(())
    }
}
