use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use terraprobe_cli::cli::{Cli, Commands};
use terraprobe_cli::commands;
use terraprobe_cli::error::CliError;
use terraprobe_cli::logging;
use terraprobe_cli::output::OutputWriter;
use terraprobe_core::config::{GeneralConfig, HarnessConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let writer = OutputWriter::new(cli.output);

    match run(cli, &writer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli, writer: &OutputWriter) -> Result<(), CliError> {
    // A broken config file must still produce logs; the command reports the error itself.
    let mut general = HarnessConfig::load_or_default(&cli.config)
        .await
        .map(|config| config.general)
        .unwrap_or_else(|_| GeneralConfig::default());
    if let Some(level) = &cli.log_level {
        general.log_level = level.clone();
    }
    logging::init_tracing(&general)?;

    tracing::debug!(config = %cli.config.display(), "terraprobe starting");

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, &cli.config, writer).await,
        Commands::List(args) => commands::list::execute(args, writer).await,
        Commands::Name(args) => commands::name::execute(args, writer).await,
        Commands::Config(args) => commands::config::execute(args, &cli.config, writer).await,
    }
}
