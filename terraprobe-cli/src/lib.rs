#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`cli`]: clap argument definitions
//! - [`commands`]: one handler per subcommand (`run`, `list`, `name`, `config`)
//! - [`error`]: `CliError` and exit code mapping
//! - [`output`]: text/JSON rendering (`OutputWriter`, `Render`)
//! - [`logging`]: tracing subscriber setup
//! - [`metrics_server`]: optional Prometheus endpoint
//!
//! The binary is `main.rs`; this library exposes the modules for integration tests.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod metrics_server;
pub mod output;
