#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error type (`ProvisionError`)
//! - [`provisioner`]: Provisioning tool abstraction (`Provisioner` trait, `TerraformCli`)
//! - [`workspace`]: Isolated per-scenario module copies (`Workspace`)
//! - [`driver`]: Deadlines, retries and the destroy guarantee (`LifecycleDriver`, `Lease`)

pub mod driver;
pub mod error;
pub mod provisioner;
pub mod workspace;

// --- Public API Re-exports ---

pub use driver::{DriverSettings, Lease, LifecycleDriver};
pub use error::ProvisionError;
pub use provisioner::{Invocation, Provisioner, TerraformCli};
pub use workspace::{VARS_FILE_NAME, Workspace};
