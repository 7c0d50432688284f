//! E2E tests for terraprobe-runner.
//!
//! Scenarios run through the real `ScenarioRunner`, `LifecycleDriver` and
//! `StateVerifier`; only the Terraform binary and the cloud API are replaced
//! by mocks sharing one in-memory `FakeCloud`.
//!
//! # Test Structure
//!
//! - `helpers/` -- Fake cloud, mock provisioner, mock platform client, harness
//! - `scenarios/` -- Test files organized by behavior
//!
//! # Running
//!
//! ```bash
//! cargo test -p terraprobe-runner --test e2e
//! ```

mod helpers;
mod scenarios;
