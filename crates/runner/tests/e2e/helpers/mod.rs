//! Shared E2E test helpers.
//!
//! Provides an in-memory cloud, mocks for the provisioning tool and the
//! platform API, and a harness that wires them into a runner.

pub mod fake_cloud;
pub mod harness;
pub mod mock_client;
pub mod mock_provisioner;
