//! E2E test scenarios.

mod apply_failure;
mod catalog;
mod cleanup;
mod concurrency;
mod deadline;
mod gcs_bucket;
