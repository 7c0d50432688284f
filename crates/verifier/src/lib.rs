#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Fetch error classification (`FetchError`)
//! - [`client`]: Platform API abstraction (`PlatformClient` trait, `Fixture`)
//! - [`token`]: Bearer token sources (`TokenSource`, `TokenProvider`)
//! - [`gcs`]: Google Cloud Storage client (`GcsClient`)
//! - [`aks`]: Azure Kubernetes Service client (`AksClient`)
//! - [`kube`]: Kubernetes namespace reads through `kubectl` (`KubectlCli`)
//! - [`dispatch`]: Per-platform routing (`PlatformClients`)
//! - [`compare`]: Matchers, expectations and normalization
//! - [`verifier`]: Eventual-consistency retries and deadlines (`StateVerifier`)

pub mod aks;
pub mod client;
pub mod compare;
pub mod dispatch;
pub mod error;
pub mod gcs;
pub mod kube;
pub mod token;
pub mod verifier;

// --- Public API Re-exports ---

pub use aks::AksClient;
pub use client::{Fixture, PlatformClient};
pub use compare::{Expectation, Matcher, compare, normalize, spec_expectations};
pub use dispatch::PlatformClients;
pub use error::FetchError;
pub use gcs::GcsClient;
pub use kube::KubectlCli;
pub use token::{TokenProvider, TokenSource};
pub use verifier::StateVerifier;
