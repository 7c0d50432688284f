#![doc = include_str!("../README.md")]

pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod naming;
pub mod retry;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{ConfigError, HarnessError, NamingError, ScenarioError};

// 설정
pub use config::HarnessConfig;
pub use context::{AmbientSource, PlatformContext, SystemAmbient};

// 식별자 / 재시도
pub use naming::{IdentifierGenerator, NamingRules};
pub use retry::{RetryPolicy, Retryable, retry_transient};

// 도메인 타입
pub use types::{
    AssertionFailure, CleanupReport, FailureKind, GroupOutcome, LiveState, Mismatch, Outputs,
    Platform, ProvisionedResource, ResourceRef, ResourceSpec, ScenarioPhase, ScenarioResult,
    SpecValue, Verdict,
};
