#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: 시나리오 파일 로딩 에러 (`RunnerError`)
//! - [`scenario`]: 시나리오 서술자, 검증 그룹, `${id}` 템플릿
//! - [`runner`]: 단계 상태 기계와 보장된 정리 (`ScenarioRunner`)
//! - [`suite`]: 제한된 병렬 실행과 집계 (`Suite`, `SuiteReport`)
//! - [`catalog`]: GCS/AKS 내장 시나리오

pub mod catalog;
pub mod error;
pub mod runner;
pub mod scenario;
pub mod suite;

// --- Public API Re-exports ---

pub use error::RunnerError;
pub use runner::{DEFAULT_SCENARIO_DEADLINE, SPEC_GROUP, ScenarioRunner};
pub use scenario::{
    AssertionGroup, Check, CheckSource, Expect, Scenario, Template, load_scenarios,
    parse_scenarios,
};
pub use suite::{Suite, SuiteReport};
