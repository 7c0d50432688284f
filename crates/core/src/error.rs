//! 에러 타입 -- 도메인별 에러 정의
//!
//! 시나리오 실행 중 발생하는 에러는 [`ScenarioError`]로 표현되며,
//! 각 variant는 [`FailureKind`] 하나에 대응합니다.

use std::time::Duration;

use crate::types::{FailureKind, Mismatch, ScenarioPhase};

/// terraprobe 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 시나리오 실행 에러
    #[error("scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    /// 식별자 생성 에러
    #[error("naming error: {0}")]
    Naming(#[from] NamingError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// 환경변수, 플랫폼 CLI 설정 어디에서도 값을 찾지 못함
    #[error("could not resolve '{field}': tried {tried}")]
    Unresolved { field: String, tried: String },
}

/// 식별자 생성 에러
#[derive(Debug, thiserror::Error)]
pub enum NamingError {
    /// 플랫폼 네이밍 규칙 위반
    #[error("name '{name}' violates {platform} naming rules: {reason}")]
    RuleViolation {
        name: String,
        platform: String,
        reason: String,
    },

    /// 충돌 없는 이름을 만들지 못함
    #[error("could not generate a unique name for prefix '{prefix}' after {attempts} attempts")]
    Exhausted { prefix: String, attempts: u32 },
}

/// 시나리오 실행 에러
///
/// 시나리오 러너가 [`ScenarioResult`](crate::types::ScenarioResult)로 집계합니다.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScenarioError {
    /// ResourceSpec 형식 오류 (apply 이전에 실패)
    #[error("invalid resource spec: {reason}")]
    SpecInvalid { reason: String },

    /// 프로비저닝 도구가 0이 아닌 종료 코드를 반환
    #[error("apply failed ({command}, exit {exit_code:?}): {detail}")]
    ApplyFailed {
        command: String,
        exit_code: Option<i32>,
        detail: String,
    },

    /// 라이브 상태가 기대값과 다름
    #[error("live state mismatch: {}", format_mismatches(.mismatches))]
    VerifyMismatch { mismatches: Vec<Mismatch> },

    /// 재시도 가능한 조회 에러가 한도까지 반복됨
    #[error("live state fetch failed after {attempts} attempts: {last_error}")]
    VerifyTransient { attempts: u32, last_error: String },

    /// 정리(destroy) 실패
    #[error("destroy failed: {reason}")]
    DestroyFailed { reason: String },

    /// 단계별 데드라인 초과
    #[error("{phase} timed out after {}s", .after.as_secs())]
    Timeout { phase: ScenarioPhase, after: Duration },

    /// 검증 그룹 내부의 예기치 않은 panic
    #[error("unexpected fault: {reason}")]
    Fault { reason: String },
}

impl ScenarioError {
    /// 에러에 대응하는 실패 유형을 반환합니다.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::SpecInvalid { .. } => FailureKind::SpecInvalid,
            Self::ApplyFailed { .. } => FailureKind::ApplyFailed,
            Self::VerifyMismatch { .. } => FailureKind::VerifyMismatch,
            Self::VerifyTransient { .. } => FailureKind::VerifyTransient,
            Self::DestroyFailed { .. } => FailureKind::DestroyFailed,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Fault { .. } => FailureKind::Fault,
        }
    }
}

impl From<NamingError> for ScenarioError {
    fn from(err: NamingError) -> Self {
        Self::SpecInvalid {
            reason: err.to_string(),
        }
    }
}

fn format_mismatches(mismatches: &[Mismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
