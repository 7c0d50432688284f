//! 러너 에러 타입
//!
//! [`RunnerError`]는 시나리오 파일 로딩과 시나리오 정의 검증 중 발생하는 에러입니다.
//! 시나리오 실행 중 에러는 [`ScenarioError`](terraprobe_core::error::ScenarioError)로
//! 표현되어 [`ScenarioResult`](terraprobe_core::types::ScenarioResult)에 집계됩니다.

use terraprobe_core::error::{ConfigError, HarnessError};

/// 시나리오 정의 에러
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// 시나리오 파일을 읽을 수 없음
    #[error("failed to read scenario file {path}: {source}")]
    Read {
        /// 파일 경로
        path: String,
        /// 원인
        #[source]
        source: std::io::Error,
    },

    /// 시나리오 파일 파싱 실패
    #[error("failed to parse scenario file {path}: {reason}")]
    Parse {
        /// 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 같은 이름의 시나리오가 둘 이상 정의됨
    #[error("duplicate scenario name '{name}'")]
    DuplicateScenario {
        /// 중복된 이름
        name: String,
    },

    /// 시나리오 정의가 유효하지 않음
    #[error("scenario '{name}' is invalid: {reason}")]
    InvalidScenario {
        /// 시나리오 이름
        name: String,
        /// 실패 사유
        reason: String,
    },
}

impl From<RunnerError> for HarnessError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Read { source, .. } => HarnessError::Io(source),
            RunnerError::Parse { path, reason } => HarnessError::Config(ConfigError::ParseFailed {
                reason: format!("{path}: {reason}"),
            }),
            other => HarnessError::Config(ConfigError::InvalidValue {
                field: "scenario".to_owned(),
                reason: other.to_string(),
            }),
        }
    }
}
