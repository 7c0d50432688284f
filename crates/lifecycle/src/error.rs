//! 라이프사이클 에러 타입
//!
//! [`ProvisionError`]는 프로비저닝 도구 실행과 작업 디렉토리 준비 중 발생하는 에러를 표현합니다.
//! `From<ProvisionError> for ScenarioError` 변환은 apply 단계 실패(`ApplyFailed`)로 매핑되며,
//! destroy 단계에서는 드라이버가 `DestroyFailed`로 직접 변환합니다.
//! `Interrupted`는 단계를 알고 있는 드라이버가 `Timeout`으로 변환합니다.

use terraprobe_core::error::ScenarioError;
use terraprobe_core::retry::Retryable;

/// 프로비저닝 도메인 에러
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProvisionError {
    /// 프로비저닝 도구 실행 자체가 실패함 (바이너리 없음, 권한 등)
    #[error("failed to spawn '{command}': {reason}")]
    Spawn {
        /// 실행하려던 명령
        command: String,
        /// 실패 사유
        reason: String,
    },

    /// 프로비저닝 도구가 0이 아닌 종료 코드를 반환함
    #[error("'{command}' exited with {exit_code:?}: {stderr_tail}")]
    CommandFailed {
        /// 실행한 명령 (예: `terraform apply`)
        command: String,
        /// 종료 코드 (시그널로 종료되면 `None`)
        exit_code: Option<i32>,
        /// 표준 에러 출력의 마지막 부분
        stderr_tail: String,
        /// 재시도 가능한 에러인지 여부
        transient: bool,
    },

    /// 데드라인을 넘겨 SIGINT로 중단됨
    ///
    /// `forced`가 참이면 유예 시간 안에 끝나지 않아 강제 종료된 것이며,
    /// 상태 파일이 일부만 기록되었을 수 있습니다.
    #[error("'{command}' exceeded its deadline and was interrupted{}", forced_suffix(.forced))]
    Interrupted {
        /// 실행한 명령
        command: String,
        /// 유예 시간 안에 끝나지 않아 강제 종료했는지 여부
        forced: bool,
    },

    /// `terraform output -json` 결과를 해석할 수 없음
    #[error("failed to decode outputs: {0}")]
    OutputsInvalid(String),

    /// 작업 디렉토리 준비 실패
    #[error("workspace error at {path}: {reason}")]
    Workspace {
        /// 대상 경로
        path: String,
        /// 실패 사유
        reason: String,
    },
}

fn forced_suffix(forced: &bool) -> &'static str {
    if *forced {
        " (killed after grace period)"
    } else {
        ""
    }
}

impl Retryable for ProvisionError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::CommandFailed { transient: true, .. })
    }
}

impl ProvisionError {
    /// 실패한 명령 이름
    pub fn command(&self) -> &str {
        match self {
            Self::Spawn { command, .. }
            | Self::CommandFailed { command, .. }
            | Self::Interrupted { command, .. } => command,
            Self::OutputsInvalid(_) => "terraform output",
            Self::Workspace { .. } => "workspace",
        }
    }
}

impl From<ProvisionError> for ScenarioError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::Workspace { .. } => ScenarioError::SpecInvalid {
                reason: err.to_string(),
            },
            ProvisionError::CommandFailed {
                command,
                exit_code,
                stderr_tail,
                ..
            } => ScenarioError::ApplyFailed {
                command,
                exit_code,
                detail: stderr_tail,
            },
            other => ScenarioError::ApplyFailed {
                command: other.command().to_owned(),
                exit_code: None,
                detail: other.to_string(),
            },
        }
    }
}
