//! 라이브 상태 조회 에러 타입
//!
//! [`FetchError`]는 플랫폼 API 호출 결과를 재시도 관점에서 분류합니다.
//! 최종 일관성 때문에 apply 직후에는 `NotFound`가 나올 수 있으므로,
//! 검증기는 `NotFound`와 `Transient`를 모두 재시도 대상으로 봅니다.

use terraprobe_core::error::ScenarioError;
use terraprobe_core::retry::Retryable;

/// 플랫폼 API 조회 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// 리소스가 존재하지 않음 (HTTP 404)
    #[error("resource not found: {reference}")]
    NotFound {
        /// 조회한 리소스 주소
        reference: String,
    },

    /// 재시도 가능한 에러 (408, 429, 5xx, 연결 실패)
    #[error("transient fetch error: {reason}")]
    Transient {
        /// 실패 사유
        reason: String,
    },

    /// 재시도해도 결과가 바뀌지 않는 에러 (401, 403, 400 등)
    #[error("permanent fetch error: {reason}")]
    Permanent {
        /// 실패 사유
        reason: String,
    },

    /// 해당 플랫폼/작업을 지원하는 클라이언트가 없음
    #[error("unsupported: {operation} on {platform}")]
    Unsupported {
        /// 플랫폼 이름
        platform: String,
        /// 요청한 작업
        operation: String,
    },
}

impl FetchError {
    /// HTTP 상태 코드와 응답 본문으로부터 에러를 분류합니다.
    pub fn from_status(status: u16, reference: &str, detail: &str) -> Self {
        match status {
            404 => Self::NotFound {
                reference: reference.to_owned(),
            },
            408 | 429 | 500..=599 => Self::Transient {
                reason: format!("HTTP {status} for {reference}: {detail}"),
            },
            _ => Self::Permanent {
                reason: format!("HTTP {status} for {reference}: {detail}"),
            },
        }
    }

    /// 전송 계층 에러를 분류합니다. 연결/타임아웃 에러는 재시도 대상입니다.
    pub fn from_transport(err: &reqwest::Error, reference: &str) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Transient {
                reason: format!("{reference}: {err}"),
            }
        } else {
            Self::Permanent {
                reason: format!("{reference}: {err}"),
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl Retryable for FetchError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<FetchError> for ScenarioError {
    fn from(err: FetchError) -> Self {
        ScenarioError::VerifyTransient {
            attempts: 1,
            last_error: err.to_string(),
        }
    }
}
