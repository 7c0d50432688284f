//! 재시도 정책 -- 제한된 지수 백오프
//!
//! 일시적 에러(rate limit, 최종 일관성 지연 등)만 재시도하고,
//! 영구적 에러(검증 실패, 쿼터 부족 등)는 즉시 반환합니다.
//!
//! # 사용 예시
//! ```ignore
//! use terraprobe_core::retry::{RetryPolicy, retry_transient};
//!
//! let outputs = retry_transient(&policy, "terraform_apply", || async {
//!     provisioner.apply(&workdir, &invocation).await
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// 재시도 가능 여부를 판단할 수 있는 에러
pub trait Retryable {
    /// 일시적 에러이면 `true`
    fn is_transient(&self) -> bool;
}

/// 제한된 지수 백오프 정책
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (첫 시도 포함, 최소 1)
    pub max_attempts: u32,
    /// 첫 재시도 전 대기 시간
    pub initial_backoff: Duration,
    /// 대기 시간 상한
    pub max_backoff: Duration,
    /// 지수 배수
    pub multiplier: f64,
    /// ±50% 지터 적용 여부
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// 재시도 없이 한 번만 시도하는 정책
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// 지터 없이 고정된 간격을 쓰는 정책 (테스트용)
    pub fn fixed(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff: backoff,
            max_backoff: backoff,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// `attempt`번째 재시도(1부터) 전에 기다릴 시간 (지터 제외)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self
            .multiplier
            .max(1.0)
            .powi(i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX));
        let secs = (self.initial_backoff.as_secs_f64() * exp).min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// `attempt`번째 재시도 전 실제 대기 시간. `jitter`가 켜져 있으면 ±50%를 적용합니다.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.backoff_for(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let factor = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(base.as_secs_f64() * factor)
    }
}

/// 일시적 에러만 재시도하며 비동기 작업을 실행합니다.
///
/// 영구적 에러는 즉시 반환하고, 시도 횟수가 한도에 도달하면 마지막 에러를 반환합니다.
pub async fn retry_transient<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                error!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %e,
                    "transient failure persisted past retry ceiling"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "transient failure, retrying"
                );
                metrics::counter!(
                    crate::metrics::RETRIES_TOTAL,
                    crate::metrics::LABEL_OPERATION => operation_name.to_owned()
                )
                .increment(1);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
