//! 상태 검증기 -- 최종 일관성을 고려한 라이브 상태 조회와 비교
//!
//! [`StateVerifier`]는 [`PlatformClient`]를 감싸 다음을 제공합니다.
//!
//! - [`fetch`](StateVerifier::fetch): `NotFound`/`Transient`를 제한된 백오프로 재시도
//! - [`verify`](StateVerifier::verify): 불일치가 사라질 때까지 재조회 후 비교
//! - [`verify_cluster`](StateVerifier::verify_cluster): Kubernetes 네임스페이스 조회 후 비교
//! - [`confirm_absent`](StateVerifier::confirm_absent): destroy 이후 `NotFound` 확인
//!
//! 모든 호출은 검증 데드라인으로 제한되며, 초과하면 호출이 속한 단계의 `Timeout`을 반환합니다.
//! `confirm_absent`는 `Destroying`, 나머지는 `Verifying`입니다.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use terraprobe_core::error::ScenarioError;
use terraprobe_core::metrics::{LABEL_PLATFORM, LABEL_RESULT, LIVE_FETCHES_TOTAL};
use terraprobe_core::retry::RetryPolicy;
use terraprobe_core::types::{LiveState, Mismatch, ResourceRef, ScenarioPhase};
use tracing::{debug, warn};

use crate::client::{Fixture, PlatformClient};
use crate::compare::{Expectation, compare};
use crate::error::FetchError;

/// 재시도 루프 한 회차의 결과
enum Attempt<T> {
    Done(T),
    Retry(String),
    Fail(ScenarioError),
}

/// 라이브 상태 검증기
pub struct StateVerifier<C: PlatformClient> {
    client: Arc<C>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl<C: PlatformClient> StateVerifier<C> {
    /// 새 검증기를 생성합니다.
    ///
    /// `policy`는 최종 일관성 재시도 한도, `timeout`은 호출당 데드라인입니다.
    pub fn new(client: Arc<C>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            client,
            policy,
            timeout,
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// 라이브 상태를 조회합니다.
    ///
    /// `NotFound`와 `Transient`는 재시도하고, 한도를 넘으면 `VerifyTransient`를 반환합니다.
    /// `Permanent`/`Unsupported`는 즉시 실패합니다.
    pub async fn fetch(&self, reference: &ResourceRef) -> Result<LiveState, ScenarioError> {
        self.bounded(
            ScenarioPhase::Verifying,
            self.retry_loop("fetch", reference, |result| match result {
                Ok(state) => Attempt::Done(state),
                Err(e) if e.is_not_found() || matches!(e, FetchError::Transient { .. }) => {
                    Attempt::Retry(e.to_string())
                }
                Err(e) => Attempt::Fail(e.into()),
            }),
        )
        .await
    }

    /// 라이브 상태를 조회하여 기대값과 비교합니다.
    ///
    /// 불일치가 있으면 상태가 아직 수렴하지 않은 것으로 보고 재조회합니다.
    /// 한도까지 불일치가 남으면 모든 필드의 기대값/실제값을 담은 `VerifyMismatch`를 반환합니다.
    pub async fn verify(
        &self,
        reference: &ResourceRef,
        expectations: &[Expectation],
    ) -> Result<LiveState, ScenarioError> {
        self.converge(
            "verify",
            reference,
            || async move {
                let result = self.client.fetch(reference).await;
                record_fetch(reference, &result);
                result
            },
            expectations,
        )
        .await
    }

    /// 클러스터의 `namespace`를 `kubeconfig`로 조회하여 기대값과 비교합니다.
    ///
    /// 시스템 파드는 apply 직후 아직 뜨지 않았을 수 있으므로 [`verify`](Self::verify)와
    /// 같은 방식으로 재조회합니다.
    pub async fn verify_cluster(
        &self,
        reference: &ResourceRef,
        kubeconfig: &str,
        namespace: &str,
        expectations: &[Expectation],
    ) -> Result<LiveState, ScenarioError> {
        self.converge(
            "verify_cluster",
            reference,
            || self.client.inspect_cluster(reference, kubeconfig, namespace),
            expectations,
        )
        .await
    }

    async fn converge<F, Fut>(
        &self,
        operation: &str,
        reference: &ResourceRef,
        call: F,
        expectations: &[Expectation],
    ) -> Result<LiveState, ScenarioError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<LiveState, FetchError>>,
    {
        let platform = reference.platform;
        let mut last_mismatches: Option<Vec<Mismatch>> = None;

        let outcome = self
            .bounded(
                ScenarioPhase::Verifying,
                self.retry_loop_with(operation, reference, call, |result| match result {
                    Ok(state) => {
                        let mismatches = compare(platform, &state, expectations);
                        if mismatches.is_empty() {
                            return Attempt::Done(state);
                        }
                        let summary = format!("{} field(s) differ", mismatches.len());
                        last_mismatches = Some(mismatches);
                        Attempt::Retry(summary)
                    }
                    Err(e) if e.is_not_found() || matches!(e, FetchError::Transient { .. }) => {
                        last_mismatches = None;
                        Attempt::Retry(e.to_string())
                    }
                    Err(e) => Attempt::Fail(e.into()),
                }),
            )
            .await;

        match (outcome, last_mismatches) {
            (Err(ScenarioError::VerifyTransient { .. }), Some(mismatches)) => {
                Err(ScenarioError::VerifyMismatch { mismatches })
            }
            (outcome, _) => outcome,
        }
    }

    /// destroy 이후 리소스가 사라졌는지 확인합니다.
    ///
    /// 조회가 `NotFound`를 반환할 때까지 재시도합니다. 한도까지 리소스가 남아 있으면
    /// `exists` 필드의 `VerifyMismatch`를 반환합니다.
    pub async fn confirm_absent(&self, reference: &ResourceRef) -> Result<(), ScenarioError> {
        let mut still_present = false;

        let outcome = self
            .bounded(
                ScenarioPhase::Destroying,
                self.retry_loop("confirm_absent", reference, |result| match result {
                    Err(e) if e.is_not_found() => Attempt::Done(()),
                    Ok(_) => {
                        still_present = true;
                        Attempt::Retry("resource still exists".to_owned())
                    }
                    Err(e @ FetchError::Transient { .. }) => {
                        still_present = false;
                        Attempt::Retry(e.to_string())
                    }
                    Err(e) => Attempt::Fail(e.into()),
                }),
            )
            .await;

        match (outcome, still_present) {
            (Err(ScenarioError::VerifyTransient { .. }), true) => Err(ScenarioError::VerifyMismatch {
                mismatches: vec![Mismatch::new("exists", "false", Some("true".to_owned()))],
            }),
            (outcome, _) => outcome,
        }
    }

    /// 리소스에 픽스처 데이터를 넣습니다. 일시적 에러만 재시도합니다.
    pub async fn seed(&self, reference: &ResourceRef, fixture: &Fixture) -> Result<(), ScenarioError> {
        self.bounded(
            ScenarioPhase::Verifying,
            self.retry_loop_with(
                "seed",
                reference,
                || self.client.seed(reference, fixture),
                |result| match result {
                    Ok(()) => Attempt::Done(()),
                    Err(e @ FetchError::Transient { .. }) => Attempt::Retry(e.to_string()),
                    Err(e) => Attempt::Fail(ScenarioError::Fault {
                        reason: format!("seeding {} failed: {e}", fixture.describe()),
                    }),
                },
            ),
        )
        .await
    }

    /// `fut`을 검증 데드라인으로 제한합니다. 초과하면 `phase`의 `Timeout`을 반환합니다.
    async fn bounded<T>(
        &self,
        phase: ScenarioPhase,
        fut: impl Future<Output = Result<T, ScenarioError>>,
    ) -> Result<T, ScenarioError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_elapsed) => {
                warn!(
                    phase = %phase,
                    timeout_secs = self.timeout.as_secs(),
                    "verification deadline exceeded"
                );
                Err(ScenarioError::Timeout {
                    phase,
                    after: self.timeout,
                })
            }
        }
    }

    async fn retry_loop<T>(
        &self,
        operation: &str,
        reference: &ResourceRef,
        classify: impl FnMut(Result<LiveState, FetchError>) -> Attempt<T>,
    ) -> Result<T, ScenarioError> {
        self.retry_loop_with(
            operation,
            reference,
            || async move {
                let result = self.client.fetch(reference).await;
                record_fetch(reference, &result);
                result
            },
            classify,
        )
        .await
    }

    async fn retry_loop_with<R, T, F, Fut>(
        &self,
        operation: &str,
        reference: &ResourceRef,
        mut call: F,
        mut classify: impl FnMut(R) -> Attempt<T>,
    ) -> Result<T, ScenarioError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = R>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let last_error = match classify(call().await) {
                Attempt::Done(value) => {
                    debug!(operation, reference = %reference, attempt, "live state settled");
                    return Ok(value);
                }
                Attempt::Fail(err) => return Err(err),
                Attempt::Retry(reason) => reason,
            };

            if attempt >= max_attempts {
                warn!(
                    operation,
                    reference = %reference,
                    attempt,
                    error = %last_error,
                    "live state did not settle within retry ceiling"
                );
                return Err(ScenarioError::VerifyTransient {
                    attempts: attempt,
                    last_error,
                });
            }

            let delay = self.policy.delay_for(attempt);
            debug!(
                operation,
                reference = %reference,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                reason = %last_error,
                "live state not settled, retrying"
            );
            metrics::counter!(
                terraprobe_core::metrics::RETRIES_TOTAL,
                terraprobe_core::metrics::LABEL_OPERATION => operation.to_owned()
            )
            .increment(1);
            tokio::time::sleep(delay).await;
        }
    }
}

fn record_fetch(reference: &ResourceRef, result: &Result<LiveState, FetchError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(FetchError::NotFound { .. }) => "not_found",
        Err(FetchError::Transient { .. }) => "transient",
        Err(FetchError::Permanent { .. }) => "permanent",
        Err(FetchError::Unsupported { .. }) => "unsupported",
    };
    metrics::counter!(
        LIVE_FETCHES_TOTAL,
        LABEL_PLATFORM => reference.platform.as_str(),
        LABEL_RESULT => outcome
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::Matcher;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use terraprobe_core::types::{FailureKind, Platform};

    /// 미리 정한 응답을 순서대로 돌려주는 클라이언트. 마지막 응답은 반복됩니다.
    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<LiveState, FetchError>>>,
        calls: AtomicU32,
        namespaces: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<LiveState, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
                namespaces: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PlatformClient for ScriptedClient {
        async fn fetch(&self, _reference: &ResourceRef) -> Result<LiveState, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                responses.front().cloned().unwrap()
            }
        }

        async fn seed(&self, _reference: &ResourceRef, _fixture: &Fixture) -> Result<(), FetchError> {
            Ok(())
        }

        async fn inspect_cluster(
            &self,
            reference: &ResourceRef,
            _kubeconfig: &str,
            namespace: &str,
        ) -> Result<LiveState, FetchError> {
            self.namespaces.lock().unwrap().push(namespace.to_owned());
            self.fetch(reference).await
        }
    }

    fn reference() -> ResourceRef {
        ResourceRef {
            platform: Platform::Gcs,
            name: "tp-gcs-1a2b3c4d".to_owned(),
            scope: None,
        }
    }

    fn state(location: &str) -> LiveState {
        LiveState::new(reference())
            .with("name", "tp-gcs-1a2b3c4d")
            .with("location", location)
    }

    fn not_found() -> FetchError {
        FetchError::NotFound {
            reference: "gcs:tp-gcs-1a2b3c4d".to_owned(),
        }
    }

    fn verifier(client: Arc<ScriptedClient>) -> StateVerifier<ScriptedClient> {
        StateVerifier::new(
            client,
            RetryPolicy::fixed(4, Duration::from_secs(1)),
            Duration::from_secs(60),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_once_then_found_succeeds() {
        let client = ScriptedClient::new(vec![Err(not_found()), Ok(state("US"))]);
        let fetched = verifier(Arc::clone(&client)).fetch(&reference()).await.unwrap();
        assert_eq!(fetched.get("location"), Some("US"));
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_not_found_is_verify_transient() {
        let client = ScriptedClient::new(vec![Err(not_found())]);
        let err = verifier(Arc::clone(&client)).fetch(&reference()).await.unwrap_err();
        match err {
            ScenarioError::VerifyTransient { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_fails_without_retry() {
        let client = ScriptedClient::new(vec![Err(FetchError::Permanent {
            reason: "HTTP 403".to_owned(),
        })]);
        let err = verifier(Arc::clone(&client)).fetch(&reference()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::VerifyTransient);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn verify_retries_stale_state_until_it_converges() {
        let client = ScriptedClient::new(vec![Ok(state("US-EAST1")), Ok(state("US-WEST1"))]);
        let expectations = [Expectation::equals("location", "us-west1")];
        verifier(Arc::clone(&client))
            .verify(&reference(), &expectations)
            .await
            .unwrap();
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn verify_reports_every_mismatch() {
        let client = ScriptedClient::new(vec![Ok(state("US-EAST1"))]);
        let expectations = [
            Expectation::equals("location", "US-WEST1"),
            Expectation::equals("versioning", "true"),
        ];
        let err = verifier(client)
            .verify(&reference(), &expectations)
            .await
            .unwrap_err();
        match err {
            ScenarioError::VerifyMismatch { mismatches } => {
                assert_eq!(mismatches.len(), 2);
                assert_eq!(mismatches[0].actual.as_deref(), Some("US-EAST1"));
                assert_eq!(mismatches[1].actual, None);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn confirm_absent_waits_for_not_found() {
        let client = ScriptedClient::new(vec![Ok(state("US")), Err(not_found())]);
        verifier(Arc::clone(&client))
            .confirm_absent(&reference())
            .await
            .unwrap();
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn confirm_absent_reports_lingering_resource() {
        let client = ScriptedClient::new(vec![Ok(state("US"))]);
        let err = verifier(client).confirm_absent(&reference()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::VerifyMismatch);
    }

    #[tokio::test(start_paused = true)]
    async fn confirm_absent_timeout_is_a_destroying_timeout() {
        let client = ScriptedClient::new(vec![Ok(state("US"))]);
        let verifier = StateVerifier::new(
            client,
            RetryPolicy::fixed(100, Duration::from_secs(10)),
            Duration::from_secs(30),
        );
        let err = verifier.confirm_absent(&reference()).await.unwrap_err();
        assert!(matches!(
            err,
            ScenarioError::Timeout {
                phase: ScenarioPhase::Destroying,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_sleeps_are_jittered() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(10),
            multiplier: 1.0,
            jitter: true,
        };
        let mut waited = Vec::new();
        for _ in 0..8 {
            let client = ScriptedClient::new(vec![Err(not_found())]);
            let verifier = StateVerifier::new(client, policy.clone(), Duration::from_secs(600));
            let started = tokio::time::Instant::now();
            verifier.fetch(&reference()).await.unwrap_err();
            waited.push(started.elapsed());
        }
        // Two sleeps of 10s, each scaled into [5s, 15s).
        for elapsed in &waited {
            assert!(*elapsed >= Duration::from_secs(10), "{elapsed:?}");
            assert!(*elapsed < Duration::from_secs(30), "{elapsed:?}");
        }
        assert!(waited.iter().any(|e| *e != Duration::from_secs(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn verify_cluster_waits_for_system_pods() {
        let pods = |running: &str| {
            LiveState::new(reference())
                .with("kube-system/pods.count", "2")
                .with("kube-system/pods.running", running)
        };
        let client = ScriptedClient::new(vec![
            Ok(pods("kube-proxy-x2k9z")),
            Ok(pods("coredns-7d8f9c-abcde,kube-proxy-x2k9z")),
        ]);
        let expectations = [Expectation::new(
            "kube-system/pods.running",
            Matcher::Contains("coredns".to_owned()),
        )];

        verifier(Arc::clone(&client))
            .verify_cluster(&reference(), "apiVersion: v1", "kube-system", &expectations)
            .await
            .unwrap();
        assert_eq!(client.calls(), 2);
        assert_eq!(*client.namespaces.lock().unwrap(), ["kube-system", "kube-system"]);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_the_retry_loop() {
        let client = ScriptedClient::new(vec![Err(not_found())]);
        let verifier = StateVerifier::new(
            client,
            RetryPolicy::fixed(100, Duration::from_secs(10)),
            Duration::from_secs(30),
        );
        let err = verifier.fetch(&reference()).await.unwrap_err();
        assert!(matches!(
            err,
            ScenarioError::Timeout {
                phase: ScenarioPhase::Verifying,
                ..
            }
        ));
    }
}
