//! 스위트 -- 여러 시나리오의 제한된 병렬 실행

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use terraprobe_core::types::{CleanupReport, FailureKind, ScenarioResult, Verdict};
use terraprobe_lifecycle::provisioner::Provisioner;
use terraprobe_verifier::client::PlatformClient;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info};

use crate::runner::ScenarioRunner;
use crate::scenario::Scenario;

/// 스위트 실행 결과
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    /// 입력 순서와 같은 순서의 시나리오 결과
    pub results: Vec<ScenarioResult>,
    pub passed: usize,
    pub failed: usize,
    /// destroy에 실패한 시나리오 수 (판정과 별개)
    pub cleanup_failures: usize,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

impl SuiteReport {
    pub fn from_results(results: Vec<ScenarioResult>, duration: Duration) -> Self {
        let passed = results.iter().filter(|r| r.is_passed()).count();
        let cleanup_failures = results.iter().filter(|r| !r.cleanup.succeeded()).count();
        Self {
            failed: results.len() - passed,
            passed,
            cleanup_failures,
            results,
            duration,
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// 모든 시나리오가 통과했는지 여부
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// 통과했고 정리도 모두 성공했는지 여부
    pub fn is_clean(&self) -> bool {
        self.all_passed() && self.cleanup_failures == 0
    }
}

/// 시나리오 묶음 실행기
///
/// `max_concurrent`개까지 동시에 실행하며, 시나리오 사이에 취소를 전파하지 않습니다.
pub struct Suite<P: Provisioner, C: PlatformClient> {
    runner: Arc<ScenarioRunner<P, C>>,
    max_concurrent: usize,
}

impl<P: Provisioner, C: PlatformClient> Suite<P, C> {
    pub fn new(runner: Arc<ScenarioRunner<P, C>>, max_concurrent: usize) -> Self {
        Self {
            runner,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// 모든 시나리오를 실행하고 결과를 모읍니다.
    pub async fn run(&self, scenarios: Vec<Scenario>) -> SuiteReport {
        let started = Instant::now();
        let total = scenarios.len();
        info!(scenarios = total, max_concurrent = self.max_concurrent, "suite started");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        let names: Vec<String> = scenarios.iter().map(|s| s.name.clone()).collect();

        for (index, scenario) in scenarios.into_iter().enumerate() {
            let runner = Arc::clone(&self.runner);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                // 세마포어는 닫지 않으므로 acquire는 실패하지 않음
                let _permit = semaphore.acquire_owned().await.ok();
                (index, runner.run(&scenario).await)
            });
        }

        let mut slots: Vec<Option<ScenarioResult>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!(error = %e, "scenario task aborted"),
            }
        }

        let results: Vec<ScenarioResult> = slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| slot.unwrap_or_else(|| aborted(name)))
            .collect();

        let report = SuiteReport::from_results(results, started.elapsed());
        info!(
            passed = report.passed,
            failed = report.failed,
            cleanup_failures = report.cleanup_failures,
            "suite finished"
        );
        report
    }
}

/// 러너 태스크 자체가 중단된 시나리오의 결과
fn aborted(name: String) -> ScenarioResult {
    ScenarioResult {
        scenario: name,
        identifier: None,
        verdict: Verdict::Failed,
        failed_phase: None,
        kind: Some(FailureKind::Fault),
        primary_error: Some("scenario task aborted before producing a result".to_owned()),
        groups: Vec::new(),
        cleanup: CleanupReport::DestroyFailed {
            reason: "cleanup state unknown".to_owned(),
            workdir: None,
        },
        phases: Vec::new(),
        duration: Duration::ZERO,
    }
}
