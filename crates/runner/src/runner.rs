//! 시나리오 러너 -- 단계 상태 머신과 정리 보장
//!
//! [`ScenarioRunner::run`]은 시나리오 하나를 다음 순서로 실행합니다.
//!
//! ```text
//! Pending ──► Applying ──► Verifying ──► Destroying ──► Passed | Failed
//!    │            │             │             ▲
//!    └────────────┴─────────────┴─────────────┘  (실패 시 곧바로 정리)
//! ```
//!
//! - `Pending`: 식별자 발급, 스펙 렌더링과 검증, 작업 디렉토리 준비
//! - `Applying`: init + apply + output
//! - `Verifying`: 스펙 유도 그룹과 이름 있는 그룹(출력, 라이브 상태, 클러스터 내부), 픽스처 삽입
//! - `Destroying`: `Applying`에 도달했다면 정확히 한 번 destroy, 필요 시 부재 확인
//!
//! `Pending`부터 `Verifying`까지는 시나리오 데드라인으로 제한되며,
//! 데드라인을 넘어도 destroy는 자체 데드라인으로 실행됩니다.

use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use terraprobe_core::error::ScenarioError;
use terraprobe_core::metrics::{
    LABEL_KIND, LABEL_PHASE, LABEL_PLATFORM, LABEL_RESULT, PHASE_DURATION_SECONDS,
    SCENARIO_FAILURES_TOTAL, SCENARIOS_RUNNING, SCENARIOS_TOTAL,
};
use terraprobe_core::naming::IdentifierGenerator;
use terraprobe_core::types::{
    AssertionFailure, CleanupReport, FailureKind, GroupOutcome, Mismatch, Outputs, PhaseTracker,
    ResourceRef, ScenarioPhase, ScenarioResult, Verdict,
};
use terraprobe_lifecycle::driver::{Lease, LifecycleDriver};
use terraprobe_lifecycle::provisioner::Provisioner;
use terraprobe_verifier::client::PlatformClient;
use terraprobe_verifier::compare::{Expectation, Matcher, spec_expectations};
use terraprobe_verifier::verifier::StateVerifier;
use tokio::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};

use crate::scenario::{AssertionGroup, CheckSource, Expect, Scenario};

/// 스펙에서 유도한 검증 그룹 이름
pub const SPEC_GROUP: &str = "live-state-matches-spec";

/// 기본 시나리오 데드라인 (90분)
pub const DEFAULT_SCENARIO_DEADLINE: Duration = Duration::from_secs(90 * 60);

/// 최초 실패 기록
struct Failure {
    phase: ScenarioPhase,
    kind: FailureKind,
    message: String,
}

/// 시나리오 한 번의 실행 상태
struct RunState {
    tracker: PhaseTracker,
    phase_started: Instant,
    identifier: Option<String>,
    reference: Option<ResourceRef>,
    lease: Option<Lease>,
    applied: bool,
    expected_failure: bool,
    primary: Option<Failure>,
    groups: Vec<GroupOutcome>,
}

impl RunState {
    fn new() -> Self {
        Self {
            tracker: PhaseTracker::new(),
            phase_started: Instant::now(),
            identifier: None,
            reference: None,
            lease: None,
            applied: false,
            expected_failure: false,
            primary: None,
            groups: Vec::new(),
        }
    }

    fn advance(&mut self, next: ScenarioPhase) {
        let previous = self.tracker.current();
        if let Err(e) = self.tracker.advance(next) {
            error!(error = %e, "phase machine violation");
            return;
        }
        metrics::histogram!(PHASE_DURATION_SECONDS, LABEL_PHASE => previous.as_str())
            .record(self.phase_started.elapsed().as_secs_f64());
        self.phase_started = Instant::now();
    }

    /// 최초 실패만 기록합니다. 이후 실패는 로그로만 남깁니다.
    fn fail(&mut self, phase: ScenarioPhase, kind: FailureKind, message: String) {
        if let Some(primary) = &self.primary {
            warn!(
                phase = %phase,
                kind = %kind,
                error = %message,
                primary = %primary.message,
                "additional failure after primary error"
            );
            return;
        }
        warn!(phase = %phase, kind = %kind, error = %message, "scenario failed");
        self.primary = Some(Failure {
            phase,
            kind,
            message,
        });
    }

    fn fail_with(&mut self, phase: ScenarioPhase, err: &ScenarioError) {
        self.fail(phase, err.kind(), err.to_string());
    }
}

/// 시나리오 실행기
///
/// 여러 시나리오가 공유하는 상태는 [`IdentifierGenerator`]뿐입니다.
pub struct ScenarioRunner<P: Provisioner, C: PlatformClient> {
    driver: LifecycleDriver<P>,
    verifier: Arc<StateVerifier<C>>,
    identifiers: Arc<IdentifierGenerator>,
    scenario_deadline: Duration,
}

impl<P: Provisioner, C: PlatformClient> ScenarioRunner<P, C> {
    pub fn new(
        driver: LifecycleDriver<P>,
        verifier: StateVerifier<C>,
        identifiers: Arc<IdentifierGenerator>,
    ) -> Self {
        Self {
            driver,
            verifier: Arc::new(verifier),
            identifiers,
            scenario_deadline: DEFAULT_SCENARIO_DEADLINE,
        }
    }

    /// `Pending`~`Verifying` 전체 데드라인을 지정합니다.
    pub fn with_scenario_deadline(mut self, deadline: Duration) -> Self {
        self.scenario_deadline = deadline;
        self
    }

    pub fn identifiers(&self) -> &Arc<IdentifierGenerator> {
        &self.identifiers
    }

    /// 시나리오를 실행하고 결과를 반환합니다. 실패는 모두 결과에 담기며 에러로 반환되지 않습니다.
    pub async fn run(&self, scenario: &Scenario) -> ScenarioResult {
        let span = info_span!(
            "scenario",
            scenario = %scenario.name,
            platform = %scenario.platform,
            identifier = tracing::field::Empty,
        );
        self.run_in_span(scenario).instrument(span).await
    }

    async fn run_in_span(&self, scenario: &Scenario) -> ScenarioResult {
        let started = Instant::now();
        metrics::gauge!(SCENARIOS_RUNNING).increment(1.0);
        info!("scenario started");

        let mut state = RunState::new();
        let deadline = self.scenario_deadline;
        if tokio::time::timeout(deadline, self.execute(scenario, &mut state))
            .await
            .is_err()
        {
            let phase = state.tracker.current();
            state.fail_with(phase, &ScenarioError::Timeout { phase, after: deadline });
        }

        let cleanup = self.cleanup(scenario, &mut state).await;

        let passed = match &state.primary {
            None => true,
            Some(_) => state.expected_failure,
        };
        state.advance(if passed {
            ScenarioPhase::Passed
        } else {
            ScenarioPhase::Failed
        });

        let verdict = if passed { Verdict::Passed } else { Verdict::Failed };
        let duration = started.elapsed();
        self.record_outcome(scenario, verdict, &state, &cleanup, duration);

        let RunState {
            tracker,
            identifier,
            primary,
            groups,
            ..
        } = state;
        ScenarioResult {
            scenario: scenario.name.clone(),
            identifier,
            verdict,
            failed_phase: primary.as_ref().map(|f| f.phase),
            kind: primary.as_ref().map(|f| f.kind),
            primary_error: primary.map(|f| f.message),
            groups,
            cleanup,
            phases: tracker.into_history(),
            duration,
        }
    }

    /// `Pending` → `Applying` → `Verifying`. 실패하면 즉시 반환합니다.
    async fn execute(&self, scenario: &Scenario, state: &mut RunState) {
        // Pending
        let identifier = match self
            .identifiers
            .issue(&scenario.name_prefix(), scenario.platform)
        {
            Ok(id) => id,
            Err(e) => {
                state.fail_with(ScenarioPhase::Pending, &e.into());
                return;
            }
        };
        tracing::Span::current().record("identifier", identifier.as_str());
        state.identifier = Some(identifier.clone());

        let spec = scenario.render(&identifier);
        let validated = scenario
            .validate()
            .map_err(ScenarioError::from)
            .and_then(|()| spec.validate());
        if let Err(e) = validated {
            state.fail_with(ScenarioPhase::Pending, &e);
            return;
        }
        let reference = spec.resource_ref();
        state.reference = Some(reference.clone());

        match self.driver.prepare(&spec).await {
            Ok(lease) => state.lease = Some(lease),
            Err(e) => {
                state.fail_with(ScenarioPhase::Pending, &e);
                return;
            }
        }

        // Applying
        state.advance(ScenarioPhase::Applying);
        let applied = match &state.lease {
            Some(lease) => self.driver.apply(lease).await,
            None => return,
        };
        let provisioned = match (applied, scenario.expect) {
            (Ok(provisioned), Expect::ApplySucceeds) => provisioned,
            (Ok(_), Expect::ApplyFails) => {
                state.applied = true;
                state.fail_with(
                    ScenarioPhase::Applying,
                    &ScenarioError::VerifyMismatch {
                        mismatches: vec![Mismatch::new(
                            "apply",
                            "failure",
                            Some("success".to_owned()),
                        )],
                    },
                );
                return;
            }
            (Err(e), Expect::ApplyFails) if e.kind() == FailureKind::ApplyFailed => {
                info!(error = %e, "apply failed as expected");
                state.fail_with(ScenarioPhase::Applying, &e);
                state.expected_failure = true;
                return;
            }
            (Err(e), _) => {
                state.fail_with(ScenarioPhase::Applying, &e);
                return;
            }
        };
        state.applied = true;

        // Verifying
        state.advance(ScenarioPhase::Verifying);
        if scenario.verify_spec {
            let verifier = Arc::clone(&self.verifier);
            let job_ref = reference.clone();
            let expectations = spec_expectations(&spec);
            let outcome = run_isolated(SPEC_GROUP, async move {
                spec_group(verifier, job_ref, expectations).await
            })
            .await;
            state.groups.push(outcome);
        }

        for group in scenario.render_groups(&identifier) {
            let verifier = Arc::clone(&self.verifier);
            let job_ref = reference.clone();
            let outputs = provisioned.outputs.clone();
            let kubeconfig_output = scenario.kubeconfig_output().to_owned();
            let name = group.name.clone();
            let outcome = run_isolated(&name, async move {
                named_group(verifier, job_ref, group, outputs, &kubeconfig_output).await
            })
            .await;
            state.groups.push(outcome);
        }

        if let Some(failed) = state.groups.iter().find(|g| !g.passed) {
            let kind = failed
                .failures
                .first()
                .map_or(FailureKind::VerifyMismatch, |f| f.kind);
            let message = format!(
                "group '{}' failed: {}",
                failed.name,
                failed
                    .failures
                    .iter()
                    .map(|f| f.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            );
            state.fail(ScenarioPhase::Verifying, kind, message);
        }

        for fixture in &scenario.fixtures {
            if let Err(e) = self.verifier.seed(&reference, fixture).await {
                state.fail_with(ScenarioPhase::Verifying, &e);
                break;
            }
            info!(fixture = %fixture.describe(), "fixture seeded");
        }
    }

    /// `Destroying`: lease가 있으면 정확히 한 번 destroy합니다.
    async fn cleanup(&self, scenario: &Scenario, state: &mut RunState) -> CleanupReport {
        state.advance(ScenarioPhase::Destroying);

        let Some(lease) = state.lease.take() else {
            return CleanupReport::NotRequired;
        };
        let workdir = lease.workdir().display().to_string();

        if let Err(e) = self.driver.destroy(lease).await {
            // destroy 실패는 판정을 바꾸지 않고 정리 결과로만 보고
            return CleanupReport::DestroyFailed {
                reason: e.to_string(),
                workdir: Some(workdir),
            };
        }

        let confirm = scenario.verify_destroyed && state.applied;
        let Some(reference) = state.reference.clone().filter(|_| confirm) else {
            return CleanupReport::Destroyed {
                absence_confirmed: None,
            };
        };

        match self.verifier.confirm_absent(&reference).await {
            Ok(()) => {
                info!(reference = %reference, "resource confirmed absent after destroy");
                CleanupReport::Destroyed {
                    absence_confirmed: Some(true),
                }
            }
            Err(e) => {
                state.fail(
                    ScenarioPhase::Destroying,
                    e.kind(),
                    format!("resource still reachable after destroy: {e}"),
                );
                CleanupReport::Destroyed {
                    absence_confirmed: Some(false),
                }
            }
        }
    }

    fn record_outcome(
        &self,
        scenario: &Scenario,
        verdict: Verdict,
        state: &RunState,
        cleanup: &CleanupReport,
        duration: Duration,
    ) {
        metrics::gauge!(SCENARIOS_RUNNING).decrement(1.0);
        let result = match verdict {
            Verdict::Passed => "passed",
            Verdict::Failed => "failed",
        };
        metrics::counter!(
            SCENARIOS_TOTAL,
            LABEL_RESULT => result,
            LABEL_PLATFORM => scenario.platform.as_str()
        )
        .increment(1);

        match (&state.primary, verdict) {
            (Some(failure), Verdict::Failed) => {
                metrics::counter!(SCENARIO_FAILURES_TOTAL, LABEL_KIND => failure.kind.as_str())
                    .increment(1);
                warn!(
                    failed_phase = %failure.phase,
                    kind = %failure.kind,
                    cleanup_ok = cleanup.succeeded(),
                    duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                    "scenario finished: failed"
                );
            }
            _ => info!(
                cleanup_ok = cleanup.succeeded(),
                duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                "scenario finished: passed"
            ),
        }
    }
}

/// 검증 그룹을 별도 태스크에서 실행합니다. panic은 `Fault` 실패로 바뀝니다.
async fn run_isolated<F>(name: &str, job: F) -> GroupOutcome
where
    F: Future<Output = GroupOutcome> + Send + 'static,
{
    struct AbortOnDrop(tokio::task::AbortHandle);
    impl Drop for AbortOnDrop {
        fn drop(&mut self) {
            self.0.abort();
        }
    }

    let handle = tokio::spawn(job);
    let _guard = AbortOnDrop(handle.abort_handle());
    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            let message = if e.is_panic() {
                format!("assertion group panicked: {}", panic_message(e.into_panic()))
            } else {
                "assertion group task was cancelled".to_owned()
            };
            error!(group = name, error = %message, "assertion group fault");
            GroupOutcome::from_failures(
                name,
                vec![AssertionFailure {
                    check: "group".to_owned(),
                    message,
                    kind: FailureKind::Fault,
                    mismatch: None,
                }],
            )
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

async fn spec_group<C: PlatformClient>(
    verifier: Arc<StateVerifier<C>>,
    reference: ResourceRef,
    expectations: Vec<Expectation>,
) -> GroupOutcome {
    let failures = match verifier.verify(&reference, &expectations).await {
        Ok(_) => Vec::new(),
        Err(e) => verify_failures(CheckSource::Live, e),
    };
    GroupOutcome::from_failures(SPEC_GROUP, failures)
}

async fn named_group<C: PlatformClient>(
    verifier: Arc<StateVerifier<C>>,
    reference: ResourceRef,
    group: AssertionGroup,
    outputs: Outputs,
    kubeconfig_output: &str,
) -> GroupOutcome {
    let platform = reference.platform;
    let mut failures = Vec::new();

    for check in group.checks.iter().filter(|c| c.source == CheckSource::Output) {
        let actual = outputs.lookup(&check.field);
        let expectation = Expectation::new(check.field.clone(), check.expect.clone());
        if let Some(mismatch) = expectation.check(platform, actual.as_deref()) {
            failures.push(AssertionFailure {
                check: check.label(),
                message: format!("output {mismatch}"),
                kind: FailureKind::VerifyMismatch,
                mismatch: Some(mismatch),
            });
        }
    }

    let live: Vec<Expectation> = group
        .checks
        .iter()
        .filter(|c| c.source == CheckSource::Live)
        .map(|c| Expectation::new(c.field.clone(), c.expect.clone()))
        .collect();
    if !live.is_empty() {
        if let Err(e) = verifier.verify(&reference, &live).await {
            failures.extend(verify_failures(CheckSource::Live, e));
        }
    }

    let mut by_namespace: BTreeMap<&str, Vec<Expectation>> = BTreeMap::new();
    for check in &group.checks {
        if let Some(namespace) = check.namespace() {
            by_namespace
                .entry(namespace)
                .or_default()
                .push(Expectation::new(check.field.clone(), check.expect.clone()));
        }
    }
    if !by_namespace.is_empty() {
        match outputs.lookup(kubeconfig_output) {
            Some(kubeconfig) => {
                for (namespace, expectations) in &by_namespace {
                    if let Err(e) = verifier
                        .verify_cluster(&reference, &kubeconfig, namespace, expectations)
                        .await
                    {
                        failures.extend(verify_failures(CheckSource::Cluster, e));
                    }
                }
            }
            None => {
                let mismatch = Mismatch::new(kubeconfig_output, Matcher::Present.describe(), None);
                failures.push(AssertionFailure {
                    check: format!("{}:{kubeconfig_output}", CheckSource::Output),
                    message: format!("cluster checks need output {mismatch}"),
                    kind: FailureKind::VerifyMismatch,
                    mismatch: Some(mismatch),
                });
            }
        }
    }

    GroupOutcome::from_failures(group.name, failures)
}

/// 검증 에러를 필드별 실패로 펼칩니다. 불일치가 아니면 실패 하나가 됩니다.
fn verify_failures(source: CheckSource, err: ScenarioError) -> Vec<AssertionFailure> {
    match err {
        ScenarioError::VerifyMismatch { mismatches } => mismatches
            .into_iter()
            .map(|m| AssertionFailure {
                check: format!("{source}:{}", m.field),
                message: m.to_string(),
                kind: FailureKind::VerifyMismatch,
                mismatch: Some(m),
            })
            .collect(),
        other => vec![AssertionFailure {
            check: source.to_string(),
            message: other.to_string(),
            kind: other.kind(),
            mismatch: None,
        }],
    }
}
