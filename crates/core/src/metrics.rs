//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `terraprobe_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (passed, failed)
pub const LABEL_RESULT: &str = "result";

/// 플랫폼 레이블 키 (gcs, aks)
pub const LABEL_PLATFORM: &str = "platform";

/// 단계 레이블 키 (applying, verifying, destroying)
pub const LABEL_PHASE: &str = "phase";

/// 실패 유형 레이블 키
pub const LABEL_KIND: &str = "kind";

/// 재시도 대상 작업 레이블 키
pub const LABEL_OPERATION: &str = "operation";

// ─── 시나리오 메트릭 ───────────────────────────────────────────────

/// 완료된 시나리오 수 (counter, label: result, platform)
pub const SCENARIOS_TOTAL: &str = "terraprobe_scenarios_total";

/// 실패한 시나리오 수 (counter, label: kind)
pub const SCENARIO_FAILURES_TOTAL: &str = "terraprobe_scenario_failures_total";

/// 단계별 소요 시간 (histogram, 초, label: phase)
pub const PHASE_DURATION_SECONDS: &str = "terraprobe_phase_duration_seconds";

/// 실행 중인 시나리오 수 (gauge)
pub const SCENARIOS_RUNNING: &str = "terraprobe_scenarios_running";

// ─── 라이프사이클 / 검증 메트릭 ────────────────────────────────────

/// 일시적 에러 재시도 횟수 (counter, label: operation)
pub const RETRIES_TOTAL: &str = "terraprobe_retries_total";

/// destroy 실패 수 (counter)
pub const DESTROY_FAILURES_TOTAL: &str = "terraprobe_destroy_failures_total";

/// 라이브 상태 조회 수 (counter, label: platform, result)
pub const LIVE_FETCHES_TOTAL: &str = "terraprobe_live_fetches_total";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};

    describe_counter!(SCENARIOS_TOTAL, "Completed scenarios by verdict");
    describe_counter!(SCENARIO_FAILURES_TOTAL, "Failed scenarios by failure kind");
    describe_histogram!(
        PHASE_DURATION_SECONDS,
        Unit::Seconds,
        "Time spent in each scenario phase"
    );
    describe_gauge!(SCENARIOS_RUNNING, "Scenarios currently in flight");
    describe_counter!(RETRIES_TOTAL, "Retries of transient failures");
    describe_counter!(DESTROY_FAILURES_TOTAL, "Destroy attempts that failed");
    describe_counter!(LIVE_FETCHES_TOTAL, "Live state fetches against platform APIs");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_share_prefix() {
        for name in [
            SCENARIOS_TOTAL,
            SCENARIO_FAILURES_TOTAL,
            PHASE_DURATION_SECONDS,
            SCENARIOS_RUNNING,
            RETRIES_TOTAL,
            DESTROY_FAILURES_TOTAL,
            LIVE_FETCHES_TOTAL,
        ] {
            assert!(name.starts_with("terraprobe_"), "{name}");
        }
    }

    #[test]
    fn describe_all_without_recorder_is_noop() {
        describe_all();
    }
}
