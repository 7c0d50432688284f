//! 도메인 타입 -- 리소스 스펙, 프로비저닝 결과, 라이브 상태, 시나리오 결과
//!
//! 모든 타입은 `Serialize`/`Deserialize`를 구현하여 리포트 출력과
//! 시나리오 파일 로딩에 그대로 사용됩니다.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ScenarioError;

/// 대상 클라우드 플랫폼
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Google Cloud Storage 버킷
    Gcs,
    /// Azure Kubernetes Service 클러스터
    Aks,
}

impl Platform {
    /// 플랫폼 식별 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gcs => "gcs",
            Self::Aks => "aks",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gcs" => Ok(Self::Gcs),
            "aks" => Ok(Self::Aks),
            other => Err(format!("unknown platform '{other}' (expected: gcs, aks)")),
        }
    }
}

/// Terraform 변수 값
///
/// TOML/JSON 양쪽에서 자연스럽게 표현되도록 untagged로 직렬화합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpecValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<SpecValue>),
    Map(BTreeMap<String, SpecValue>),
}

impl SpecValue {
    /// 문자열 값이면 참조를 반환합니다.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// 불리언 값이면 반환합니다.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// 맵 값이면 참조를 반환합니다.
    pub fn as_map(&self) -> Option<&BTreeMap<String, SpecValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// 비교용 문자열 표현 (라이브 상태 속성과 같은 형식)
    pub fn render(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::List(_) | Self::Map(_) => {
                serde_json::to_string(self).unwrap_or_else(|_| String::new())
            }
        }
    }

    /// 모든 문자열 리프에 변환 함수를 적용한 복사본을 반환합니다.
    pub fn map_strings(&self, f: &impl Fn(&str) -> String) -> SpecValue {
        match self {
            Self::String(s) => Self::String(f(s)),
            Self::List(items) => Self::List(items.iter().map(|v| v.map_strings(f)).collect()),
            Self::Map(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.map_strings(f)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl From<&str> for SpecValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for SpecValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for SpecValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for SpecValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

/// 프로비저닝 도구에 전달되는 리소스 스펙
///
/// 시나리오가 시작되면 변경되지 않습니다. 필드는 생성자로만 채워지며
/// 읽기 전용 접근자만 노출합니다.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSpec {
    platform: Platform,
    identifier: String,
    module_dir: PathBuf,
    vars: BTreeMap<String, SpecValue>,
    var_files: Vec<PathBuf>,
    scope: Option<String>,
}

impl ResourceSpec {
    /// 새 리소스 스펙을 생성합니다.
    pub fn new(
        platform: Platform,
        identifier: impl Into<String>,
        module_dir: impl Into<PathBuf>,
        vars: BTreeMap<String, SpecValue>,
    ) -> Self {
        Self {
            platform,
            identifier: identifier.into(),
            module_dir: module_dir.into(),
            vars,
            var_files: Vec::new(),
            scope: None,
        }
    }

    /// 추가 변수 파일(`-var-file`)을 지정합니다.
    pub fn with_var_files(mut self, var_files: Vec<PathBuf>) -> Self {
        self.var_files = var_files;
        self
    }

    /// 리소스 범위(AKS 리소스 그룹 등)를 지정합니다.
    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    pub fn vars(&self) -> &BTreeMap<String, SpecValue> {
        &self.vars
    }

    pub fn var(&self, key: &str) -> Option<&SpecValue> {
        self.vars.get(key)
    }

    pub fn var_files(&self) -> &[PathBuf] {
        &self.var_files
    }

    /// 라이브 상태 조회 대상 주소
    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef {
            platform: self.platform,
            name: self.identifier.clone(),
            scope: self.scope.clone(),
        }
    }

    /// 스펙의 형식적 유효성을 검증합니다.
    ///
    /// apply 이전에 호출되며, 실패 시 `SpecInvalid`를 반환합니다.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.identifier.is_empty() {
            return Err(spec_invalid("identifier must not be empty"));
        }
        if self.module_dir.as_os_str().is_empty() {
            return Err(spec_invalid("module_dir must not be empty"));
        }
        for key in self.vars.keys() {
            if !is_valid_var_name(key) {
                return Err(spec_invalid(format!(
                    "variable name '{key}' is not a valid terraform identifier"
                )));
            }
        }
        for file in &self.var_files {
            if !file.is_file() {
                return Err(spec_invalid(format!(
                    "var file not found: {}",
                    file.display()
                )));
            }
        }
        if self.platform == Platform::Aks && self.scope.as_deref().is_none_or(str::is_empty) {
            return Err(spec_invalid(
                "aks resources require a resource group scope",
            ));
        }
        Ok(())
    }
}

fn spec_invalid(reason: impl Into<String>) -> ScenarioError {
    ScenarioError::SpecInvalid {
        reason: reason.into(),
    }
}

/// Terraform 식별자 규칙: 문자 또는 `_`로 시작, 이후 영숫자/`_`/`-`
fn is_valid_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// 라이브 리소스 주소
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub platform: Platform,
    /// 리소스 이름 (버킷명, 클러스터명)
    pub name: String,
    /// 상위 범위 (AKS 리소스 그룹)
    pub scope: Option<String>,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}:{}/{}", self.platform, scope, self.name),
            None => write!(f, "{}:{}", self.platform, self.name),
        }
    }
}

/// `terraform output -json`으로 얻은 선언된 출력값
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outputs(BTreeMap<String, serde_json::Value>);

impl Outputs {
    pub fn new(values: BTreeMap<String, serde_json::Value>) -> Self {
        Self(values)
    }

    /// `terraform output -json` 형식(`{"key": {"value": ..., "type": ...}}`)을 파싱합니다.
    pub fn from_terraform_json(raw: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Entry {
            value: serde_json::Value,
        }
        let entries: BTreeMap<String, Entry> = serde_json::from_str(raw)?;
        Ok(Self(
            entries.into_iter().map(|(k, e)| (k, e.value)).collect(),
        ))
    }

    /// 출력값을 문자열로 반환합니다. 문자열이 아닌 값은 JSON으로 직렬화합니다.
    pub fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).map(render_json)
    }

    /// 맵 출력값의 항목을 문자열로 반환합니다.
    pub fn get_map(&self, key: &str) -> Option<BTreeMap<String, String>> {
        self.0.get(key)?.as_object().map(|obj| {
            obj.iter()
                .map(|(k, v)| (k.clone(), render_json(v)))
                .collect()
        })
    }

    /// `a.b` 형식의 경로로 맵 출력값 내부를 조회합니다.
    pub fn lookup(&self, path: &str) -> Option<String> {
        match path.split_once('.') {
            Some((key, rest)) => self.get_map(key)?.get(rest).cloned(),
            None => self.get(path),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn render_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// apply 성공 후의 프로비저닝된 리소스 핸들
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedResource {
    pub identifier: String,
    pub workdir: PathBuf,
    pub outputs: Outputs,
}

/// 플랫폼 API에서 직접 읽은 리소스 속성 스냅샷
///
/// 속성 키는 점(`.`)으로 구분된 경로입니다 (예: `website.main_page_suffix`,
/// `node_pools.0.vm_size`). `BTreeMap`이므로 동일한 조회 결과는 항상 같은 값으로 비교됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveState {
    pub reference: ResourceRef,
    pub attributes: BTreeMap<String, String>,
}

impl LiveState {
    pub fn new(reference: ResourceRef) -> Self {
        Self {
            reference,
            attributes: BTreeMap::new(),
        }
    }

    /// 속성을 추가합니다 (빌더 형태).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// 시나리오 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioPhase {
    Pending,
    Applying,
    Verifying,
    Destroying,
    Passed,
    Failed,
}

impl ScenarioPhase {
    /// 허용된 전이인지 확인합니다.
    ///
    /// 어느 단계에서 실패하든 정리를 위해 `Destroying`을 거쳐야 하며,
    /// `Passed`/`Failed`는 종료 상태입니다.
    pub fn can_transition_to(self, next: ScenarioPhase) -> bool {
        use ScenarioPhase::*;
        matches!(
            (self, next),
            (Pending, Applying)
                | (Pending, Destroying)
                | (Applying, Verifying)
                | (Applying, Destroying)
                | (Verifying, Destroying)
                | (Destroying, Passed)
                | (Destroying, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applying => "applying",
            Self::Verifying => "verifying",
            Self::Destroying => "destroying",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ScenarioPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 시나리오 하나의 상태 전이 기록
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    current: ScenarioPhase,
    history: Vec<ScenarioPhase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: ScenarioPhase::Pending,
            history: vec![ScenarioPhase::Pending],
        }
    }

    pub fn current(&self) -> ScenarioPhase {
        self.current
    }

    /// 다음 상태로 전이합니다. 허용되지 않은 전이는 에러 문자열을 반환합니다.
    pub fn advance(&mut self, next: ScenarioPhase) -> Result<(), String> {
        if !self.current.can_transition_to(next) {
            return Err(format!(
                "illegal phase transition {} -> {}",
                self.current, next
            ));
        }
        self.current = next;
        self.history.push(next);
        Ok(())
    }

    /// 해당 단계에 도달한 적이 있는지 여부
    pub fn reached(&self, phase: ScenarioPhase) -> bool {
        self.history.contains(&phase)
    }

    pub fn history(&self) -> &[ScenarioPhase] {
        &self.history
    }

    pub fn into_history(self) -> Vec<ScenarioPhase> {
        self.history
    }
}

/// 실패 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SpecInvalid,
    ApplyFailed,
    VerifyMismatch,
    VerifyTransient,
    DestroyFailed,
    Timeout,
    Fault,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpecInvalid => "spec_invalid",
            Self::ApplyFailed => "apply_failed",
            Self::VerifyMismatch => "verify_mismatch",
            Self::VerifyTransient => "verify_transient",
            Self::DestroyFailed => "destroy_failed",
            Self::Timeout => "timeout",
            Self::Fault => "fault",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 기대값과 실제값의 불일치
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub field: String,
    pub expected: String,
    /// 속성이 없으면 `None`
    pub actual: Option<String>,
}

impl Mismatch {
    pub fn new(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: Option<String>,
    ) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            actual,
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, got {}",
            self.field,
            self.expected,
            self.actual.as_deref().unwrap_or("<absent>")
        )
    }
}

/// 개별 검증 실패
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionFailure {
    /// 검증 항목 설명 (예: `live:location`)
    pub check: String,
    pub message: String,
    pub kind: FailureKind,
    pub mismatch: Option<Mismatch>,
}

/// 검증 그룹 하나의 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupOutcome {
    pub name: String,
    pub passed: bool,
    pub failures: Vec<AssertionFailure>,
}

impl GroupOutcome {
    pub fn from_failures(name: impl Into<String>, failures: Vec<AssertionFailure>) -> Self {
        Self {
            name: name.into(),
            passed: failures.is_empty(),
            failures,
        }
    }
}

/// 정리 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupReport {
    /// destroy 성공
    Destroyed {
        /// destroy 이후 부재 확인 결과 (요청하지 않았으면 `None`)
        absence_confirmed: Option<bool>,
    },
    /// destroy 실패 -- 시나리오 판정은 바꾸지 않고 별도로 보고
    DestroyFailed { reason: String, workdir: Option<String> },
    /// apply 단계에 도달하지 않아 정리할 리소스가 없음
    NotRequired,
}

impl CleanupReport {
    pub fn succeeded(&self) -> bool {
        !matches!(self, Self::DestroyFailed { .. })
    }
}

/// 시나리오 최종 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Passed,
    Failed,
}

/// 시나리오 실행 결과 -- 생성 이후 변경되지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario: String,
    pub identifier: Option<String>,
    pub verdict: Verdict,
    /// 최초 실패가 발생한 단계
    pub failed_phase: Option<ScenarioPhase>,
    /// 최초 실패의 유형
    pub kind: Option<FailureKind>,
    pub primary_error: Option<String>,
    pub groups: Vec<GroupOutcome>,
    pub cleanup: CleanupReport,
    pub phases: Vec<ScenarioPhase>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl ScenarioResult {
    pub fn is_passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }

    /// 모든 그룹의 불일치 목록
    pub fn mismatches(&self) -> Vec<&Mismatch> {
        self.groups
            .iter()
            .flat_map(|g| g.failures.iter())
            .filter_map(|f| f.mismatch.as_ref())
            .collect()
    }

    /// 검증 단계가 실행되었는지 여부
    pub fn verification_ran(&self) -> bool {
        self.phases.contains(&ScenarioPhase::Verifying)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
