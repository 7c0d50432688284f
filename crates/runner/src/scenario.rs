//! 시나리오 정의 -- 선언적 시나리오 서술자와 템플릿 치환
//!
//! 시나리오 파일은 `[[scenario]]` 테이블의 목록입니다.
//!
//! ```toml
//! [[scenario]]
//! name = "versioning"
//! platform = "gcs"
//! module_dir = "modules/gcs-bucket"
//!
//! [scenario.vars]
//! location = "US-WEST1"
//! versioning = { enabled = true }
//!
//! [[scenario.group]]
//! name = "outputs"
//!
//! [[scenario.group.check]]
//! source = "output"
//! field = "bucket_url"
//! expect = { equals = "gs://${id}" }
//! ```
//!
//! 문자열 값에는 `${id}`(생성된 식별자)와 `${var.KEY}`(다른 변수 값)를 쓸 수 있습니다.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use terraprobe_core::error::ScenarioError;
use terraprobe_core::types::{Platform, ResourceSpec, SpecValue};
use terraprobe_verifier::client::Fixture;
use terraprobe_verifier::compare::Matcher;

use crate::error::RunnerError;

/// apply 결과에 대한 기대
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expect {
    /// apply가 성공하고 검증을 통과해야 함
    #[default]
    ApplySucceeds,
    /// apply가 `ApplyFailed`로 실패해야 함 (검증은 실행하지 않음)
    ApplyFails,
}

/// 검증 값의 출처
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckSource {
    /// 플랫폼 API에서 읽은 라이브 상태
    Live,
    /// `terraform output` 값
    Output,
    /// 클러스터 내부 Kubernetes API (`<namespace>/<attr>` 형식)
    Cluster,
}

impl fmt::Display for CheckSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => f.write_str("live"),
            Self::Output => f.write_str("output"),
            Self::Cluster => f.write_str("cluster"),
        }
    }
}

/// 개별 검증 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Check {
    pub source: CheckSource,
    /// 속성 경로 (라이브 상태) 또는 출력 이름 (`map.key` 형식 허용)
    pub field: String,
    pub expect: Matcher,
}

impl Check {
    pub fn live(field: impl Into<String>, expect: Matcher) -> Self {
        Self {
            source: CheckSource::Live,
            field: field.into(),
            expect,
        }
    }

    pub fn output(field: impl Into<String>, expect: Matcher) -> Self {
        Self {
            source: CheckSource::Output,
            field: field.into(),
            expect,
        }
    }

    /// `kube-system/pods.running`처럼 네임스페이스를 앞에 둔 필드
    pub fn cluster(field: impl Into<String>, expect: Matcher) -> Self {
        Self {
            source: CheckSource::Cluster,
            field: field.into(),
            expect,
        }
    }

    /// 클러스터 검증의 네임스페이스
    pub fn namespace(&self) -> Option<&str> {
        match self.source {
            CheckSource::Cluster => self
                .field
                .split_once('/')
                .map(|(ns, _)| ns)
                .filter(|ns| !ns.is_empty()),
            CheckSource::Live | CheckSource::Output => None,
        }
    }

    /// 보고용 라벨 (예: `live:versioning`)
    pub fn label(&self) -> String {
        format!("{}:{}", self.source, self.field)
    }
}

/// 이름이 붙은 검증 묶음. 그룹마다 결과를 따로 보고합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssertionGroup {
    pub name: String,
    #[serde(default, rename = "check")]
    pub checks: Vec<Check>,
}

impl AssertionGroup {
    pub fn new(name: impl Into<String>, checks: Vec<Check>) -> Self {
        Self {
            name: name.into(),
            checks,
        }
    }

    /// 모든 기대값의 템플릿을 치환한 복사본을 반환합니다.
    pub fn render(&self, template: &Template<'_>) -> Self {
        Self {
            name: self.name.clone(),
            checks: self
                .checks
                .iter()
                .map(|c| Check {
                    expect: c.expect.map_strings(|s| template.expand(s)),
                    ..c.clone()
                })
                .collect(),
        }
    }
}

/// 선언적 시나리오 서술자
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,
    pub platform: Platform,
    /// Terraform 모듈 디렉토리
    pub module_dir: PathBuf,
    /// 식별자 접두사 (기본값 `tp-{platform}`)
    #[serde(default)]
    pub name_prefix: Option<String>,
    /// 식별자를 전달할 변수 이름 (기본값: GCS `bucket_name`, AKS `cluster_name`)
    #[serde(default)]
    pub identifier_var: Option<String>,
    /// 리소스 범위를 담은 변수 이름 (기본값: AKS `resource_group_name`)
    #[serde(default)]
    pub scope_var: Option<String>,
    /// 클러스터 검증에 쓸 kubeconfig 출력 이름 (기본값 `kube_config`)
    #[serde(default)]
    pub kubeconfig_output: Option<String>,
    #[serde(default)]
    pub vars: BTreeMap<String, SpecValue>,
    /// 추가 변수 파일. 상대 경로는 `module_dir` 기준입니다.
    #[serde(default)]
    pub var_files: Vec<PathBuf>,
    /// 스펙에서 유도한 기대값 그룹(`live-state-matches-spec`) 실행 여부
    #[serde(default = "default_true")]
    pub verify_spec: bool,
    /// destroy 이후 리소스 부재 확인 여부
    #[serde(default)]
    pub verify_destroyed: bool,
    #[serde(default)]
    pub expect: Expect,
    /// 검증 후 destroy 전에 넣을 데이터
    #[serde(default)]
    pub fixtures: Vec<Fixture>,
    #[serde(default, rename = "group")]
    pub groups: Vec<AssertionGroup>,
}

fn default_true() -> bool {
    true
}

impl Scenario {
    /// 기본값으로 채운 최소 시나리오를 생성합니다.
    pub fn new(name: impl Into<String>, platform: Platform, module_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            platform,
            module_dir: module_dir.into(),
            name_prefix: None,
            identifier_var: None,
            scope_var: None,
            kubeconfig_output: None,
            vars: BTreeMap::new(),
            var_files: Vec::new(),
            verify_spec: true,
            verify_destroyed: false,
            expect: Expect::ApplySucceeds,
            fixtures: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<SpecValue>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_group(mut self, group: AssertionGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn with_fixture(mut self, fixture: Fixture) -> Self {
        self.fixtures.push(fixture);
        self
    }

    pub fn expecting(mut self, expect: Expect) -> Self {
        self.expect = expect;
        self
    }

    pub fn verify_destroyed(mut self, enabled: bool) -> Self {
        self.verify_destroyed = enabled;
        self
    }

    pub fn verify_spec(mut self, enabled: bool) -> Self {
        self.verify_spec = enabled;
        self
    }

    pub fn name_prefix(&self) -> String {
        self.name_prefix
            .clone()
            .unwrap_or_else(|| format!("tp-{}", self.platform))
    }

    pub fn identifier_var(&self) -> &str {
        self.identifier_var
            .as_deref()
            .unwrap_or(match self.platform {
                Platform::Gcs => "bucket_name",
                Platform::Aks => "cluster_name",
            })
    }

    pub fn scope_var(&self) -> Option<&str> {
        match (&self.scope_var, self.platform) {
            (Some(var), _) => Some(var),
            (None, Platform::Aks) => Some("resource_group_name"),
            (None, Platform::Gcs) => None,
        }
    }

    pub fn kubeconfig_output(&self) -> &str {
        self.kubeconfig_output.as_deref().unwrap_or("kube_config")
    }

    /// 시나리오 정의의 정적 유효성을 검사합니다.
    ///
    /// 모든 `${...}` 참조가 해석 가능한지, 그룹 이름이 중복되지 않는지 확인합니다.
    pub fn validate(&self) -> Result<(), RunnerError> {
        let invalid = |reason: String| RunnerError::InvalidScenario {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty".to_owned()));
        }
        if self.vars.contains_key(self.identifier_var()) {
            return Err(invalid(format!(
                "'{}' is set by the harness and must not appear in vars",
                self.identifier_var()
            )));
        }

        let template = Template::new("", &self.vars);
        let mut strings = Vec::new();
        for value in self.vars.values() {
            collect_strings(value, &mut strings);
        }
        for check in self.groups.iter().flat_map(|g| g.checks.iter()) {
            check.expect.map_strings(|s| {
                strings.push(s.to_owned());
                String::new()
            });
        }
        let unresolved: Vec<String> = strings.iter().flat_map(|s| template.unresolved(s)).collect();
        if let Some(reference) = unresolved.first() {
            return Err(invalid(format!("unresolved template reference '{reference}'")));
        }

        for check in self.groups.iter().flat_map(|g| g.checks.iter()) {
            if check.source == CheckSource::Cluster
                && (check.namespace().is_none() || check.field.ends_with('/'))
            {
                return Err(invalid(format!(
                    "cluster check '{}' must be written as <namespace>/<attribute>",
                    check.field
                )));
            }
        }

        let mut seen = HashSet::new();
        for group in &self.groups {
            if group.name == crate::runner::SPEC_GROUP || !seen.insert(group.name.as_str()) {
                return Err(invalid(format!("duplicate group name '{}'", group.name)));
            }
        }
        Ok(())
    }

    /// 식별자를 적용해 프로비저닝 도구에 전달할 스펙을 만듭니다.
    ///
    /// 모듈 디렉토리와 변수 파일 경로는 절대 경로가 됩니다. 프로비저닝 도구는
    /// 복사된 작업 디렉토리에서 실행되므로 상대 경로는 그곳에서 해석되지 않습니다.
    pub fn render(&self, identifier: &str) -> ResourceSpec {
        let template = Template::new(identifier, &self.vars);
        let mut vars: BTreeMap<String, SpecValue> = self
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.map_strings(&|s| template.expand(s))))
            .collect();
        vars.insert(self.identifier_var().to_owned(), SpecValue::from(identifier));

        let scope = self
            .scope_var()
            .and_then(|var| vars.get(var))
            .and_then(SpecValue::as_str)
            .map(str::to_owned);

        let module_dir = absolute(&self.module_dir);
        let var_files = self
            .var_files
            .iter()
            .map(|f| resolve_relative(&module_dir, f))
            .collect();

        ResourceSpec::new(self.platform, identifier, module_dir, vars)
            .with_var_files(var_files)
            .with_scope(scope)
    }

    /// 템플릿을 치환한 검증 그룹 목록
    pub fn render_groups(&self, identifier: &str) -> Vec<AssertionGroup> {
        let template = Template::new(identifier, &self.vars);
        self.groups.iter().map(|g| g.render(&template)).collect()
    }
}

fn collect_strings(value: &SpecValue, out: &mut Vec<String>) {
    match value {
        SpecValue::String(s) => out.push(s.clone()),
        SpecValue::List(items) => items.iter().for_each(|v| collect_strings(v, out)),
        SpecValue::Map(map) => map.values().for_each(|v| collect_strings(v, out)),
        SpecValue::Bool(_) | SpecValue::Int(_) | SpecValue::Float(_) => {}
    }
}

fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// 현재 작업 디렉토리 기준의 절대 경로. 변환할 수 없으면 그대로 둡니다.
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// `${id}` / `${var.KEY}` 치환기
///
/// `${var.KEY}`는 KEY의 원본 값에서 `${id}`만 치환한 결과로 바뀝니다 (재귀 치환 없음).
pub struct Template<'a> {
    identifier: &'a str,
    vars: &'a BTreeMap<String, SpecValue>,
}

impl<'a> Template<'a> {
    pub fn new(identifier: &'a str, vars: &'a BTreeMap<String, SpecValue>) -> Self {
        Self { identifier, vars }
    }

    fn lookup(&self, key: &str) -> Option<String> {
        if key == "id" {
            return Some(self.identifier.to_owned());
        }
        let var = key.strip_prefix("var.")?;
        let value = self.vars.get(var)?.render();
        Some(value.replace("${id}", self.identifier))
    }

    /// 참조를 치환합니다. 해석할 수 없는 참조는 그대로 둡니다.
    pub fn expand(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let key = &after[..end];
                    match self.lookup(key) {
                        Some(value) => out.push_str(&value),
                        None => out.push_str(&rest[start..start + 2 + end + 1]),
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// 해석할 수 없는 참조 목록
    pub fn unresolved(&self, input: &str) -> Vec<String> {
        let mut missing = Vec::new();
        let mut rest = input;
        while let Some(start) = rest.find("${") {
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                missing.push(after.to_owned());
                break;
            };
            let key = &after[..end];
            if self.lookup(key).is_none() {
                missing.push(key.to_owned());
            }
            rest = &after[end + 1..];
        }
        missing
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioFile {
    #[serde(default)]
    scenario: Vec<Scenario>,
}

/// TOML 문자열에서 시나리오 목록을 파싱합니다.
///
/// `origin`은 에러 메시지에 표시할 출처이며, 상대 `module_dir`는 `base_dir` 기준으로 해석됩니다.
pub fn parse_scenarios(
    raw: &str,
    origin: &str,
    base_dir: Option<&Path>,
) -> Result<Vec<Scenario>, RunnerError> {
    let file: ScenarioFile = toml::from_str(raw).map_err(|e| RunnerError::Parse {
        path: origin.to_owned(),
        reason: e.to_string(),
    })?;

    let mut names = HashSet::new();
    let mut scenarios = file.scenario;
    for scenario in &mut scenarios {
        if !names.insert(scenario.name.clone()) {
            return Err(RunnerError::DuplicateScenario {
                name: scenario.name.clone(),
            });
        }
        if let Some(base) = base_dir {
            scenario.module_dir = resolve_relative(base, &scenario.module_dir);
        }
        scenario.validate()?;
    }
    Ok(scenarios)
}

/// 시나리오 파일을 읽어 파싱합니다. 이름이 중복되면 거부합니다.
pub async fn load_scenarios(path: &Path) -> Result<Vec<Scenario>, RunnerError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| RunnerError::Read {
            path: path.display().to_string(),
            source,
        })?;
    let base_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => absolute(parent),
        _ => std::env::current_dir().unwrap_or_default(),
    };
    parse_scenarios(&raw, &path.display().to_string(), Some(&base_dir))
}

impl From<RunnerError> for ScenarioError {
    fn from(err: RunnerError) -> Self {
        ScenarioError::SpecInvalid {
            reason: err.to_string(),
        }
    }
}
