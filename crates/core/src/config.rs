//! 설정 관리 -- terraprobe.toml 파싱 및 런타임 설정
//!
//! [`HarnessConfig`]는 하네스 전체 설정을 담는 최상위 구조체입니다.
//! 프로세스 시작 시 한 번 로드되어 참조로 전달되며, 실행 도중 다시 읽지 않습니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`TERRAPROBE_TERRAFORM_BINARY=/usr/local/bin/terraform` 형식)
//! 3. 설정 파일 (`terraprobe.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), terraprobe_core::error::HarnessError> {
//! use terraprobe_core::config::HarnessConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = HarnessConfig::load("terraprobe.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = HarnessConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, HarnessError};
use crate::retry::RetryPolicy;

/// 설정 상한값 상수
const MAX_TIMEOUT_SECS: u64 = 4 * 60 * 60;
const MAX_RETRY_ATTEMPTS: u32 = 20;
const MAX_BACKOFF_MS: u64 = 10 * 60 * 1000;
const MAX_CONCURRENT_SCENARIOS: usize = 64;
const MAX_INTERRUPT_GRACE_SECS: u64 = 30 * 60;

/// terraprobe 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Terraform 실행 설정
    #[serde(default)]
    pub terraform: TerraformConfig,
    /// apply/destroy 재시도 설정
    #[serde(default)]
    pub retry: RetryConfig,
    /// 라이브 상태 검증 설정
    #[serde(default)]
    pub verify: VerifyConfig,
    /// 시나리오 러너 설정
    #[serde(default)]
    pub runner: RunnerConfig,
    /// GCP 설정
    #[serde(default)]
    pub gcp: GcpConfig,
    /// Azure 설정
    #[serde(default)]
    pub azure: AzureConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl HarnessConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 설정 파일이 없으면 기본값에 환경변수만 적용합니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        match Self::load(path.as_ref()).await {
            Err(HarnessError::Config(ConfigError::FileNotFound { path })) => {
                tracing::debug!(path = %path, "config file not found, using defaults");
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
            other => other,
        }
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HarnessError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                HarnessError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, HarnessError> {
        toml::from_str(toml_str).map_err(|e| {
            HarnessError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `TERRAPROBE_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "TERRAPROBE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "TERRAPROBE_GENERAL_LOG_FORMAT");

        // Terraform
        override_string(&mut self.terraform.binary, "TERRAPROBE_TERRAFORM_BINARY");
        override_u64(
            &mut self.terraform.apply_timeout_secs,
            "TERRAPROBE_TERRAFORM_APPLY_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.terraform.destroy_timeout_secs,
            "TERRAPROBE_TERRAFORM_DESTROY_TIMEOUT_SECS",
        );
        override_bool(
            &mut self.terraform.keep_workdirs,
            "TERRAPROBE_TERRAFORM_KEEP_WORKDIRS",
        );
        override_opt_string(&mut self.terraform.work_root, "TERRAPROBE_TERRAFORM_WORK_ROOT");
        override_u64(
            &mut self.terraform.interrupt_grace_secs,
            "TERRAPROBE_TERRAFORM_INTERRUPT_GRACE_SECS",
        );

        // Retry
        override_u32(&mut self.retry.max_attempts, "TERRAPROBE_RETRY_MAX_ATTEMPTS");
        override_u64(
            &mut self.retry.initial_backoff_ms,
            "TERRAPROBE_RETRY_INITIAL_BACKOFF_MS",
        );
        override_u64(&mut self.retry.max_backoff_ms, "TERRAPROBE_RETRY_MAX_BACKOFF_MS");

        // Verify
        override_u32(&mut self.verify.max_attempts, "TERRAPROBE_VERIFY_MAX_ATTEMPTS");
        override_u64(
            &mut self.verify.initial_backoff_ms,
            "TERRAPROBE_VERIFY_INITIAL_BACKOFF_MS",
        );
        override_u64(
            &mut self.verify.max_backoff_ms,
            "TERRAPROBE_VERIFY_MAX_BACKOFF_MS",
        );
        override_u64(&mut self.verify.timeout_secs, "TERRAPROBE_VERIFY_TIMEOUT_SECS");
        override_string(&mut self.verify.kubectl_binary, "TERRAPROBE_VERIFY_KUBECTL_BINARY");

        // Runner
        override_usize(
            &mut self.runner.max_concurrent_scenarios,
            "TERRAPROBE_RUNNER_MAX_CONCURRENT_SCENARIOS",
        );
        override_u64(
            &mut self.runner.scenario_deadline_secs,
            "TERRAPROBE_RUNNER_SCENARIO_DEADLINE_SECS",
        );

        // Platforms
        override_opt_string(&mut self.gcp.project, "TERRAPROBE_GCP_PROJECT");
        override_opt_string(&mut self.gcp.region, "TERRAPROBE_GCP_REGION");
        override_opt_string(
            &mut self.azure.subscription_id,
            "TERRAPROBE_AZURE_SUBSCRIPTION_ID",
        );
        override_opt_string(&mut self.azure.location, "TERRAPROBE_AZURE_LOCATION");

        // Metrics
        override_bool(&mut self.metrics.enabled, "TERRAPROBE_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "TERRAPROBE_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "TERRAPROBE_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), HarnessError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.terraform.binary.trim().is_empty() {
            return Err(invalid("terraform.binary", "must not be empty"));
        }

        check_range(
            "terraform.apply_timeout_secs",
            self.terraform.apply_timeout_secs,
            MAX_TIMEOUT_SECS,
        )?;
        check_range(
            "terraform.destroy_timeout_secs",
            self.terraform.destroy_timeout_secs,
            MAX_TIMEOUT_SECS,
        )?;
        check_range(
            "terraform.interrupt_grace_secs",
            self.terraform.interrupt_grace_secs,
            MAX_INTERRUPT_GRACE_SECS,
        )?;
        check_range("verify.timeout_secs", self.verify.timeout_secs, MAX_TIMEOUT_SECS)?;
        if self.verify.kubectl_binary.trim().is_empty() {
            return Err(invalid("verify.kubectl_binary", "must not be empty"));
        }
        check_range(
            "runner.scenario_deadline_secs",
            self.runner.scenario_deadline_secs,
            MAX_TIMEOUT_SECS,
        )?;

        self.retry.validate("retry")?;
        self.verify.backoff().validate("verify")?;

        if self.runner.max_concurrent_scenarios == 0
            || self.runner.max_concurrent_scenarios > MAX_CONCURRENT_SCENARIOS
        {
            return Err(invalid(
                "runner.max_concurrent_scenarios",
                format!("must be 1-{MAX_CONCURRENT_SCENARIOS}"),
            ));
        }

        let phases = self.terraform.apply_timeout_secs
            + self.verify.timeout_secs
            + self.terraform.destroy_timeout_secs;
        if self.runner.scenario_deadline_secs < self.terraform.apply_timeout_secs {
            return Err(invalid(
                "runner.scenario_deadline_secs",
                format!(
                    "must be at least terraform.apply_timeout_secs ({}); phases need up to {phases}s",
                    self.terraform.apply_timeout_secs
                ),
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be non-zero when enabled"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> HarnessError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

fn check_range(field: &str, value: u64, max: u64) -> Result<(), HarnessError> {
    if value == 0 || value > max {
        return Err(invalid(field, format!("must be 1-{max}")));
    }
    Ok(())
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// Terraform 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerraformConfig {
    /// terraform 실행 파일 경로
    pub binary: String,
    /// init + apply 데드라인 (초)
    pub apply_timeout_secs: u64,
    /// destroy 데드라인 (초)
    pub destroy_timeout_secs: u64,
    /// 시나리오 종료 후 작업 디렉토리 보존 여부
    pub keep_workdirs: bool,
    /// 작업 디렉토리 상위 경로 (없으면 시스템 임시 디렉토리)
    pub work_root: Option<String>,
    /// 데드라인 초과 시 SIGINT 후 강제 종료까지 기다리는 시간 (초)
    pub interrupt_grace_secs: u64,
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            binary: "terraform".to_owned(),
            apply_timeout_secs: 30 * 60,
            destroy_timeout_secs: 30 * 60,
            keep_workdirs: false,
            work_root: None,
            interrupt_grace_secs: 60,
        }
    }
}

impl TerraformConfig {
    pub fn apply_timeout(&self) -> Duration {
        Duration::from_secs(self.apply_timeout_secs)
    }

    pub fn destroy_timeout(&self) -> Duration {
        Duration::from_secs(self.destroy_timeout_secs)
    }

    pub fn interrupt_grace(&self) -> Duration {
        Duration::from_secs(self.interrupt_grace_secs)
    }
}

/// 백오프 설정 (밀리초 단위)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 최대 시도 횟수 (첫 시도 포함)
    pub max_attempts: u32,
    /// 첫 재시도 대기 (밀리초)
    pub initial_backoff_ms: u64,
    /// 대기 상한 (밀리초)
    pub max_backoff_ms: u64,
    /// 지수 배수
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 5_000,
            max_backoff_ms: 60_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// 런타임 재시도 정책으로 변환합니다.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.multiplier,
            jitter: true,
        }
    }

    fn validate(&self, section: &str) -> Result<(), HarnessError> {
        if self.max_attempts == 0 || self.max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(invalid(
                &format!("{section}.max_attempts"),
                format!("must be 1-{MAX_RETRY_ATTEMPTS}"),
            ));
        }
        if self.max_backoff_ms > MAX_BACKOFF_MS {
            return Err(invalid(
                &format!("{section}.max_backoff_ms"),
                format!("must be 0-{MAX_BACKOFF_MS}"),
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(invalid(
                &format!("{section}.initial_backoff_ms"),
                "must not exceed max_backoff_ms",
            ));
        }
        if !(1.0..=10.0).contains(&self.multiplier) {
            return Err(invalid(&format!("{section}.multiplier"), "must be 1.0-10.0"));
        }
        Ok(())
    }
}

/// 라이브 상태 검증 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// 조회 최대 시도 횟수
    pub max_attempts: u32,
    /// 첫 재시도 대기 (밀리초)
    pub initial_backoff_ms: u64,
    /// 대기 상한 (밀리초)
    pub max_backoff_ms: u64,
    /// 검증 호출 하나의 데드라인 (초)
    pub timeout_secs: u64,
    /// 클러스터 내부 검증에 쓰는 kubectl 실행 파일 경로
    pub kubectl_binary: String,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 30_000,
            timeout_secs: 5 * 60,
            kubectl_binary: "kubectl".to_owned(),
        }
    }
}

impl VerifyConfig {
    fn backoff(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
            multiplier: 2.0,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.backoff().policy()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 시나리오 러너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// 동시에 실행할 시나리오 최대 수
    pub max_concurrent_scenarios: usize,
    /// 시나리오 하나의 전체 데드라인 (초)
    pub scenario_deadline_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_scenarios: 4,
            scenario_deadline_secs: 90 * 60,
        }
    }
}

impl RunnerConfig {
    pub fn scenario_deadline(&self) -> Duration {
        Duration::from_secs(self.scenario_deadline_secs)
    }
}

/// GCP 설정 -- 비어 있으면 [`crate::context`]의 폴백 순서로 해석됩니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    /// 대상 프로젝트 ID
    pub project: Option<String>,
    /// 기본 리전
    pub region: Option<String>,
}

/// Azure 설정 -- 비어 있으면 [`crate::context`]의 폴백 순서로 해석됩니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    /// 대상 구독 ID
    pub subscription_id: Option<String>,
    /// 기본 위치
    pub location: Option<String>,
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9464,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_opt_string(target: &mut Option<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = if val.trim().is_empty() { None } else { Some(val) };
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}
