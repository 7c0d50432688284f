//! 라이프사이클 드라이버 -- apply / destroy 실행과 정리 보장
//!
//! [`LifecycleDriver`]는 [`Provisioner`]를 감싸 각 단계에 데드라인과
//! 일시적 에러 재시도를 적용합니다.
//!
//! [`prepare`](LifecycleDriver::prepare)가 반환하는 [`Lease`]는 작업 디렉토리의
//! 소유권을 나타내며, [`destroy`](LifecycleDriver::destroy)가 이를 소비하므로
//! 같은 리소스를 두 번 destroy할 수 없습니다.
//!
//! 데드라인을 넘긴 단계는 강제 종료하지 않고 SIGINT로 중단시킨 뒤
//! `interrupt_grace`만큼 기다립니다. 바깥 타이머는 그 유예 시간까지 포함한 백스톱입니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use terraprobe_core::error::ScenarioError;
use terraprobe_core::retry::{RetryPolicy, retry_transient};
use terraprobe_core::types::{ProvisionedResource, ResourceSpec, ScenarioPhase};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::ProvisionError;
use crate::provisioner::{Invocation, Provisioner};
use crate::workspace::Workspace;

/// 드라이버 실행 설정
#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// init + apply + output 전체 데드라인
    pub apply_timeout: Duration,
    /// destroy 데드라인
    pub destroy_timeout: Duration,
    /// apply/destroy 일시적 에러 재시도 정책
    pub retry: RetryPolicy,
    /// 성공 시에도 작업 디렉토리 보존
    pub keep_workdirs: bool,
    /// 작업 디렉토리 상위 경로
    pub work_root: Option<PathBuf>,
    /// 프로비저닝 도구에 전달할 환경변수 (프로젝트/구독 ID 등)
    pub env: Vec<(String, String)>,
    /// 데드라인 초과 시 SIGINT 후 강제 종료까지의 유예 시간
    pub interrupt_grace: Duration,
}

/// 유예 시간 이후에도 단계가 끝나지 않을 때 바깥 타이머가 더 기다리는 시간
const BACKSTOP_MARGIN: Duration = Duration::from_secs(5);

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            apply_timeout: Duration::from_secs(30 * 60),
            destroy_timeout: Duration::from_secs(30 * 60),
            retry: RetryPolicy::default(),
            keep_workdirs: false,
            work_root: None,
            env: Vec::new(),
            interrupt_grace: Duration::from_secs(60),
        }
    }
}

impl DriverSettings {
    /// 하네스 설정과 해석된 플랫폼 컨텍스트로부터 드라이버 설정을 만듭니다.
    pub fn from_config(
        config: &terraprobe_core::config::HarnessConfig,
        context: &terraprobe_core::context::PlatformContext,
    ) -> Self {
        Self {
            apply_timeout: config.terraform.apply_timeout(),
            destroy_timeout: config.terraform.destroy_timeout(),
            retry: config.retry.policy(),
            keep_workdirs: config.terraform.keep_workdirs,
            work_root: config.terraform.work_root.as_ref().map(PathBuf::from),
            env: context.terraform_env(),
            interrupt_grace: config.terraform.interrupt_grace(),
        }
    }
}

/// 준비된 작업 디렉토리의 소유권
///
/// 시나리오 하나가 독점하며, destroy에 의해 소비됩니다.
#[derive(Debug)]
pub struct Lease {
    identifier: String,
    workspace: Workspace,
    invocation: Invocation,
}

impl Lease {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn workdir(&self) -> &Path {
        self.workspace.path()
    }
}

/// apply/destroy 실행기
pub struct LifecycleDriver<P: Provisioner> {
    provisioner: Arc<P>,
    settings: DriverSettings,
}

impl<P: Provisioner> LifecycleDriver<P> {
    /// 새 드라이버를 생성합니다.
    pub fn new(provisioner: Arc<P>, settings: DriverSettings) -> Self {
        Self {
            provisioner,
            settings,
        }
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// 모듈을 격리된 작업 디렉토리로 복사하고 변수를 기록합니다.
    ///
    /// terraform은 복사본 안에서 실행되므로 상대 경로 var 파일은 여기서
    /// 현재 디렉토리 기준 절대 경로로 바꿉니다.
    /// 이 단계에서는 아무 리소스도 생성되지 않습니다.
    pub async fn prepare(&self, spec: &ResourceSpec) -> Result<Lease, ScenarioError> {
        let var_files = spec
            .var_files()
            .iter()
            .map(|path| {
                std::path::absolute(path).map_err(|e| ScenarioError::SpecInvalid {
                    reason: format!("cannot resolve var file {}: {e}", path.display()),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let workspace = Workspace::create(spec, self.settings.work_root.as_deref()).await?;
        Ok(Lease {
            identifier: spec.identifier().to_owned(),
            workspace,
            invocation: Invocation {
                var_files,
                env: self.settings.env.clone(),
                deadline: None,
                interrupt_grace: self.settings.interrupt_grace,
            },
        })
    }

    fn backstop(&self, timeout: Duration) -> Duration {
        timeout + self.settings.interrupt_grace + BACKSTOP_MARGIN
    }

    /// init + apply + output을 데드라인 안에서 실행합니다.
    ///
    /// 실패하더라도 lease는 호출자에게 남아 있으므로 반드시 destroy해야 합니다.
    pub async fn apply(&self, lease: &Lease) -> Result<ProvisionedResource, ScenarioError> {
        let workdir = lease.workdir();
        info!(
            identifier = %lease.identifier,
            workdir = %workdir.display(),
            "applying"
        );

        let timeout = self.settings.apply_timeout;
        let invocation = lease.invocation.until(Instant::now() + timeout);
        let steps = async {
            retry_transient(&self.settings.retry, "terraform_init", || {
                self.provisioner.init(workdir, &invocation)
            })
            .await?;
            retry_transient(&self.settings.retry, "terraform_apply", || {
                self.provisioner.apply(workdir, &invocation)
            })
            .await?;
            retry_transient(&self.settings.retry, "terraform_output", || {
                self.provisioner.outputs(workdir, &invocation)
            })
            .await
        };

        match tokio::time::timeout(self.backstop(timeout), steps).await {
            Ok(Ok(outputs)) => {
                info!(
                    identifier = %lease.identifier,
                    outputs = outputs.len(),
                    "apply succeeded"
                );
                Ok(ProvisionedResource {
                    identifier: lease.identifier.clone(),
                    workdir: workdir.to_path_buf(),
                    outputs,
                })
            }
            Ok(Err(e @ ProvisionError::Interrupted { .. })) => {
                warn!(identifier = %lease.identifier, error = %e, "apply interrupted at deadline");
                Err(ScenarioError::Timeout {
                    phase: ScenarioPhase::Applying,
                    after: timeout,
                })
            }
            Ok(Err(e)) => {
                warn!(identifier = %lease.identifier, error = %e, "apply failed");
                Err(e.into())
            }
            Err(_elapsed) => {
                warn!(
                    identifier = %lease.identifier,
                    timeout_secs = timeout.as_secs(),
                    "apply timed out"
                );
                Err(ScenarioError::Timeout {
                    phase: ScenarioPhase::Applying,
                    after: timeout,
                })
            }
        }
    }

    /// lease를 소비하며 destroy를 실행합니다.
    ///
    /// 실패하거나 `keep_workdirs`가 설정되어 있으면 작업 디렉토리를 보존하고
    /// 수동 정리를 위해 경로를 로그에 남깁니다.
    pub async fn destroy(&self, lease: Lease) -> Result<(), ScenarioError> {
        let Lease {
            identifier,
            mut workspace,
            invocation,
        } = lease;
        info!(identifier = %identifier, "destroying");

        let result = {
            let workdir = workspace.path();
            let timeout = self.settings.destroy_timeout;
            let invocation = invocation.until(Instant::now() + timeout);
            let steps = retry_transient(&self.settings.retry, "terraform_destroy", || {
                self.provisioner.destroy(workdir, &invocation)
            });
            let timed_out = ScenarioError::Timeout {
                phase: ScenarioPhase::Destroying,
                after: timeout,
            };
            match tokio::time::timeout(self.backstop(timeout), steps).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(ProvisionError::Interrupted { .. })) | Err(_) => Err(timed_out),
                Ok(Err(e)) => Err(destroy_failed(&e)),
            }
        };

        match &result {
            Ok(()) => {
                info!(identifier = %identifier, "destroy succeeded");
                if self.settings.keep_workdirs {
                    workspace.keep();
                }
            }
            Err(e) => {
                metrics::counter!(terraprobe_core::metrics::DESTROY_FAILURES_TOTAL).increment(1);
                let kept = workspace.keep();
                error!(
                    identifier = %identifier,
                    workdir = %kept.display(),
                    error = %e,
                    "destroy failed, resources may be left behind; workdir kept for manual cleanup"
                );
            }
        }

        result
    }
}

fn destroy_failed(err: &ProvisionError) -> ScenarioError {
    ScenarioError::DestroyFailed {
        reason: err.to_string(),
    }
}
