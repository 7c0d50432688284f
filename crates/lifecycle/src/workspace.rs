//! 작업 디렉토리 -- 시나리오별 격리된 모듈 복사본
//!
//! 같은 모듈을 여러 시나리오가 동시에 apply해도 상태 파일(`terraform.tfstate`)과
//! `.terraform` 디렉토리가 섞이지 않도록, 시나리오마다 모듈을 임시 디렉토리로 복사합니다.
//! 시나리오 변수는 `terraprobe.auto.tfvars.json`으로 기록되어 Terraform이 자동으로 읽습니다.
//!
//! 복사는 심볼릭 링크를 따라 재귀하지 않으며, 모듈 안에 있는 작업 디렉토리 루트는 건너뜁니다.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use terraprobe_core::types::ResourceSpec;
use tracing::{debug, info};

use crate::error::ProvisionError;

/// 시나리오 변수 파일 이름
pub const VARS_FILE_NAME: &str = "terraprobe.auto.tfvars.json";

/// 복사하지 않는 항목 (이전 실행의 상태와 플러그인 캐시)
const SKIPPED_ENTRIES: &[&str] = &[
    ".terraform",
    "terraform.tfstate",
    "terraform.tfstate.backup",
    ".terraform.tfstate.lock.info",
];

/// 시나리오 하나가 소유하는 격리된 모듈 복사본
///
/// drop 시 디렉토리가 삭제됩니다. [`keep`](Self::keep)을 호출하면 보존됩니다.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// 모듈 디렉토리를 복사하고 변수 파일을 기록합니다.
    ///
    /// `work_root`가 없으면 시스템 임시 디렉토리 아래에 생성합니다.
    pub async fn create(
        spec: &ResourceSpec,
        work_root: Option<&Path>,
    ) -> Result<Self, ProvisionError> {
        let module_dir = spec.module_dir().to_path_buf();
        let work_root = work_root.map(Path::to_path_buf);
        let prefix = format!("terraprobe-{}-", spec.identifier());
        let vars = serde_json::to_string_pretty(spec.vars()).map_err(|e| {
            ProvisionError::Workspace {
                path: VARS_FILE_NAME.to_owned(),
                reason: format!("failed to encode variables: {e}"),
            }
        })?;

        let dir = tokio::task::spawn_blocking(move || {
            populate(&module_dir, work_root.as_deref(), &prefix, &vars)
        })
        .await
        .map_err(|e| ProvisionError::Workspace {
            path: spec.module_dir().display().to_string(),
            reason: format!("copy task failed: {e}"),
        })??;

        let path = dir.path().to_path_buf();
        debug!(
            module = %spec.module_dir().display(),
            workdir = %path.display(),
            "workspace created"
        );
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    /// 작업 디렉토리 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 변수 파일 경로
    pub fn vars_file(&self) -> PathBuf {
        self.path.join(VARS_FILE_NAME)
    }

    /// drop 시 삭제되지 않도록 디렉토리를 보존하고 경로를 반환합니다.
    pub fn keep(&mut self) -> PathBuf {
        if let Some(dir) = self.dir.take() {
            let path = dir.keep();
            info!(workdir = %path.display(), "workspace kept for inspection");
            return path;
        }
        self.path.clone()
    }

    /// 보존 여부
    pub fn is_kept(&self) -> bool {
        self.dir.is_none()
    }
}

fn populate(
    module_dir: &Path,
    work_root: Option<&Path>,
    prefix: &str,
    vars: &str,
) -> Result<TempDir, ProvisionError> {
    let io_err = |path: &Path, e: std::io::Error| ProvisionError::Workspace {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    if !module_dir.is_dir() {
        return Err(ProvisionError::Workspace {
            path: module_dir.display().to_string(),
            reason: "module directory does not exist".to_owned(),
        });
    }

    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix);
    let dir = match work_root {
        Some(root) => {
            std::fs::create_dir_all(root).map_err(|e| io_err(root, e))?;
            builder.tempdir_in(root).map_err(|e| io_err(root, e))?
        }
        None => builder
            .tempdir()
            .map_err(|e| io_err(&std::env::temp_dir(), e))?,
    };

    let mut excluded = vec![dir.path().canonicalize().map_err(|e| io_err(dir.path(), e))?];
    if let Some(root) = work_root {
        excluded.push(root.canonicalize().map_err(|e| io_err(root, e))?);
    }
    copy_dir(module_dir, dir.path(), &excluded).map_err(|e| io_err(module_dir, e))?;

    let vars_path = dir.path().join(VARS_FILE_NAME);
    std::fs::write(&vars_path, vars).map_err(|e| io_err(&vars_path, e))?;

    Ok(dir)
}

/// `excluded`는 정규화된 경로 목록이며 그 디렉토리들은 복사하지 않습니다.
fn copy_dir(src: &Path, dst: &Path, excluded: &[PathBuf]) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if name
            .to_str()
            .is_some_and(|n| SKIPPED_ENTRIES.contains(&n))
        {
            continue;
        }

        let path = entry.path();
        let target = dst.join(&name);
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            copy_symlink(&path, &target)?;
        } else if file_type.is_dir() {
            if excluded.contains(&path.canonicalize()?) {
                debug!(path = %path.display(), "skipping work directory inside module");
                continue;
            }
            std::fs::create_dir_all(&target)?;
            copy_dir(&path, &target, excluded)?;
        } else {
            std::fs::copy(&path, &target)?;
        }
    }
    Ok(())
}

/// 파일을 가리키면 내용을 복사하고, 디렉토리를 가리키면 원래 대상으로의 링크를 만듭니다.
fn copy_symlink(link: &Path, target: &Path) -> std::io::Result<()> {
    let Ok(resolved) = link.canonicalize() else {
        debug!(link = %link.display(), "skipping dangling symlink");
        return Ok(());
    };
    if resolved.is_file() {
        std::fs::copy(&resolved, target)?;
        return Ok(());
    }
    link_dir(&resolved, target)
}

#[cfg(unix)]
fn link_dir(resolved: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(resolved, target)
}

#[cfg(not(unix))]
fn link_dir(resolved: &Path, _target: &Path) -> std::io::Result<()> {
    debug!(target = %resolved.display(), "skipping directory symlink");
    Ok(())
}
