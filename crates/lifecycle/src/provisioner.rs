//! Provisioning tool abstraction for testability.
//!
//! The [`Provisioner`] trait abstracts the Terraform command line, allowing
//! production code to use [`TerraformCli`] while tests use a scripted mock.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ LifecycleDriver │
//! └────────┬────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │ Provisioner │ (trait)
//!   └─────────────┘
//!        │     │
//!        ▼     ▼
//!  ┌──────────┐ ┌──────┐
//!  │TerraformCli│ │ Mock │
//!  └────┬─────┘ └──────┘
//!       │
//!       ▼
//!   terraform binary
//! ```
//!
//! # Error Classification
//!
//! A nonzero exit is reported as [`ProvisionError::CommandFailed`]. The
//! `transient` flag is derived from stderr: rate limiting, 429/503 responses,
//! dropped connections and eventual-consistency messages are retryable; hard
//! quota limits and validation errors are not.
//!
//! # Interruption
//!
//! Killing terraform mid-apply orphans whatever it was creating and can leave
//! the state file half-written. When an [`Invocation`] deadline passes, or the
//! step's future is dropped, [`TerraformCli`] sends `SIGINT` instead so
//! terraform can finish in-flight operations and persist state, and only
//! kills the process once the grace period runs out.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use terraprobe_core::types::Outputs;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ProvisionError;

/// Number of stderr lines kept in [`ProvisionError::CommandFailed`].
const STDERR_TAIL_LINES: usize = 20;

/// Lowercased stderr fragments that mark a failure as retryable.
const TRANSIENT_PATTERNS: &[&str] = &[
    "rate limit",
    "ratelimitexceeded",
    "too many requests",
    "error 429",
    "status 429",
    "statuscode=429",
    "error 503",
    "status 503",
    "statuscode=503",
    "service unavailable",
    "connection reset",
    "connection refused",
    "tls handshake timeout",
    "i/o timeout",
    "does not exist yet",
    "not yet available",
    "please retry",
    "quota exceeded for quota metric",
];

/// Lowercased stderr fragments that override a transient match.
const PERMANENT_PATTERNS: &[&str] = &[
    "quotaexceeded",
    "quota_exceeded",
    "exceeds quota",
    "invalid value",
    "invalid argument",
    "unsupported argument",
];

/// Returns `true` when the stderr of a failed command indicates a retryable error.
pub fn is_transient_failure(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    if PERMANENT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return false;
    }
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Per-invocation arguments shared by every provisioning step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Extra `-var-file` arguments. The steps run inside a copied workdir, so
    /// these must be absolute.
    pub var_files: Vec<PathBuf>,
    /// Environment variables exported to the provisioning tool.
    pub env: Vec<(String, String)>,
    /// Point after which a running step is interrupted.
    pub deadline: Option<Instant>,
    /// Time a step gets to exit after `SIGINT` before it is killed.
    pub interrupt_grace: Duration,
}

impl Invocation {
    /// Same invocation, interrupted once `deadline` passes.
    pub fn until(&self, deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }
}

/// Trait abstracting the provisioning tool.
///
/// Each method runs one step in `workdir` and returns once the tool exits.
/// The trait is `Send + Sync + 'static` so a single provisioner can be shared
/// by concurrently running scenarios.
pub trait Provisioner: Send + Sync + 'static {
    /// Initializes the working directory (providers, modules, backend).
    fn init(
        &self,
        workdir: &Path,
        invocation: &Invocation,
    ) -> impl Future<Output = Result<(), ProvisionError>> + Send;

    /// Creates or updates the resources declared in `workdir`.
    fn apply(
        &self,
        workdir: &Path,
        invocation: &Invocation,
    ) -> impl Future<Output = Result<(), ProvisionError>> + Send;

    /// Reads the declared outputs after a successful apply.
    fn outputs(
        &self,
        workdir: &Path,
        invocation: &Invocation,
    ) -> impl Future<Output = Result<Outputs, ProvisionError>> + Send;

    /// Destroys every resource tracked by the state in `workdir`.
    fn destroy(
        &self,
        workdir: &Path,
        invocation: &Invocation,
    ) -> impl Future<Output = Result<(), ProvisionError>> + Send;
}

/// Production provisioner that shells out to the `terraform` binary.
#[derive(Debug, Clone)]
pub struct TerraformCli {
    binary: PathBuf,
}

impl Default for TerraformCli {
    fn default() -> Self {
        Self::new("terraform")
    }
}

impl TerraformCli {
    /// Creates a provisioner using the given binary (name on `PATH` or absolute path).
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn args_with_var_files(base: &[&str], invocation: &Invocation) -> Vec<String> {
        let mut args: Vec<String> = base.iter().map(|s| (*s).to_owned()).collect();
        args.extend(
            invocation
                .var_files
                .iter()
                .map(|f| format!("-var-file={}", f.display())),
        );
        args
    }

    /// Runs one terraform subcommand and returns its stdout.
    async fn run(
        &self,
        workdir: &Path,
        invocation: &Invocation,
        args: &[String],
    ) -> Result<String, ProvisionError> {
        let command = format!(
            "terraform {}",
            args.first().map(String::as_str).unwrap_or_default()
        );
        debug!(command = %command, workdir = %workdir.display(), "running provisioning step");

        let spawn_err = |e: std::io::Error| ProvisionError::Spawn {
            command: command.clone(),
            reason: e.to_string(),
        };
        // kill_on_drop only fires if the grace task below is itself dropped.
        let mut child = tokio::process::Command::new(&self.binary)
            .args(args)
            .current_dir(workdir)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        // Pipes are drained by detached tasks so an interrupted terraform
        // never blocks or gets SIGPIPE while it writes its state.
        let stdout = child.stdout.take().map(|pipe| tokio::spawn(read_to_end(pipe)));
        let stderr = child.stderr.take().map(|pipe| tokio::spawn(read_to_end(pipe)));
        let mut running = RunningChild::new(child, command.clone(), invocation.interrupt_grace);

        let status = match invocation.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, running.wait()).await {
                Ok(status) => status,
                Err(_elapsed) => {
                    let forced = running.interrupt().await;
                    return Err(ProvisionError::Interrupted { command, forced });
                }
            },
            None => running.wait().await,
        }
        .map_err(spawn_err)?;

        let stdout = collect(stdout).await;
        if status.success() {
            return Ok(String::from_utf8_lossy(&stdout).into_owned());
        }

        let stderr = collect(stderr).await;
        let stderr = String::from_utf8_lossy(&stderr);
        Err(ProvisionError::CommandFailed {
            command,
            exit_code: status.code(),
            stderr_tail: tail(&stderr, STDERR_TAIL_LINES),
            transient: is_transient_failure(&stderr),
        })
    }
}

async fn read_to_end<R: AsyncRead + Unpin>(mut pipe: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        debug!(error = %e, "failed to read provisioning output");
    }
    buf
}

async fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    match reader {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

/// A terraform process that is interrupted, not killed, when abandoned.
///
/// Dropping it before the process exited sends `SIGINT` and hands the child
/// to a background task that kills it after the grace period.
struct RunningChild {
    child: Option<Child>,
    command: String,
    grace: Duration,
    interrupted_at: Option<Instant>,
}

impl RunningChild {
    fn new(child: Child, command: String, grace: Duration) -> Self {
        Self {
            child: Some(child),
            command,
            grace,
            interrupted_at: None,
        }
    }

    /// Waits for exit. Cancel-safe.
    async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        let Some(child) = self.child.as_mut() else {
            return Err(std::io::Error::other("process already reaped"));
        };
        let status = child.wait().await?;
        self.child = None;
        Ok(status)
    }

    /// Sends `SIGINT` and waits out the grace period. Returns `true` if the
    /// process had to be killed.
    async fn interrupt(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        warn!(
            command = %self.command,
            grace_secs = self.grace.as_secs(),
            "deadline exceeded, interrupting"
        );
        if send_interrupt(child) {
            self.interrupted_at = Some(Instant::now());
            if let Ok(Ok(_)) = tokio::time::timeout(self.grace, child.wait()).await {
                self.child = None;
                return false;
            }
        }
        warn!(command = %self.command, "process still running after grace period, killing");
        if let Err(e) = child.kill().await {
            warn!(command = %self.command, error = %e, "failed to kill process");
        }
        self.child = None;
        true
    }
}

impl Drop for RunningChild {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        // A second SIGINT makes terraform abort without saving state.
        let signalled = match self.interrupted_at {
            Some(_) => true,
            None => send_interrupt(&child),
        };
        let grace = match self.interrupted_at {
            Some(at) => self.grace.saturating_sub(at.elapsed()),
            None => self.grace,
        };
        let command = std::mem::take(&mut self.command);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) if signalled => {
                warn!(command = %command, "step abandoned, interrupting");
                handle.spawn(async move {
                    if tokio::time::timeout(grace, child.wait()).await.is_err() {
                        warn!(command = %command, "abandoned process ignored SIGINT, killing");
                        let _ = child.kill().await;
                    }
                });
            }
            _ => {
                let _ = child.start_kill();
            }
        }
    }
}

/// Asks the process to stop the way Ctrl-C would.
#[cfg(unix)]
fn send_interrupt(child: &Child) -> bool {
    let Some(pid) = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return false;
    };
    // SAFETY: kill(2) only delivers a signal; `pid` is our own unreaped child
    let result = unsafe { libc::kill(pid, libc::SIGINT) };
    result == 0
}

#[cfg(not(unix))]
fn send_interrupt(_child: &Child) -> bool {
    false
}

/// Keeps the last `lines` non-empty lines of `text`.
fn tail(text: &str, lines: usize) -> String {
    let kept: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join("\n")
}

impl Provisioner for TerraformCli {
    async fn init(&self, workdir: &Path, invocation: &Invocation) -> Result<(), ProvisionError> {
        let args = Self::args_with_var_files(
            &["init", "-input=false", "-no-color"],
            &Invocation::default(),
        );
        self.run(workdir, invocation, &args).await.map(|_| ())
    }

    async fn apply(&self, workdir: &Path, invocation: &Invocation) -> Result<(), ProvisionError> {
        let args = Self::args_with_var_files(
            &["apply", "-input=false", "-no-color", "-auto-approve"],
            invocation,
        );
        self.run(workdir, invocation, &args).await.map(|_| ())
    }

    async fn outputs(
        &self,
        workdir: &Path,
        invocation: &Invocation,
    ) -> Result<Outputs, ProvisionError> {
        let args = vec!["output".to_owned(), "-json".to_owned(), "-no-color".to_owned()];
        let stdout = self.run(workdir, invocation, &args).await?;
        Outputs::from_terraform_json(&stdout)
            .map_err(|e| ProvisionError::OutputsInvalid(e.to_string()))
    }

    async fn destroy(
        &self,
        workdir: &Path,
        invocation: &Invocation,
    ) -> Result<(), ProvisionError> {
        let args = Self::args_with_var_files(
            &["destroy", "-input=false", "-no-color", "-auto-approve"],
            invocation,
        );
        self.run(workdir, invocation, &args).await.map(|_| ())
    }
}
