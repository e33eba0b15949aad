//! Process-under-test lifecycle
//!
//! Preflight checks, launch with a merged environment, health polling, and
//! guaranteed teardown. The child's stdout/stderr are drained into memory
//! for diagnostic replay on failure - they are never parsed.

use crate::error::{HarnessError, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Per-request timeout for a single health poll
const HEALTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
/// Timeout for the port-in-use connect probe
const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// Locate an executable: an explicit path is checked directly, a bare name
/// is searched on `PATH`.
pub fn resolve_executable(name: &str) -> Result<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        if candidate.is_file() {
            return Ok(candidate.to_path_buf());
        }
        return Err(HarnessError::Environment(format!(
            "executable '{name}' not found"
        )));
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let full = dir.join(name);
        if full.is_file() {
            return Ok(full);
        }
    }

    Err(HarnessError::Environment(format!(
        "'{name}' binary not found on PATH"
    )))
}

/// Fail if something is already listening on the given loopback port.
///
/// A successful connect means the port is taken by another process; refusal
/// or probe timeout means it is free for this run.
pub async fn ensure_port_free(bind_addr: &str, port: u16) -> Result<()> {
    let target = format!("{bind_addr}:{port}");
    let probe = tokio::time::timeout(
        PORT_PROBE_TIMEOUT,
        tokio::net::TcpStream::connect(&target),
    )
    .await;

    match probe {
        Ok(Ok(_)) => Err(HarnessError::Environment(format!(
            "port {port} is already in use"
        ))),
        _ => Ok(()),
    }
}

/// Poll the health URL until it answers 200 or the deadline passes.
///
/// Returns `false` on timeout without raising - the caller decides whether
/// that is fatal.
pub async fn wait_healthy(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        let response = client
            .get(url)
            .timeout(HEALTH_REQUEST_TIMEOUT)
            .send()
            .await;
        match response {
            Ok(r) if r.status() == reqwest::StatusCode::OK => return true,
            Ok(r) => debug!(status = %r.status(), "Health poll not ready"),
            Err(e) => debug!(error = %e, "Health poll failed"),
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

/// A launched process-under-test.
///
/// Acquisition is [`ProcessSupervisor::launch`]; release is
/// [`ProcessSupervisor::terminate`], with `kill_on_drop` as a backstop so
/// the child never outlives an aborted run.
pub struct ProcessSupervisor {
    child: Child,
    stdout_buf: Arc<Mutex<String>>,
    stderr_buf: Arc<Mutex<String>>,
}

impl ProcessSupervisor {
    /// Spawn the executable with `env_overrides` merged into the current
    /// environment, stdout/stderr piped and drained in the background.
    pub fn launch(
        executable: &Path,
        args: &[String],
        env_overrides: &[(String, String)],
    ) -> Result<Self> {
        let mut child = Command::new(executable)
            .args(args)
            .envs(env_overrides.iter().cloned())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HarnessError::Environment(format!(
                    "failed to launch {}: {e}",
                    executable.display()
                ))
            })?;

        info!(executable = %executable.display(), "Process-under-test starting");

        let stdout_buf = Arc::new(Mutex::new(String::new()));
        let stderr_buf = Arc::new(Mutex::new(String::new()));

        if let Some(stdout) = child.stdout.take() {
            drain_into(stdout, Arc::clone(&stdout_buf));
        }
        if let Some(stderr) = child.stderr.take() {
            drain_into(stderr, Arc::clone(&stderr_buf));
        }

        Ok(Self {
            child,
            stdout_buf,
            stderr_buf,
        })
    }

    /// Everything the child has written to stderr so far
    pub fn stderr_snapshot(&self) -> String {
        self.stderr_buf.lock().clone()
    }

    /// Everything the child has written to stdout so far
    pub fn stdout_snapshot(&self) -> String {
        self.stdout_buf.lock().clone()
    }

    /// Graceful termination: SIGTERM, bounded wait, then SIGKILL.
    ///
    /// Runs on every exit path, including failed setup phases.
    pub async fn terminate(mut self, grace_period: Duration) {
        if let Ok(Some(status)) = self.child.try_wait() {
            info!(%status, "Process-under-test already exited");
            return;
        }

        if let Some(pid) = self.child.id() {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(error = %e, "SIGTERM failed");
            }
        }

        match tokio::time::timeout(grace_period, self.child.wait()).await {
            Ok(Ok(status)) => info!(%status, "Process-under-test terminated"),
            Ok(Err(e)) => warn!(error = %e, "Failed to reap process-under-test"),
            Err(_) => {
                warn!(
                    grace_secs = grace_period.as_secs(),
                    "Process-under-test ignored SIGTERM, killing"
                );
                if let Err(e) = self.child.kill().await {
                    warn!(error = %e, "Kill failed");
                }
            }
        }
    }
}

/// Drain a child stream line-by-line into a shared buffer.
fn drain_into<R>(reader: R, buf: Arc<Mutex<String>>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut guard = buf.lock();
            guard.push_str(&line);
            guard.push('\n');
        }
    });
}
