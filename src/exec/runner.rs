// src/exec/runner.rs

//! Runs one shell command under a timeout, a memory ceiling and a
//! cancellation token.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{ErrorCode, StructuredError};
use crate::exec::memory::{self, MemoryVerdict};
use crate::exec::request::{CommandOutput, CommandRequest, StdioMode};

/// How long captured output may keep draining after the child exits.
/// Background grandchildren can hold the pipes open indefinitely.
const OUTPUT_DRAIN: Duration = Duration::from_secs(2);

/// Bytes of stdout/stderr kept in error details.
const TAIL_BYTES: usize = 4 * 1024;

/// Why the supervision loop stopped.
enum Exit {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
    MemoryExceeded { rss_bytes: u64, limit_mb: u64 },
}

/// Run a command to completion.
///
/// Resolves to exactly one of:
/// - `Ok(CommandOutput)` when the command exits with status 0,
/// - `COMMAND_FAILED` on a non-zero exit,
/// - `COMMAND_TIMEOUT` when the wall-clock budget runs out,
/// - `MEMORY_LIMIT_EXCEEDED` when a sample of the child's process tree goes
///   over the ceiling,
/// - `CANCELLED` when `cancel` fires,
/// - `EXECUTION_ERROR` when the process cannot be spawned or waited on.
///
/// The deadline and the sampler live inside this future, so every exit path
/// drops them.
pub async fn run_command(
    request: &CommandRequest,
    cancel: &CancellationToken,
) -> Result<CommandOutput, StructuredError> {
    let started = Instant::now();

    info!(
        command = %request.command(),
        cwd = ?request.cwd(),
        timeout_ms = request.timeout_duration().as_millis() as u64,
        memory_limit_mb = ?request.memory_limit(),
        "starting command"
    );

    let mut child = spawn(request).map_err(|e| {
        StructuredError::new(
            ErrorCode::ExecutionError,
            format!("failed to spawn `{}`: {e}", request.command()),
        )
        .with_detail("command", request.command())
        .with_detail("io_error", e.to_string())
    })?;

    let pid = child.id();
    let stdout_buf = Arc::new(Mutex::new(String::new()));
    let stderr_buf = Arc::new(Mutex::new(String::new()));
    let readers = [
        child
            .stdout
            .take()
            .map(|out| spawn_capture(out, "stdout", stdout_buf.clone())),
        child
            .stderr
            .take()
            .map(|err| spawn_capture(err, "stderr", stderr_buf.clone())),
    ];

    let exit = supervise(&mut child, pid, request, cancel).await;

    if !matches!(exit, Exit::Exited(_)) {
        terminate(&mut child, pid, request.grace()).await;
    }
    drain(readers).await;

    let stdout = take(&stdout_buf);
    let stderr = take(&stderr_buf);
    let elapsed = started.elapsed();

    match exit {
        Exit::Exited(Ok(status)) if status.success() => {
            info!(
                command = %request.command(),
                elapsed_ms = elapsed.as_millis() as u64,
                "command succeeded"
            );
            Ok(CommandOutput {
                stdout,
                stderr,
                exit_code: 0,
                elapsed,
            })
        }
        Exit::Exited(Ok(status)) => {
            let code = status.code().unwrap_or(-1);
            let mut message = format!("command `{}` exited with code {code}", request.command());
            if let Some(last) = stderr.lines().rev().find(|l| !l.trim().is_empty()) {
                message.push_str(": ");
                message.push_str(last.trim());
            }
            warn!(command = %request.command(), exit_code = code, "command failed");
            Err(StructuredError::new(ErrorCode::CommandFailed, message)
                .with_detail("command", request.command())
                .with_detail("exit_code", code)
                .with_detail("stderr", tail(&stderr))
                .with_detail("stdout", tail(&stdout))
                .with_detail("elapsed_ms", elapsed.as_millis() as u64))
        }
        Exit::Exited(Err(e)) => Err(StructuredError::new(
            ErrorCode::ExecutionError,
            format!("failed waiting for `{}`: {e}", request.command()),
        )
        .with_detail("command", request.command())),
        Exit::TimedOut => {
            let timeout_ms = request.timeout_duration().as_millis() as u64;
            warn!(command = %request.command(), timeout_ms, "command timed out");
            Err(StructuredError::new(
                ErrorCode::CommandTimeout,
                format!("command `{}` timed out after {timeout_ms}ms", request.command()),
            )
            .with_detail("command", request.command())
            .with_detail("timeout_ms", timeout_ms)
            .with_detail("stderr", tail(&stderr)))
        }
        Exit::Cancelled => {
            info!(command = %request.command(), "command cancelled");
            Err(StructuredError::new(
                ErrorCode::Cancelled,
                format!("command `{}` was cancelled", request.command()),
            )
            .with_detail("command", request.command()))
        }
        Exit::MemoryExceeded { rss_bytes, limit_mb } => {
            let rss_mb = memory::bytes_to_mb(rss_bytes);
            Err(StructuredError::new(
                ErrorCode::MemoryLimitExceeded,
                format!(
                    "command `{}` used {rss_mb}MB, over its {limit_mb}MB limit",
                    request.command()
                ),
            )
            .with_detail("command", request.command())
            .with_detail("rss_mb", rss_mb)
            .with_detail("limit_mb", limit_mb))
        }
    }
}

/// Build a shell command appropriate for the platform.
fn shell_command(line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        c
    }
}

fn spawn(request: &CommandRequest) -> std::io::Result<Child> {
    let mut cmd = shell_command(request.command());

    if let Some(cwd) = request.cwd() {
        cmd.current_dir(cwd);
    }
    cmd.envs(request.env_overlay());

    match request.stdio_mode() {
        StdioMode::Captured => cmd.stdout(Stdio::piped()).stderr(Stdio::piped()),
        StdioMode::Inherited => cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit()),
    };
    cmd.stdin(Stdio::null()).kill_on_drop(true);

    // Own process group, so termination reaches everything the shell started.
    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn()
}

async fn supervise(
    child: &mut Child,
    pid: Option<u32>,
    request: &CommandRequest,
    cancel: &CancellationToken,
) -> Exit {
    let deadline = tokio::time::sleep(request.timeout_duration());
    tokio::pin!(deadline);

    let interval = request.sample_every().max(Duration::from_millis(10));
    let mut sampler = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    sampler.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let limit = request.memory_limit();
    let mut sampling = limit.is_some() && pid.is_some();
    let mut warned = false;

    loop {
        tokio::select! {
            status = child.wait() => return Exit::Exited(status),
            _ = &mut deadline => return Exit::TimedOut,
            _ = cancel.cancelled() => return Exit::Cancelled,
            _ = sampler.tick(), if sampling => {
                let (Some(pid), Some(limit_mb)) = (pid, limit) else {
                    sampling = false;
                    continue;
                };
                let Some(rss_bytes) = memory::process_tree_rss_bytes(pid) else {
                    warn!(
                        command = %request.command(),
                        "memory sampling unavailable on this platform; ceiling not enforced"
                    );
                    sampling = false;
                    continue;
                };

                match memory::evaluate(rss_bytes, limit_mb) {
                    MemoryVerdict::Exceeded => {
                        warn!(
                            command = %request.command(),
                            rss_mb = memory::bytes_to_mb(rss_bytes),
                            limit_mb,
                            "memory limit exceeded; aborting command"
                        );
                        return Exit::MemoryExceeded { rss_bytes, limit_mb };
                    }
                    MemoryVerdict::NearLimit if !warned => {
                        warned = true;
                        warn!(
                            command = %request.command(),
                            rss_mb = memory::bytes_to_mb(rss_bytes),
                            limit_mb,
                            "command is above 90% of its memory limit"
                        );
                    }
                    _ => {
                        debug!(
                            command = %request.command(),
                            rss_mb = memory::bytes_to_mb(rss_bytes),
                            "memory sample"
                        );
                    }
                }
            }
        }
    }
}

/// SIGTERM the process group, then SIGKILL if it is still alive after `grace`.
async fn terminate(child: &mut Child, pid: Option<u32>, grace: Duration) {
    signal_group(pid, GroupSignal::Terminate);
    #[cfg(not(unix))]
    let _ = child.start_kill();

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => debug!(?pid, "child exited after termination request"),
        Err(_) => {
            warn!(
                ?pid,
                grace_ms = grace.as_millis() as u64,
                "child ignored termination request; killing"
            );
            signal_group(pid, GroupSignal::Kill);
            if let Err(e) = child.kill().await {
                warn!(?pid, error = %e, "failed to kill child process");
            }
        }
    }
}

enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, sig: GroupSignal) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    let signal = match sig {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        debug!(pid, ?signal, error = %e, "killpg failed");
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: Option<u32>, _sig: GroupSignal) {}

/// Read a stream line by line into `buf`, echoing each line at debug.
fn spawn_capture<R>(reader: R, stream: &'static str, buf: Arc<Mutex<String>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    debug!(stream, "{}", text.trim_end());
                    if let Ok(mut out) = buf.lock() {
                        out.push_str(&text);
                    }
                }
            }
        }
    })
}

async fn drain(readers: [Option<JoinHandle<()>>; 2]) {
    for handle in readers.into_iter().flatten() {
        let abort = handle.abort_handle();
        if tokio::time::timeout(OUTPUT_DRAIN, handle).await.is_err() {
            debug!("output stream still open after child exit; abandoning reader");
            abort.abort();
        }
    }
}

fn take(buf: &Arc<Mutex<String>>) -> String {
    buf.lock().map(|mut s| std::mem::take(&mut *s)).unwrap_or_default()
}

fn tail(s: &str) -> String {
    if s.len() <= TAIL_BYTES {
        return s.to_string();
    }
    let mut start = s.len() - TAIL_BYTES;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    s[start..].to_string()
}
