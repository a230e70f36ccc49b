use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

use crate::execution::{
    ExecutionResult, OutputSink, OutputStream, ProcessExecutor, ProcessExitStatus, ProcessOutput,
    ProcessSpawnRequest, ProcessWaitFuture, RunningProcess,
};
use crate::models::{AssetAction, CoreError, CoreErrorKind, ManagerId};

const MAX_STREAM_BYTES: usize = 128 * 1024;
const READ_DRAIN_WINDOW: Duration = Duration::from_secs(2);

pub struct TokioProcessExecutor;

impl ProcessExecutor for TokioProcessExecutor {
    fn spawn(
        &self,
        request: ProcessSpawnRequest,
        sink: Arc<dyn OutputSink>,
    ) -> ExecutionResult<Box<dyn RunningProcess>> {
        let mut cmd = tokio::process::Command::new(&request.command.program);
        cmd.args(&request.command.args);

        for (key, value) in &request.command.env {
            cmd.env(key, value);
        }

        if let Some(dir) = &request.command.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|error| {
            let kind = if error.kind() == std::io::ErrorKind::NotFound {
                CoreErrorKind::NotInstalled
            } else {
                CoreErrorKind::ProcessFailure
            };
            CoreError::new(
                kind,
                format!(
                    "failed to spawn '{}': {error}",
                    request.command.program.display()
                ),
            )
            .manager(request.manager)
            .action(request.action)
        })?;

        let pid = child.id();
        tracing::debug!(
            manager = %request.manager,
            action = request.action.as_str(),
            pid,
            command = %request.command.display_line(),
            "spawned asset manager process"
        );

        Ok(Box::new(TokioRunningProcess {
            child: Mutex::new(Some(child)),
            pid,
            started_at: SystemTime::now(),
            timeout: request.timeout,
            manager: request.manager,
            action: request.action,
            sink,
        }))
    }
}

struct TokioRunningProcess {
    child: Mutex<Option<tokio::process::Child>>,
    pid: Option<u32>,
    started_at: SystemTime,
    timeout: Option<Duration>,
    manager: ManagerId,
    action: AssetAction,
    sink: Arc<dyn OutputSink>,
}

impl RunningProcess for TokioRunningProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn wait(self: Box<Self>) -> ProcessWaitFuture {
        let child = self.child.into_inner().ok().flatten();
        let timeout = self.timeout;
        let started_at = self.started_at;
        let manager = self.manager;
        let action = self.action;
        let sink = self.sink;

        Box::pin(async move {
            let mut child = child.ok_or_else(|| {
                process_failure(manager, action, "child process already consumed".to_string())
            })?;

            let stdout_reader = forward_lines(child.stdout.take(), OutputStream::Stdout, &sink);
            let stderr_reader = forward_lines(child.stderr.take(), OutputStream::Stderr, &sink);

            let wait_err = |error: std::io::Error| {
                process_failure(manager, action, format!("failed to wait for process: {error}"))
            };

            // Descendants may inherit the pipes and keep them open past the child's exit,
            // so readers only get a bounded drain window once the child is gone.
            let status = if let Some(timeout_duration) = timeout {
                match tokio::time::timeout(timeout_duration, child.wait()).await {
                    Ok(result) => result.map_err(wait_err)?,
                    Err(_) => {
                        kill_process_group(&mut child);
                        let _ = tokio::time::timeout(Duration::from_secs(1), child.wait()).await;
                        stdout_reader.abort();
                        stderr_reader.abort();
                        return Err(CoreError::new(
                            CoreErrorKind::Timeout,
                            format!(
                                "process timed out after {}ms",
                                timeout_duration.as_millis()
                            ),
                        )
                        .manager(manager)
                        .action(action));
                    }
                }
            } else {
                child.wait().await.map_err(wait_err)?
            };

            let stdout = match tokio::time::timeout(READ_DRAIN_WINDOW, stdout_reader).await {
                Ok(Ok(buffer)) => buffer,
                _ => Vec::new(),
            };
            let stderr = match tokio::time::timeout(READ_DRAIN_WINDOW, stderr_reader).await {
                Ok(Ok(buffer)) => buffer,
                _ => Vec::new(),
            };

            let status = match status.code() {
                Some(code) => ProcessExitStatus::ExitCode(code),
                None => ProcessExitStatus::Terminated,
            };

            Ok(ProcessOutput {
                status,
                stdout,
                stderr,
                started_at,
                finished_at: SystemTime::now(),
            })
        })
    }
}

fn forward_lines<R>(
    handle: Option<R>,
    stream: OutputStream,
    sink: &Arc<dyn OutputSink>,
) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let sink = Arc::clone(sink);
    tokio::spawn(async move {
        let mut retained = Vec::new();
        let Some(handle) = handle else {
            return retained;
        };

        let mut reader = BufReader::new(handle);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    sink.write_line(stream, text.trim_end_matches(['\r', '\n']));
                    retain_tail(&mut retained, &line);
                }
            }
        }
        retained
    })
}

fn retain_tail(buffer: &mut Vec<u8>, chunk: &[u8]) {
    buffer.extend_from_slice(chunk);
    if buffer.len() > MAX_STREAM_BYTES {
        let excess = buffer.len() - MAX_STREAM_BYTES;
        buffer.drain(..excess);
    }
}

#[cfg(unix)]
fn kill_process_group(child: &mut tokio::process::Child) {
    if let Some(pid) = child.id() {
        let pgid = -(pid as libc::pid_t);
        unsafe {
            libc::kill(pgid, libc::SIGKILL);
        }
    } else {
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut tokio::process::Child) {
    let _ = child.start_kill();
}

fn process_failure(manager: ManagerId, action: AssetAction, message: String) -> CoreError {
    CoreError::new(CoreErrorKind::ProcessFailure, message)
        .manager(manager)
        .action(action)
}
