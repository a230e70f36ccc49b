mod tokio_process;

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::models::{AssetAction, CoreError, CoreErrorKind, ManagerId};

pub use tokio_process::TokioProcessExecutor;

pub type ExecutionResult<T> = Result<T, CoreError>;

pub type ProcessWaitFuture = Pin<Box<dyn Future<Output = ExecutionResult<ProcessOutput>> + Send>>;

/// Exit code reported when the executable could not be started at all.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    /// Shell-like rendering used in log lines and error messages.
    pub fn display_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    pub fn validate(&self, manager: ManagerId, action: AssetAction) -> ExecutionResult<()> {
        if self.program.as_os_str().is_empty() {
            return Err(invalid_input(
                manager,
                action,
                "command program path must not be empty",
            ));
        }

        if self
            .args
            .iter()
            .any(|arg| arg.is_empty() || arg.contains('\0'))
        {
            return Err(invalid_input(
                manager,
                action,
                "command args must be non-empty and must not contain NUL bytes",
            ));
        }

        if self
            .env
            .iter()
            .any(|(key, value)| key.is_empty() || key.contains('\0') || value.contains('\0'))
        {
            return Err(invalid_input(
                manager,
                action,
                "environment keys and values must be non-empty and must not contain NUL bytes",
            ));
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessSpawnRequest {
    pub manager: ManagerId,
    pub action: AssetAction,
    pub command: CommandSpec,
    pub timeout: Option<Duration>,
}

impl ProcessSpawnRequest {
    pub fn new(manager: ManagerId, action: AssetAction, command: CommandSpec) -> Self {
        Self {
            manager,
            action,
            command,
            timeout: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> ExecutionResult<()> {
        self.command.validate(self.manager, self.action)?;

        if let Some(timeout) = self.timeout
            && timeout.is_zero()
        {
            return Err(invalid_input(
                self.manager,
                self.action,
                "timeout must be greater than zero when provided",
            ));
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessExitStatus {
    ExitCode(i32),
    Terminated,
}

impl ProcessExitStatus {
    pub fn success(self) -> bool {
        self == Self::ExitCode(0)
    }

    pub fn code(self) -> Option<i32> {
        match self {
            Self::ExitCode(code) => Some(code),
            Self::Terminated => None,
        }
    }
}

impl Display for ProcessExitStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExitCode(code) => write!(f, "exit code {code}"),
            Self::Terminated => f.write_str("termination by signal"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessOutput {
    pub status: ProcessExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
}

impl ProcessOutput {
    /// Output of a process that never started, e.g. because the binary is missing.
    pub fn spawn_failure(message: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            status: ProcessExitStatus::ExitCode(SPAWN_FAILURE_EXIT_CODE),
            stdout: Vec::new(),
            stderr: message.into().into_bytes(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Output of a process that was killed before it exited, e.g. on timeout.
    pub fn terminated(message: impl Into<String>) -> Self {
        Self {
            status: ProcessExitStatus::Terminated,
            ..Self::spawn_failure(message)
        }
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives child process output line by line while the process runs.
pub trait OutputSink: Send + Sync {
    fn write_line(&self, stream: OutputStream, line: &str);
}

/// Emits every line as a tracing event.
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn write_line(&self, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => tracing::info!(target: "asset_bridge::output", "{line}"),
            OutputStream::Stderr => tracing::warn!(target: "asset_bridge::output", "{line}"),
        }
    }
}

pub struct NullSink;

impl OutputSink for NullSink {
    fn write_line(&self, _stream: OutputStream, _line: &str) {}
}

pub trait RunningProcess: Send + Sync {
    fn pid(&self) -> Option<u32>;

    fn wait(self: Box<Self>) -> ProcessWaitFuture;
}

pub trait ProcessExecutor: Send + Sync {
    fn spawn(
        &self,
        request: ProcessSpawnRequest,
        sink: Arc<dyn OutputSink>,
    ) -> ExecutionResult<Box<dyn RunningProcess>>;
}

pub fn spawn_validated(
    executor: &dyn ProcessExecutor,
    request: ProcessSpawnRequest,
    sink: Arc<dyn OutputSink>,
) -> ExecutionResult<Box<dyn RunningProcess>> {
    request.validate()?;
    executor.spawn(request, sink)
}

/// Spawns the request and blocks the calling thread until the process exits.
///
/// Inside a multi-thread runtime the wait runs through `block_in_place`. Without
/// a runtime a private current-thread runtime drives the child. A current-thread
/// runtime cannot be blocked in place, so the child is driven from a scoped
/// thread with its own runtime while the caller's thread waits for it.
pub fn run_to_completion(
    executor: &dyn ProcessExecutor,
    request: ProcessSpawnRequest,
    sink: Arc<dyn OutputSink>,
) -> ExecutionResult<ProcessOutput> {
    use tokio::runtime::{Handle, RuntimeFlavor};

    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            let process = spawn_validated(executor, request, sink)?;
            tokio::task::block_in_place(|| handle.block_on(process.wait()))
        }
        Ok(_) => {
            let manager = request.manager;
            let action = request.action;
            std::thread::scope(|scope| {
                scope
                    .spawn(|| run_on_private_runtime(executor, request, sink))
                    .join()
                    .unwrap_or_else(|_| {
                        Err(CoreError::new(
                            CoreErrorKind::Internal,
                            "process driver thread panicked",
                        )
                        .manager(manager)
                        .action(action))
                    })
            })
        }
        Err(_) => run_on_private_runtime(executor, request, sink),
    }
}

fn run_on_private_runtime(
    executor: &dyn ProcessExecutor,
    request: ProcessSpawnRequest,
    sink: Arc<dyn OutputSink>,
) -> ExecutionResult<ProcessOutput> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("failed to build process runtime: {error}"),
            )
            .manager(request.manager)
            .action(request.action)
        })?;
    let _guard = runtime.enter();
    let process = spawn_validated(executor, request, sink)?;
    runtime.block_on(process.wait())
}

fn invalid_input(manager: ManagerId, action: AssetAction, message: &str) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidInput, message)
        .manager(manager)
        .action(action)
}
