use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::execution::{
    ExecutionResult, OutputSink, OutputStream, ProcessExecutor, ProcessExitStatus, ProcessOutput,
    ProcessSpawnRequest, ProcessWaitFuture, RunningProcess,
};
use crate::models::{AssetAction, CoreError, CoreErrorKind};

/// Executor double that answers each action with a scripted exit code and stdout.
#[derive(Clone, Default)]
pub(crate) struct ScriptedExecutor {
    requests: Arc<Mutex<Vec<ProcessSpawnRequest>>>,
    exit_codes: HashMap<AssetAction, i32>,
    stdout: HashMap<AssetAction, String>,
    missing_binary: bool,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn exit_code(mut self, action: AssetAction, code: i32) -> Self {
        self.exit_codes.insert(action, code);
        self
    }

    pub(crate) fn stdout(mut self, action: AssetAction, stdout: &str) -> Self {
        self.stdout.insert(action, stdout.to_string());
        self
    }

    pub(crate) fn missing_binary(mut self) -> Self {
        self.missing_binary = true;
        self
    }

    pub(crate) fn requests(&self) -> Vec<ProcessSpawnRequest> {
        self.requests.lock().unwrap().clone()
    }
}

struct ScriptedProcess {
    output: ProcessOutput,
}

impl RunningProcess for ScriptedProcess {
    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    fn wait(self: Box<Self>) -> ProcessWaitFuture {
        let output = self.output.clone();
        Box::pin(async move { Ok(output) })
    }
}

impl ProcessExecutor for ScriptedExecutor {
    fn spawn(
        &self,
        request: ProcessSpawnRequest,
        sink: Arc<dyn OutputSink>,
    ) -> ExecutionResult<Box<dyn RunningProcess>> {
        let action = request.action;
        self.requests.lock().unwrap().push(request);

        if self.missing_binary {
            return Err(CoreError::new(
                CoreErrorKind::NotInstalled,
                "failed to spawn: No such file or directory",
            ));
        }

        let stdout = self.stdout.get(&action).cloned().unwrap_or_default();
        for line in stdout.lines() {
            sink.write_line(OutputStream::Stdout, line);
        }

        let now = SystemTime::now();
        Ok(Box::new(ScriptedProcess {
            output: ProcessOutput {
                status: ProcessExitStatus::ExitCode(
                    self.exit_codes.get(&action).copied().unwrap_or(0),
                ),
                stdout: stdout.into_bytes(),
                stderr: Vec::new(),
                started_at: now,
                finished_at: now,
            },
        }))
    }
}
