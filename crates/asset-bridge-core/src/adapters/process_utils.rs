use std::sync::Arc;

use crate::execution::{NullSink, ProcessExecutor, ProcessSpawnRequest, run_to_completion};

/// Stdout of a version probe, or an empty string when the probe did not succeed.
pub(crate) fn run_and_collect_version_output(
    executor: &dyn ProcessExecutor,
    request: ProcessSpawnRequest,
) -> String {
    match run_to_completion(executor, request, Arc::new(NullSink)) {
        Ok(output) if output.status.success() => output.stdout_lossy(),
        Ok(output) => {
            tracing::debug!(status = %output.status, "version probe exited unsuccessfully");
            String::new()
        }
        Err(error) => {
            tracing::debug!(%error, "version probe could not be run");
            String::new()
        }
    }
}

pub(crate) fn parse_version_output(output: &str) -> Option<String> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())?;
    let token = line.split_whitespace().next()?.trim();
    let version = token.strip_prefix('v').unwrap_or(token);
    if version.is_empty() || !version.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Some(version.to_owned())
}
