use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::detect_utils::find_executable;
use crate::adapters::process_utils::{parse_version_output, run_and_collect_version_output};
use crate::execution::{
    CommandSpec, NullSink, OutputSink, ProcessExecutor, ProcessOutput, ProcessSpawnRequest,
    run_to_completion,
};
use crate::models::{
    AssetAction, CoreError, CoreErrorKind, DetectionInfo, ManagerDescriptor, ManagerId,
};

pub type AdapterResult<T> = Result<T, CoreError>;

/// Directory whose presence is the base "installed" signal for every variant.
pub const INSTALLED_DIR: &str = "node_modules";

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);
const CHECK_TIMEOUT: Duration = Duration::from_secs(120);

/// Capability shared by every supported JavaScript package manager.
pub trait AssetManager: Send + Sync {
    fn descriptor(&self) -> &ManagerDescriptor;

    fn name(&self) -> &'static str {
        self.descriptor().id.as_str()
    }

    fn lock_package_name(&self) -> &'static str {
        self.descriptor().lock_file
    }

    fn package_name(&self) -> &'static str {
        self.descriptor().package_file
    }

    fn is_dev_mode(&self) -> bool;

    /// True only when the dependency directory, the manifest and the lock file all exist.
    fn is_installed(&self, working_dir: &Path) -> bool;

    /// Runs the read-only validation command. Any failure, including a missing binary, is `false`.
    fn is_valid_for_update(&self, working_dir: &Path) -> bool;

    fn is_updatable(&self) -> bool;

    fn set_updatable(&mut self, updatable: bool);

    fn version(&self, working_dir: &Path) -> Option<String>;

    fn detect(&self, working_dir: &Path) -> DetectionInfo;

    /// Builds the command for `action` and runs it in `working_dir`.
    ///
    /// Never fails: a process that cannot be started reports exit code 127 and
    /// one killed on timeout reports `ProcessExitStatus::Terminated`.
    fn run(
        &self,
        action: AssetAction,
        working_dir: &Path,
        sink: Arc<dyn OutputSink>,
    ) -> ProcessOutput;
}

/// Variant-specific pieces of command construction.
pub trait ManagerVariant: Send + Sync {
    fn descriptor(&self) -> &'static ManagerDescriptor;

    fn subcommand(&self, action: AssetAction) -> &'static [&'static str];

    /// Flag that disables every interactive prompt of the tool.
    fn non_interactive_flag(&self) -> &'static str;

    /// Flag that excludes development-only dependencies.
    fn production_flag(&self) -> &'static str;

    fn env(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AdapterOptions {
    pub dev_mode: bool,
    pub binary: Option<PathBuf>,
    pub global_options: Vec<String>,
    pub install_options: Vec<String>,
    pub update_options: Vec<String>,
    pub timeout: Option<Duration>,
    /// PATH value used to locate the binary during detection.
    pub search_path: Option<OsString>,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            dev_mode: true,
            binary: None,
            global_options: Vec::new(),
            install_options: Vec::new(),
            update_options: Vec::new(),
            timeout: None,
            search_path: None,
        }
    }
}

impl AdapterOptions {
    pub fn dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    pub fn binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub struct AssetManagerAdapter<V: ManagerVariant> {
    variant: V,
    executor: Arc<dyn ProcessExecutor>,
    options: AdapterOptions,
    updatable: bool,
}

impl<V: ManagerVariant> AssetManagerAdapter<V> {
    pub fn new(variant: V, executor: Arc<dyn ProcessExecutor>, options: AdapterOptions) -> Self {
        Self {
            variant,
            executor,
            options,
            updatable: false,
        }
    }

    /// The fully assembled spawn request for `action` in `working_dir`.
    pub fn request(&self, action: AssetAction, working_dir: &Path) -> ProcessSpawnRequest {
        let command = build_command(&self.variant, &self.options, action).working_dir(working_dir);
        let timeout = match action {
            AssetAction::Version => Some(VERSION_TIMEOUT),
            AssetAction::Check => Some(CHECK_TIMEOUT),
            AssetAction::Install | AssetAction::Update => self.options.timeout,
        };

        let request = ProcessSpawnRequest::new(self.variant.descriptor().id, action, command);
        match timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }
}

impl<V: ManagerVariant> AssetManager for AssetManagerAdapter<V> {
    fn descriptor(&self) -> &ManagerDescriptor {
        self.variant.descriptor()
    }

    fn is_dev_mode(&self) -> bool {
        self.options.dev_mode
    }

    fn is_installed(&self, working_dir: &Path) -> bool {
        base_installed(working_dir, self.package_name())
            && working_dir.join(self.lock_package_name()).is_file()
    }

    fn is_valid_for_update(&self, working_dir: &Path) -> bool {
        let request = self.request(AssetAction::Check, working_dir);
        match run_to_completion(self.executor.as_ref(), request, Arc::new(NullSink)) {
            Ok(output) => output.status.success(),
            Err(error) => {
                tracing::debug!(manager = self.name(), %error, "update validation did not run");
                false
            }
        }
    }

    fn is_updatable(&self) -> bool {
        self.updatable
    }

    fn set_updatable(&mut self, updatable: bool) {
        self.updatable = updatable;
    }

    fn version(&self, working_dir: &Path) -> Option<String> {
        let request = self.request(AssetAction::Version, working_dir);
        let output = run_and_collect_version_output(self.executor.as_ref(), request);
        parse_version_output(&output)
    }

    fn detect(&self, working_dir: &Path) -> DetectionInfo {
        let binary = match &self.options.binary {
            Some(binary) => binary.to_string_lossy().into_owned(),
            None => self.variant.descriptor().binary.to_string(),
        };
        let executable_path = find_executable(&binary, self.options.search_path.as_deref());
        let version = self.version(working_dir);
        DetectionInfo {
            manager: self.variant.descriptor().id,
            installed: executable_path.is_some() || version.is_some(),
            executable_path,
            version,
        }
    }

    fn run(
        &self,
        action: AssetAction,
        working_dir: &Path,
        sink: Arc<dyn OutputSink>,
    ) -> ProcessOutput {
        let request = self.request(action, working_dir);
        tracing::info!(
            manager = self.name(),
            action = action.as_str(),
            dir = %working_dir.display(),
            command = %request.command.display_line(),
            "running asset manager"
        );

        match run_to_completion(self.executor.as_ref(), request, sink) {
            Ok(output) => output,
            Err(error) if error.kind == CoreErrorKind::Timeout => {
                tracing::error!(manager = self.name(), %error, "asset manager was killed");
                ProcessOutput::terminated(error.message)
            }
            Err(error) => {
                tracing::error!(manager = self.name(), %error, "asset manager could not be run");
                ProcessOutput::spawn_failure(error.message)
            }
        }
    }
}

/// Assembles binary, subcommand, non-interactive flag, configured options and
/// the production flag, in that order.
pub fn build_command<V: ManagerVariant + ?Sized>(
    variant: &V,
    options: &AdapterOptions,
    action: AssetAction,
) -> CommandSpec {
    let binary = options
        .binary
        .clone()
        .unwrap_or_else(|| PathBuf::from(variant.descriptor().binary));
    let mut command = CommandSpec::new(binary);
    for (key, value) in variant.env() {
        command = command.env(*key, *value);
    }

    if action == AssetAction::Version {
        return command.arg("--version");
    }

    command = command
        .args(variant.subcommand(action).iter().copied())
        .arg(variant.non_interactive_flag());

    if !action.is_mutating() {
        return command;
    }

    command = command.args(options.global_options.iter().cloned());
    command = match action {
        AssetAction::Install => command.args(options.install_options.iter().cloned()),
        AssetAction::Update => command.args(options.update_options.iter().cloned()),
        AssetAction::Version | AssetAction::Check => command,
    };

    if !options.dev_mode {
        command = command.arg(variant.production_flag());
    }

    command
}

pub fn base_installed(working_dir: &Path, package_file: &str) -> bool {
    working_dir.join(INSTALLED_DIR).is_dir() && working_dir.join(package_file).is_file()
}

/// Checks the tool's reported version against a requirement such as `^1.22 || ^4.0`.
pub fn ensure_version_matches(
    manager: &dyn AssetManager,
    working_dir: &Path,
    requirement: &str,
) -> AdapterResult<semver::Version> {
    let id = manager.descriptor().id;
    let alternatives = parse_requirement(id, requirement)?;

    let Some(raw) = manager.version(working_dir) else {
        return Err(CoreError::new(
            CoreErrorKind::NotInstalled,
            format!("the binary of '{}' must be installed", manager.name()),
        )
        .manager(id)
        .action(AssetAction::Version));
    };

    let version = semver::Version::parse(&raw).map_err(|error| {
        CoreError::new(
            CoreErrorKind::ParseFailure,
            format!("unrecognized {} version '{raw}': {error}", manager.name()),
        )
        .manager(id)
        .action(AssetAction::Version)
    })?;

    if alternatives.iter().any(|req| req.matches(&version)) {
        Ok(version)
    } else {
        Err(CoreError::new(
            CoreErrorKind::IncompatibleVersion,
            format!(
                "the installed {} version '{version}' doesn't match the requirement '{requirement}'",
                manager.name()
            ),
        )
        .manager(id)
        .action(AssetAction::Version))
    }
}

fn parse_requirement(
    manager: ManagerId,
    requirement: &str,
) -> AdapterResult<Vec<semver::VersionReq>> {
    requirement
        .split("||")
        .map(str::trim)
        .map(|part| {
            semver::VersionReq::parse(part).map_err(|error| {
                CoreError::new(
                    CoreErrorKind::InvalidInput,
                    format!("invalid version requirement '{requirement}': {error}"),
                )
                .manager(manager)
                .action(AssetAction::Version)
            })
        })
        .collect()
}
