//! One solve: merge package fragments into the root asset manifest, then run the
//! asset manager and restore the guarded files if it fails.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::{AssetManager, ensure_version_matches};
use crate::config::{BridgeConfig, FragmentPolicy};
use crate::execution::{OutputSink, ProcessExitStatus, ProcessOutput};
use crate::fallback::{FallbackGuard, NoopFallback, Snapshot};
use crate::graph::PackageGraph;
use crate::manifest::{AssetManifest, ManifestFragment, merge};
use crate::models::{AssetAction, CoreError, ManagerId};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SolveOutcome {
    Disabled,
    NoManifestTarget,
    /// The manifest was merged and running the asset manager is switched off.
    Merged,
    Completed { action: AssetAction },
}

#[derive(Debug, thiserror::Error)]
pub enum SolveError {
    #[error("The asset manager ended with an error: {manager} finished with {status}")]
    AssetManagerFailed {
        manager: ManagerId,
        status: ProcessExitStatus,
        output: String,
    },
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl SolveError {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::AssetManagerFailed { status, .. } => status.code(),
            Self::Core(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SolveState {
    Disabled,
    NoManifestTarget,
    Merging,
    Installing,
    Updating,
    Failed,
    Succeeded,
}

pub struct Solver {
    manager: Box<dyn AssetManager>,
    config: BridgeConfig,
    fallback: Arc<dyn FallbackGuard>,
}

impl Solver {
    pub fn new(manager: Box<dyn AssetManager>, config: BridgeConfig) -> Self {
        Self {
            manager,
            config,
            fallback: Arc::new(NoopFallback),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackGuard>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn set_updatable(&mut self, updatable: bool) {
        self.manager.set_updatable(updatable);
    }

    pub fn manager(&self) -> &dyn AssetManager {
        self.manager.as_ref()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn target_dir(&self, graph: &PackageGraph) -> Option<PathBuf> {
        resolve_target_dir(&self.config, graph)
    }

    pub fn solve(
        &self,
        graph: &PackageGraph,
        sink: Arc<dyn OutputSink>,
    ) -> Result<SolveOutcome, SolveError> {
        if !self.config.enabled {
            self.transition(SolveState::Disabled);
            self.transition(SolveState::Succeeded);
            return Ok(SolveOutcome::Disabled);
        }

        let Some(dir) = self.target_dir(graph) else {
            self.transition(SolveState::NoManifestTarget);
            self.transition(SolveState::Succeeded);
            return Ok(SolveOutcome::NoManifestTarget);
        };

        if let Some(requirement) = self
            .config
            .manager_version
            .as_deref()
            .map(str::trim)
            .filter(|requirement| !requirement.is_empty())
        {
            let version = ensure_version_matches(self.manager.as_ref(), &dir, requirement)?;
            tracing::debug!(
                manager = self.manager.name(),
                %version,
                "asset manager version accepted"
            );
        }

        self.transition(SolveState::Merging);
        let snapshot = self.fallback.snapshot()?;
        self.merge_manifest(graph, &dir)?;

        if !self.config.run_asset_manager {
            tracing::info!(
                dir = %dir.display(),
                "asset manager run is disabled, manifest merged only"
            );
            self.transition(SolveState::Succeeded);
            return Ok(SolveOutcome::Merged);
        }

        let action = self.choose_action(&dir);
        self.transition(match action {
            AssetAction::Update => SolveState::Updating,
            _ => SolveState::Installing,
        });

        let output = self.manager.run(action, &dir, sink);
        if !output.status.success() {
            self.transition(SolveState::Failed);
            self.restore(snapshot);
            return Err(SolveError::AssetManagerFailed {
                manager: self.manager.descriptor().id,
                status: output.status,
                output: failure_output(&output),
            });
        }

        self.transition(SolveState::Succeeded);
        Ok(SolveOutcome::Completed { action })
    }

    fn merge_manifest(&self, graph: &PackageGraph, dir: &Path) -> Result<(), SolveError> {
        let path = dir.join(self.manager.package_name());
        let fragments = self.collect_fragments(graph, &path)?;
        let current = AssetManifest::read_or_default(&path)?;
        let merged = merge(current.clone(), &fragments);

        if merged == current && path.is_file() {
            tracing::debug!(path = %path.display(), "asset manifest already up to date");
            return Ok(());
        }

        merged.write_atomic(&path)?;
        tracing::info!(
            path = %path.display(),
            fragments = fragments.len(),
            "wrote merged asset manifest"
        );
        Ok(())
    }

    fn collect_fragments(
        &self,
        graph: &PackageGraph,
        target: &Path,
    ) -> Result<Vec<ManifestFragment>, SolveError> {
        let classification = graph.classify();
        let mut fragments = Vec::new();

        for package in graph.dependencies() {
            if !self.config.is_package_enabled(&package.name) {
                tracing::debug!(package = %package.name, "package disabled by enable-packages");
                continue;
            }

            let path = package.install_path.join(self.manager.package_name());
            if path == target || !path.is_file() {
                continue;
            }

            let reachability = classification.reachability(&package.name);
            match ManifestFragment::read(&package.name, &path, reachability) {
                Ok(fragment) => fragments.push(fragment),
                Err(error) if self.config.fragment_policy == FragmentPolicy::Skip => {
                    tracing::warn!(
                        package = %package.name,
                        %error,
                        "skipping unreadable asset manifest fragment"
                    );
                }
                Err(error) => return Err(error.into()),
            }
        }

        Ok(fragments)
    }

    fn choose_action(&self, dir: &Path) -> AssetAction {
        if self.manager.is_updatable()
            && self.manager.is_installed(dir)
            && self.manager.is_valid_for_update(dir)
        {
            AssetAction::Update
        } else {
            AssetAction::Install
        }
    }

    fn restore(&self, snapshot: Snapshot) {
        if let Err(error) = self.fallback.restore(snapshot) {
            tracing::error!(%error, "failed to restore files after asset manager failure");
        }
    }

    fn transition(&self, state: SolveState) {
        tracing::info!(manager = self.manager.name(), state = ?state, "asset solve");
    }
}

/// Directory of the target manifest: `asset-dir` when configured, resolved
/// against the root package, else the root's declared manifest directory.
pub fn resolve_target_dir(config: &BridgeConfig, graph: &PackageGraph) -> Option<PathBuf> {
    match &config.asset_dir {
        Some(dir) if dir.is_relative() => Some(graph.root.package.install_path.join(dir)),
        Some(dir) => Some(dir.clone()),
        None => graph.root.asset_manifest_dir.clone(),
    }
}

fn failure_output(output: &ProcessOutput) -> String {
    let stderr = output.stderr_lossy();
    if stderr.trim().is_empty() {
        output.stdout_lossy().trim().to_string()
    } else {
        stderr.trim().to_string()
    }
}
