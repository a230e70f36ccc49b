use std::path::Path;
use std::sync::Arc;

use crate::adapters::{
    AdapterOptions, AssetManager, NPM_DESCRIPTOR, Npm, NpmManager, PNPM_DESCRIPTOR, Pnpm,
    PnpmManager, YARN_DESCRIPTOR, Yarn, YarnManager,
};
use crate::execution::ProcessExecutor;
use crate::models::{CoreError, CoreErrorKind, ManagerDescriptor, ManagerId};

/// Lock-file detection order: the first variant whose lock file exists wins.
const ALL_MANAGERS: [&ManagerDescriptor; 3] =
    [&YARN_DESCRIPTOR, &PNPM_DESCRIPTOR, &NPM_DESCRIPTOR];

pub const DEFAULT_MANAGER: ManagerId = ManagerId::Npm;

pub fn descriptors() -> impl Iterator<Item = &'static ManagerDescriptor> {
    ALL_MANAGERS.into_iter()
}

pub fn descriptor(id: ManagerId) -> &'static ManagerDescriptor {
    match id {
        ManagerId::Npm => &NPM_DESCRIPTOR,
        ManagerId::Yarn => &YARN_DESCRIPTOR,
        ManagerId::Pnpm => &PNPM_DESCRIPTOR,
    }
}

pub fn find_by_name(name: &str) -> Option<ManagerId> {
    let name = name.trim();
    descriptors()
        .find(|descriptor| descriptor.id.as_str().eq_ignore_ascii_case(name))
        .map(|descriptor| descriptor.id)
}

pub fn detect_from_lock_files(dir: &Path) -> Option<ManagerId> {
    descriptors()
        .find(|descriptor| dir.join(descriptor.lock_file).is_file())
        .map(|descriptor| descriptor.id)
}

/// Picks the manager for `dir`: an explicitly configured name, then an existing
/// lock file, then npm.
pub fn select_manager(configured: Option<&str>, dir: &Path) -> Result<ManagerId, CoreError> {
    if let Some(name) = configured.filter(|name| !name.trim().is_empty()) {
        return find_by_name(name).ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!(
                    "unknown asset manager '{name}', expected one of: {}",
                    descriptors()
                        .map(|descriptor| descriptor.id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )
        });
    }

    let selected = detect_from_lock_files(dir).unwrap_or(DEFAULT_MANAGER);
    tracing::debug!(manager = %selected, dir = %dir.display(), "selected asset manager");
    Ok(selected)
}

pub fn build_manager(
    id: ManagerId,
    executor: Arc<dyn ProcessExecutor>,
    options: AdapterOptions,
) -> Box<dyn AssetManager> {
    match id {
        ManagerId::Npm => Box::new(NpmManager::new(Npm, executor, options)),
        ManagerId::Yarn => Box::new(YarnManager::new(Yarn, executor, options)),
        ManagerId::Pnpm => Box::new(PnpmManager::new(Pnpm, executor, options)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedExecutor;

    #[test]
    fn descriptor_lookup_is_consistent() {
        for descriptor in descriptors() {
            assert_eq!(super::descriptor(descriptor.id), descriptor);
            assert_eq!(find_by_name(descriptor.id.as_str()), Some(descriptor.id));
        }
        assert_eq!(find_by_name("YARN"), Some(ManagerId::Yarn));
        assert_eq!(find_by_name("bower"), None);
    }

    #[test]
    fn configured_name_wins_over_lock_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("yarn.lock"), "").unwrap();

        assert_eq!(
            select_manager(Some("pnpm"), dir.path()).unwrap(),
            ManagerId::Pnpm
        );
        assert_eq!(select_manager(None, dir.path()).unwrap(), ManagerId::Yarn);
    }

    #[test]
    fn falls_back_to_npm_without_lock_files() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(select_manager(None, dir.path()).unwrap(), ManagerId::Npm);
        assert_eq!(select_manager(Some(" "), dir.path()).unwrap(), ManagerId::Npm);
    }

    #[test]
    fn unknown_configured_name_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let error = select_manager(Some("bower"), dir.path()).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
        assert!(error.message.contains("yarn, pnpm, npm"));
    }

    #[test]
    fn built_manager_reports_its_descriptor() {
        let manager = build_manager(
            ManagerId::Pnpm,
            Arc::new(ScriptedExecutor::new()),
            AdapterOptions::default(),
        );
        assert_eq!(manager.name(), "pnpm");
        assert_eq!(manager.lock_package_name(), "pnpm-lock.yaml");
        assert_eq!(manager.package_name(), "package.json");
    }
}
