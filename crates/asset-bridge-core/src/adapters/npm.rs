use crate::adapters::manager::{AssetManagerAdapter, ManagerVariant};
use crate::models::{AssetAction, ManagerDescriptor, ManagerId};

pub const NPM_DESCRIPTOR: ManagerDescriptor = ManagerDescriptor {
    id: ManagerId::Npm,
    display_name: "npm",
    binary: "npm",
    lock_file: "package-lock.json",
    package_file: "package.json",
};

pub type NpmManager = AssetManagerAdapter<Npm>;

#[derive(Clone, Copy, Debug, Default)]
pub struct Npm;

impl ManagerVariant for Npm {
    fn descriptor(&self) -> &'static ManagerDescriptor {
        &NPM_DESCRIPTOR
    }

    fn subcommand(&self, action: AssetAction) -> &'static [&'static str] {
        match action {
            AssetAction::Version => &[],
            AssetAction::Check => &["ls", "--depth=0"],
            AssetAction::Install => &["install"],
            AssetAction::Update => &["update"],
        }
    }

    fn non_interactive_flag(&self) -> &'static str {
        "--yes"
    }

    fn production_flag(&self) -> &'static str {
        "--omit=dev"
    }

    fn env(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("NPM_CONFIG_UPDATE_NOTIFIER", "false"),
            ("NPM_CONFIG_FUND", "false"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::adapters::manager::{AdapterOptions, AssetManager};
    use crate::test_support::ScriptedExecutor;

    #[test]
    fn request_builders_use_expected_commands() {
        let npm = NpmManager::new(
            Npm,
            Arc::new(ScriptedExecutor::new()),
            AdapterOptions::default(),
        );
        let dir = Path::new("/srv/app");

        assert_eq!(
            npm.request(AssetAction::Check, dir).command.args,
            vec!["ls", "--depth=0", "--yes"]
        );
        assert_eq!(
            npm.request(AssetAction::Install, dir).command.args,
            vec!["install", "--yes"]
        );
        assert_eq!(
            npm.request(AssetAction::Update, dir).command.args,
            vec!["update", "--yes"]
        );

        let install = npm.request(AssetAction::Install, dir);
        assert_eq!(
            install.command.env.get("NPM_CONFIG_FUND").map(String::as_str),
            Some("false")
        );
    }

    #[test]
    fn production_mode_omits_dev_dependencies() {
        let npm = NpmManager::new(
            Npm,
            Arc::new(ScriptedExecutor::new()),
            AdapterOptions::default().dev_mode(false),
        );

        assert_eq!(
            npm.request(AssetAction::Install, Path::new("/srv/app"))
                .command
                .args,
            vec!["install", "--yes", "--omit=dev"]
        );
        assert!(!npm.is_dev_mode());
    }

    #[test]
    fn installed_uses_package_lock() {
        let dir = tempfile::tempdir().unwrap();
        let npm = NpmManager::new(
            Npm,
            Arc::new(ScriptedExecutor::new()),
            AdapterOptions::default(),
        );
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("yarn.lock"), "").unwrap();
        assert!(!npm.is_installed(dir.path()));

        std::fs::write(dir.path().join("package-lock.json"), "{}").unwrap();
        assert!(npm.is_installed(dir.path()));
        assert_eq!(npm.lock_package_name(), "package-lock.json");
    }
}
