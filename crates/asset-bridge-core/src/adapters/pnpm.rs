use crate::adapters::manager::{AssetManagerAdapter, ManagerVariant};
use crate::models::{AssetAction, ManagerDescriptor, ManagerId};

pub const PNPM_DESCRIPTOR: ManagerDescriptor = ManagerDescriptor {
    id: ManagerId::Pnpm,
    display_name: "pnpm",
    binary: "pnpm",
    lock_file: "pnpm-lock.yaml",
    package_file: "package.json",
};

pub type PnpmManager = AssetManagerAdapter<Pnpm>;

#[derive(Clone, Copy, Debug, Default)]
pub struct Pnpm;

impl ManagerVariant for Pnpm {
    fn descriptor(&self) -> &'static ManagerDescriptor {
        &PNPM_DESCRIPTOR
    }

    fn subcommand(&self, action: AssetAction) -> &'static [&'static str] {
        match action {
            AssetAction::Version => &[],
            AssetAction::Check => &["ls", "--depth=0"],
            AssetAction::Install => &["install"],
            AssetAction::Update => &["update"],
        }
    }

    // pnpm asks before purging a node_modules directory it did not create.
    fn non_interactive_flag(&self) -> &'static str {
        "--config.confirmModulesPurge=false"
    }

    fn production_flag(&self) -> &'static str {
        "--prod"
    }
}
