use crate::adapters::manager::{AssetManagerAdapter, ManagerVariant};
use crate::models::{AssetAction, ManagerDescriptor, ManagerId};

pub const YARN_DESCRIPTOR: ManagerDescriptor = ManagerDescriptor {
    id: ManagerId::Yarn,
    display_name: "Yarn (classic)",
    binary: "yarn",
    lock_file: "yarn.lock",
    package_file: "package.json",
};

pub type YarnManager = AssetManagerAdapter<Yarn>;

#[derive(Clone, Copy, Debug, Default)]
pub struct Yarn;

impl ManagerVariant for Yarn {
    fn descriptor(&self) -> &'static ManagerDescriptor {
        &YARN_DESCRIPTOR
    }

    fn subcommand(&self, action: AssetAction) -> &'static [&'static str] {
        match action {
            AssetAction::Version => &[],
            AssetAction::Check => &["check"],
            AssetAction::Install => &["install"],
            AssetAction::Update => &["upgrade"],
        }
    }

    fn non_interactive_flag(&self) -> &'static str {
        "--non-interactive"
    }

    fn production_flag(&self) -> &'static str {
        "--prod"
    }
}
