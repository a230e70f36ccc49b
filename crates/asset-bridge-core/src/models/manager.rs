use std::fmt::{Display, Formatter};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum ManagerId {
    Npm,
    Yarn,
    Pnpm,
}

impl ManagerId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
        }
    }
}

impl Display for ManagerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands an asset manager can be asked to run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AssetAction {
    Version,
    Check,
    Install,
    Update,
}

impl AssetAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Check => "check",
            Self::Install => "install",
            Self::Update => "update",
        }
    }

    pub fn is_mutating(self) -> bool {
        matches!(self, Self::Install | Self::Update)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManagerDescriptor {
    pub id: ManagerId,
    pub display_name: &'static str,
    pub binary: &'static str,
    pub lock_file: &'static str,
    pub package_file: &'static str,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DetectionInfo {
    pub manager: ManagerId,
    pub installed: bool,
    pub executable_path: Option<PathBuf>,
    pub version: Option<String>,
}
