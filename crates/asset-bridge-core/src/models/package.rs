use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

/// Requirement map keyed by package name, valued by version constraint.
pub type RequirementMap = BTreeMap<String, String>;

/// One resolved package of the host dependency graph.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PackageNode {
    pub name: String,
    #[serde(rename = "require")]
    pub requires: RequirementMap,
    #[serde(rename = "require-dev")]
    pub dev_requires: RequirementMap,
    pub install_path: PathBuf,
}

impl PackageNode {
    pub fn new(name: impl Into<String>, install_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            install_path: install_path.into(),
            ..Self::default()
        }
    }

    pub fn require(mut self, name: impl Into<String>, constraint: impl Into<String>) -> Self {
        self.requires.insert(name.into(), constraint.into());
        self
    }

    pub fn require_dev(mut self, name: impl Into<String>, constraint: impl Into<String>) -> Self {
        self.dev_requires.insert(name.into(), constraint.into());
        self
    }
}

/// The top-level host package that owns the target asset manifest.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RootPackage {
    #[serde(flatten)]
    pub package: PackageNode,
    /// Directory holding the target asset manifest, when the root declares one.
    pub asset_manifest_dir: Option<PathBuf>,
    pub extra: serde_json::Map<String, Value>,
}

impl RootPackage {
    pub fn new(package: PackageNode) -> Self {
        Self {
            package,
            asset_manifest_dir: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn asset_manifest_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.asset_manifest_dir = Some(dir.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.package.name
    }
}
