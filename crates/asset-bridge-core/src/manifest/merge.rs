use std::path::Path;

use crate::manifest::{AssetManifest, ManifestResult};

/// How a package is reached from the root package.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Reachability {
    /// At least one path from the root uses runtime requirements only.
    Runtime,
    /// Every path from the root crosses a development-only requirement.
    Dev,
}

/// One package's asset manifest, tagged with how the package is reached.
#[derive(Clone, Debug, PartialEq)]
pub struct ManifestFragment {
    pub package: String,
    pub manifest: AssetManifest,
    pub reachability: Reachability,
}

impl ManifestFragment {
    pub fn new(
        package: impl Into<String>,
        manifest: AssetManifest,
        reachability: Reachability,
    ) -> Self {
        Self {
            package: package.into(),
            manifest,
            reachability,
        }
    }

    pub fn read(
        package: impl Into<String>,
        path: &Path,
        reachability: Reachability,
    ) -> ManifestResult<Self> {
        Ok(Self::new(package, AssetManifest::read(path)?, reachability))
    }

    pub fn is_dev(&self) -> bool {
        self.reachability == Reachability::Dev
    }
}

/// Merges the `dependencies` of every fragment into `target`.
///
/// Runtime fragments are applied before dev fragments whatever their position in
/// `fragments`. Within one section the last writer wins. A name present in the
/// runtime section is never written to, or left in, the dev section.
pub fn merge(mut target: AssetManifest, fragments: &[ManifestFragment]) -> AssetManifest {
    for fragment in fragments.iter().filter(|fragment| !fragment.is_dev()) {
        for (name, constraint) in fragment.manifest.dependencies() {
            target.set_dependency(name, constraint);
        }
    }

    for fragment in fragments.iter().filter(|fragment| fragment.is_dev()) {
        for (name, constraint) in fragment.manifest.dependencies() {
            if !target.set_dev_dependency(name, constraint) {
                tracing::debug!(
                    package = %fragment.package,
                    dependency = name,
                    "runtime requirement takes precedence over dev requirement"
                );
            }
        }
    }

    target.sort_dependencies();
    target
}
