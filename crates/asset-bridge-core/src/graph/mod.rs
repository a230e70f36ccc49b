//! Read-only view of the host's resolved package graph.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use serde::Deserialize;

use crate::manifest::Reachability;
use crate::models::{CoreError, CoreErrorKind, PackageNode, RequirementMap, RootPackage};

pub type GraphResult<T> = Result<T, CoreError>;

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PackageGraph {
    pub root: RootPackage,
    pub packages: Vec<PackageNode>,
}

impl PackageGraph {
    pub fn new(root: RootPackage) -> Self {
        Self {
            root,
            packages: Vec::new(),
        }
    }

    pub fn package(mut self, package: PackageNode) -> Self {
        self.packages.push(package);
        self
    }

    pub fn parse(raw: &str) -> GraphResult<Self> {
        serde_json::from_str(raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::ParseFailure,
                format!("invalid package graph: {error}"),
            )
        })
    }

    /// Loads a serialized graph and resolves relative paths against the file's directory.
    pub fn load(path: &Path) -> GraphResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            CoreError::storage(format!(
                "failed to read package graph {}: {error}",
                path.display()
            ))
        })?;
        let mut graph = Self::parse(&raw)?;
        if let Some(base) = path.parent() {
            graph.resolve_paths(base);
        }
        Ok(graph)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &Path| {
            if path.is_relative() {
                base.join(path)
            } else {
                path.to_path_buf()
            }
        };

        self.root.package.install_path = resolve(&self.root.package.install_path);
        if let Some(dir) = self.root.asset_manifest_dir.take() {
            self.root.asset_manifest_dir = Some(resolve(&dir));
        }
        for package in &mut self.packages {
            package.install_path = resolve(&package.install_path);
        }
    }

    /// Installed packages in canonical order, without the root package.
    pub fn dependencies(&self) -> impl Iterator<Item = &PackageNode> {
        let root = self.root.name().to_ascii_lowercase();
        self.packages
            .iter()
            .filter(move |package| package.name.to_ascii_lowercase() != root)
    }

    /// Classifies every installed package as runtime or dev reachable.
    ///
    /// Runtime reachability is computed first over runtime edges only; a package
    /// is dev only when it is reached from the root's dev requirements and never
    /// through that first walk. Unreached packages count as runtime.
    pub fn classify(&self) -> Classification {
        let index: HashMap<String, &PackageNode> = self
            .packages
            .iter()
            .map(|package| (package.name.to_ascii_lowercase(), package))
            .collect();

        let runtime = walk(&index, &self.root.package.requires, &HashSet::new());
        let dev = walk(&index, &self.root.package.dev_requires, &runtime);

        Classification { dev }
    }
}

/// Reachability of every package of one graph, computed once per solve.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Classification {
    dev: HashSet<String>,
}

impl Classification {
    pub fn reachability(&self, name: &str) -> Reachability {
        if self.dev.contains(&name.to_ascii_lowercase()) {
            Reachability::Dev
        } else {
            Reachability::Runtime
        }
    }
}

fn walk(
    index: &HashMap<String, &PackageNode>,
    start: &RequirementMap,
    excluded: &HashSet<String>,
) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<String> =
        start.keys().map(|name| name.to_ascii_lowercase()).collect();

    while let Some(name) = queue.pop_front() {
        if excluded.contains(&name) || !seen.insert(name.clone()) {
            continue;
        }
        if let Some(package) = index.get(&name) {
            queue.extend(package.requires.keys().map(|dep| dep.to_ascii_lowercase()));
        }
    }

    seen
}
