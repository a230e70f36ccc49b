//! Snapshot and restore of the files an asset manager run may leave inconsistent.

use std::path::{Path, PathBuf};

use crate::manifest::write_file_atomic;
use crate::models::{CoreError, ManagerDescriptor};

pub type FallbackResult<T> = Result<T, CoreError>;

/// Host lock and installed listings captured by [`FileFallback::for_host_state`].
pub const HOST_STATE_FILES: [&str; 2] = ["composer.lock", "vendor/composer/installed.json"];

/// Captured content of each guarded file; `None` records that the file was absent.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Snapshot {
    entries: Vec<(PathBuf, Option<Vec<u8>>)>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contents(&self, path: &Path) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == path)
            .and_then(|(_, contents)| contents.as_deref())
    }
}

pub trait FallbackGuard: Send + Sync {
    fn snapshot(&self) -> FallbackResult<Snapshot>;

    /// Puts every captured file back. Restoring an empty snapshot does nothing.
    fn restore(&self, snapshot: Snapshot) -> FallbackResult<()>;
}

pub struct NoopFallback;

impl FallbackGuard for NoopFallback {
    fn snapshot(&self) -> FallbackResult<Snapshot> {
        Ok(Snapshot::empty())
    }

    fn restore(&self, _snapshot: Snapshot) -> FallbackResult<()> {
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileFallback {
    paths: Vec<PathBuf>,
}

impl FileFallback {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut fallback = Self::default();
        fallback.extend(paths);
        fallback
    }

    /// The asset manifest and lock file of `descriptor` inside `dir`.
    pub fn for_asset_manifest(dir: &Path, descriptor: &ManagerDescriptor) -> Self {
        Self::new([
            dir.join(descriptor.package_file),
            dir.join(descriptor.lock_file),
        ])
    }

    pub fn for_host_state(root_dir: &Path) -> Self {
        Self::new(HOST_STATE_FILES.iter().map(|file| root_dir.join(file)))
    }

    pub fn with(mut self, other: FileFallback) -> Self {
        self.extend(other.paths);
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn extend(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        for path in paths {
            if !self.paths.contains(&path) {
                self.paths.push(path);
            }
        }
    }
}

impl FallbackGuard for FileFallback {
    fn snapshot(&self) -> FallbackResult<Snapshot> {
        let mut entries = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let contents = match std::fs::read(path) {
                Ok(contents) => Some(contents),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
                Err(error) => {
                    return Err(CoreError::storage(format!(
                        "failed to snapshot {}: {error}",
                        path.display()
                    )));
                }
            };
            entries.push((path.clone(), contents));
        }

        tracing::debug!(files = entries.len(), "captured fallback snapshot");
        Ok(Snapshot { entries })
    }

    /// Restores every entry, then reports the first failure if any.
    fn restore(&self, snapshot: Snapshot) -> FallbackResult<()> {
        let mut first_error = None;
        for (path, contents) in snapshot.entries {
            let restored = match contents {
                Some(contents) => write_file_atomic(&path, &contents),
                None => match std::fs::remove_file(&path) {
                    Ok(()) => Ok(()),
                    Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(error) => Err(CoreError::storage(format!(
                        "failed to remove {}: {error}",
                        path.display()
                    ))),
                },
            };
            match restored {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "restored file from fallback snapshot")
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "failed to restore file");
                    first_error.get_or_insert(error);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::YARN_DESCRIPTOR;
    use crate::models::CoreErrorKind;

    #[test]
    fn restore_continues_past_a_failed_entry() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("package.json");
        let lock = dir.path().join("composer.lock");
        std::fs::write(&manifest, "{}\n").unwrap();

        let fallback = FileFallback::new([manifest.clone(), lock.clone()]);
        let snapshot = fallback.snapshot().unwrap();

        std::fs::remove_file(&manifest).unwrap();
        std::fs::create_dir(&manifest).unwrap();
        std::fs::write(manifest.join("occupied"), "").unwrap();
        std::fs::write(&lock, "{\"packages\": []}").unwrap();

        let error = fallback.restore(snapshot).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::StorageFailure);
        assert!(!lock.exists());
    }

    #[test]
    fn restore_rewrites_changed_files_and_removes_created_ones() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("package.json");
        let lock = dir.path().join("yarn.lock");
        std::fs::write(&manifest, "{\"name\": \"app\"}\n").unwrap();

        let fallback = FileFallback::for_asset_manifest(dir.path(), &YARN_DESCRIPTOR);
        let snapshot = fallback.snapshot().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.contents(&lock), None);

        std::fs::write(&manifest, "{\"name\": \"broken\"").unwrap();
        std::fs::write(&lock, "partial").unwrap();
        fallback.restore(snapshot).unwrap();

        assert_eq!(
            std::fs::read_to_string(&manifest).unwrap(),
            "{\"name\": \"app\"}\n"
        );
        assert!(!lock.exists());
    }

    #[test]
    fn restore_is_safe_when_nothing_changed() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = FileFallback::for_host_state(dir.path());

        let snapshot = fallback.snapshot().unwrap();
        fallback.restore(snapshot).unwrap();
        assert!(!dir.path().join("composer.lock").exists());

        NoopFallback.restore(Snapshot::empty()).unwrap();
        assert!(NoopFallback.snapshot().unwrap().is_empty());
    }

    #[test]
    fn combined_guards_keep_each_path_once() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = FileFallback::for_asset_manifest(dir.path(), &YARN_DESCRIPTOR)
            .with(FileFallback::for_host_state(dir.path()))
            .with(FileFallback::new([dir.path().join("yarn.lock")]));

        assert_eq!(
            fallback.paths(),
            &[
                dir.path().join("package.json"),
                dir.path().join("yarn.lock"),
                dir.path().join("composer.lock"),
                dir.path().join("vendor/composer/installed.json"),
            ]
        );
    }

    #[test]
    fn restore_recreates_nested_host_listing() {
        let dir = tempfile::tempdir().unwrap();
        let installed = dir.path().join("vendor/composer/installed.json");
        std::fs::create_dir_all(installed.parent().unwrap()).unwrap();
        std::fs::write(&installed, "{\"packages\": []}").unwrap();

        let fallback = FileFallback::for_host_state(dir.path());
        let snapshot = fallback.snapshot().unwrap();
        std::fs::remove_dir_all(dir.path().join("vendor")).unwrap();

        fallback.restore(snapshot).unwrap();
        assert_eq!(
            std::fs::read_to_string(&installed).unwrap(),
            "{\"packages\": []}"
        );
    }
}
