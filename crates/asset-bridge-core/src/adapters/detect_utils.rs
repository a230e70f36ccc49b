use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Locates `binary_name` in the given PATH value. Names containing a separator
/// are treated as paths and only checked for existence.
pub(crate) fn find_executable(binary_name: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if binary_name.trim().is_empty() {
        return None;
    }

    if binary_name.contains(std::path::MAIN_SEPARATOR) || binary_name.contains('/') {
        let explicit = PathBuf::from(binary_name);
        return explicit.is_file().then_some(explicit);
    }

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    if let Some(path_var) = search_path {
        for dir in std::env::split_paths(path_var) {
            for name in candidate_names(binary_name) {
                push_candidate_path(dir.join(name), &mut candidates, &mut seen);
            }
        }
    }

    candidates.into_iter().find(|candidate| is_executable(candidate))
}

fn candidate_names(binary_name: &str) -> Vec<String> {
    if cfg!(windows) {
        vec![
            binary_name.to_string(),
            format!("{binary_name}.cmd"),
            format!("{binary_name}.exe"),
        ]
    } else {
        vec![binary_name.to_string()]
    }
}

fn push_candidate_path(
    candidate: PathBuf,
    candidates: &mut Vec<PathBuf>,
    seen: &mut HashSet<String>,
) {
    let rendered = candidate.to_string_lossy().to_string();
    if rendered.is_empty() {
        return;
    }

    if seen.insert(rendered) {
        candidates.push(candidate);
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::find_executable;

    #[cfg(unix)]
    fn write_executable(dir: &std::path::Path, name: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn finds_first_matching_directory_in_search_path() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let expected = write_executable(second.path(), "yarn");

        let path_var = std::env::join_paths([first.path(), second.path()]).unwrap();
        let found = find_executable("yarn", Some(path_var.as_os_str()));

        assert_eq!(found, Some(expected));
    }

    #[cfg(unix)]
    #[test]
    fn ignores_non_executable_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pnpm"), "not a binary").unwrap();

        let path_var = std::env::join_paths([dir.path()]).unwrap();
        assert_eq!(find_executable("pnpm", Some(path_var.as_os_str())), None);
    }

    #[test]
    fn missing_search_path_finds_nothing() {
        assert_eq!(find_executable("npm", None), None);
        assert_eq!(find_executable("  ", None), None);
    }
}
