//! The JavaScript asset manifest (`package.json`) and its merge rules.
//!
//! Only the `dependencies` and `devDependencies` sections are ever touched; every
//! other top-level field is carried through in its original order.

mod merge;

use std::io::Write;
use std::path::Path;

use serde_json::{Map, Value};

use crate::models::{CoreError, CoreErrorKind};

pub use merge::{ManifestFragment, Reachability, merge};

pub type ManifestResult<T> = Result<T, CoreError>;

pub const DEPENDENCIES: &str = "dependencies";
pub const DEV_DEPENDENCIES: &str = "devDependencies";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssetManifest {
    document: Map<String, Value>,
}

impl AssetManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(raw: &str) -> ManifestResult<Self> {
        let value: Value = serde_json::from_str(raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::ParseFailure,
                format!("manifest is not valid JSON: {error}"),
            )
        })?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> ManifestResult<Self> {
        let Value::Object(document) = value else {
            return Err(CoreError::new(
                CoreErrorKind::ParseFailure,
                "manifest must be a JSON object",
            ));
        };

        for key in [DEPENDENCIES, DEV_DEPENDENCIES] {
            validate_section(key, document.get(key))?;
        }

        Ok(Self { document })
    }

    pub fn read(path: &Path) -> ManifestResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            let kind = if error.kind() == std::io::ErrorKind::NotFound {
                CoreErrorKind::NotInstalled
            } else {
                CoreErrorKind::StorageFailure
            };
            CoreError::new(
                kind,
                format!("failed to read manifest {}: {error}", path.display()),
            )
        })?;
        Self::parse(&raw).map_err(|error| CoreError {
            message: format!("{}: {}", path.display(), error.message),
            ..error
        })
    }

    /// Reads `path`, treating a missing file as an empty manifest.
    pub fn read_or_default(path: &Path) -> ManifestResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        Self::read(path)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    pub fn dependency(&self, name: &str) -> Option<&str> {
        section_entry(&self.document, DEPENDENCIES, name)
    }

    pub fn dev_dependency(&self, name: &str) -> Option<&str> {
        section_entry(&self.document, DEV_DEPENDENCIES, name)
    }

    pub fn dependencies(&self) -> impl Iterator<Item = (&str, &str)> {
        section_entries(&self.document, DEPENDENCIES)
    }

    pub fn dev_dependencies(&self) -> impl Iterator<Item = (&str, &str)> {
        section_entries(&self.document, DEV_DEPENDENCIES)
    }

    /// Writes a runtime dependency and drops any dev entry of the same name.
    pub fn set_dependency(&mut self, name: &str, constraint: &str) {
        insert_entry(&mut self.document, DEPENDENCIES, name, constraint);

        if let Some(Value::Object(dev)) = self.document.get_mut(DEV_DEPENDENCIES) {
            dev.retain(|key, _| key != name);
        }
    }

    /// Writes a dev dependency unless the name is already a runtime dependency.
    pub fn set_dev_dependency(&mut self, name: &str, constraint: &str) -> bool {
        if self.dependency(name).is_some() {
            return false;
        }
        insert_entry(&mut self.document, DEV_DEPENDENCIES, name, constraint);
        true
    }

    pub fn sort_dependencies(&mut self) {
        for key in [DEPENDENCIES, DEV_DEPENDENCIES] {
            if let Some(Value::Object(section)) = self.document.get_mut(key) {
                let mut entries: Vec<(String, Value)> =
                    std::mem::take(section).into_iter().collect();
                entries.sort_by(|left, right| left.0.cmp(&right.0));
                section.extend(entries);
            }
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.document)
    }

    /// Two-space indented JSON with a trailing newline, as npm and yarn write it.
    pub fn to_json_string(&self) -> ManifestResult<String> {
        let mut rendered = serde_json::to_string_pretty(&self.document).map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("failed to serialize manifest: {error}"),
            )
        })?;
        rendered.push('\n');
        Ok(rendered)
    }

    pub fn write_atomic(&self, path: &Path) -> ManifestResult<()> {
        let rendered = self.to_json_string()?;
        write_file_atomic(path, rendered.as_bytes())
    }
}

/// Replaces `path` through a sibling temp file so readers never observe a partial write.
pub(crate) fn write_file_atomic(path: &Path, contents: &[u8]) -> ManifestResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|error| {
            CoreError::storage(format!(
                "failed creating directory {}: {error}",
                parent.display()
            ))
        })?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

    let result = (|| {
        let mut file = std::fs::File::create(&tmp_path).map_err(|error| {
            CoreError::storage(format!(
                "failed opening temp file {}: {error}",
                tmp_path.display()
            ))
        })?;
        file.write_all(contents).map_err(|error| {
            CoreError::storage(format!(
                "failed writing temp file {}: {error}",
                tmp_path.display()
            ))
        })?;
        file.sync_all().map_err(|error| {
            CoreError::storage(format!(
                "failed syncing temp file {}: {error}",
                tmp_path.display()
            ))
        })?;
        std::fs::rename(&tmp_path, path).map_err(|error| {
            CoreError::storage(format!(
                "failed promoting temp file {} -> {}: {error}",
                tmp_path.display(),
                path.display()
            ))
        })
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}

fn validate_section(key: &str, section: Option<&Value>) -> ManifestResult<()> {
    match section {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Object(entries)) => {
            if let Some((name, _)) = entries.iter().find(|(_, value)| !value.is_string()) {
                return Err(CoreError::new(
                    CoreErrorKind::ParseFailure,
                    format!("'{key}.{name}' must be a version string"),
                ));
            }
            Ok(())
        }
        Some(_) => Err(CoreError::new(
            CoreErrorKind::ParseFailure,
            format!("'{key}' must be an object"),
        )),
    }
}

fn section_entry<'a>(document: &'a Map<String, Value>, key: &str, name: &str) -> Option<&'a str> {
    document.get(key)?.as_object()?.get(name)?.as_str()
}

fn section_entries<'a>(
    document: &'a Map<String, Value>,
    key: &str,
) -> impl Iterator<Item = (&'a str, &'a str)> {
    document
        .get(key)
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|section| section.iter())
        .filter_map(|(name, value)| Some((name.as_str(), value.as_str()?)))
}

fn insert_entry(document: &mut Map<String, Value>, key: &str, name: &str, constraint: &str) {
    let value = Value::String(constraint.to_string());
    let slot = document
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(section) = slot {
        section.insert(name.to_string(), value);
    } else {
        let mut section = Map::new();
        section.insert(name.to_string(), value);
        *slot = Value::Object(section);
    }
}
