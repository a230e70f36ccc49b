use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::adapters::AdapterOptions;
use crate::models::{CoreError, CoreErrorKind};

pub type ConfigResult<T> = Result<T, CoreError>;

/// Key of the configuration object inside the root package's `extra` section.
pub const CONFIG_KEY: &str = "asset-bridge";

/// Prefix of environment overrides, e.g. `ASSET_BRIDGE__MANAGER=yarn`.
pub const ENV_PREFIX: &str = "ASSET_BRIDGE__";

/// What to do with a package whose manifest fragment cannot be read or parsed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentPolicy {
    /// Leave the package out of the merge and keep going.
    #[default]
    Skip,
    /// Fail the solve before anything is written.
    Abort,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BridgeConfig {
    pub enabled: bool,
    pub manager: Option<String>,
    pub manager_version: Option<String>,
    pub manager_bin: Option<PathBuf>,
    pub manager_options: String,
    pub manager_install_options: String,
    pub manager_update_options: String,
    /// Seconds before an install or update is killed.
    pub manager_timeout: Option<u64>,
    pub asset_dir: Option<PathBuf>,
    pub run_asset_manager: bool,
    pub fallback_asset: bool,
    pub fallback_host: bool,
    pub enable_packages: BTreeMap<String, bool>,
    pub fragment_policy: FragmentPolicy,
    /// Set by the host from its own install mode, never read from a document.
    #[serde(skip)]
    pub dev_mode: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            manager: None,
            manager_version: None,
            manager_bin: None,
            manager_options: String::new(),
            manager_install_options: String::new(),
            manager_update_options: String::new(),
            manager_timeout: None,
            asset_dir: None,
            run_asset_manager: true,
            fallback_asset: true,
            fallback_host: true,
            enable_packages: BTreeMap::new(),
            fragment_policy: FragmentPolicy::Skip,
            dev_mode: true,
        }
    }
}

impl BridgeConfig {
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        serde_json::from_value(value).map_err(|error| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("invalid '{CONFIG_KEY}' configuration: {error}"),
            )
        })
    }

    /// Reads the configuration object from a root package's `extra` section.
    pub fn from_extra(extra: &Map<String, Value>) -> ConfigResult<Self> {
        match extra.get(CONFIG_KEY) {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value @ Value::Object(_)) => Self::from_value(value.clone()),
            Some(_) => Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("'extra.{CONFIG_KEY}' must be an object"),
            )),
        }
    }

    pub fn load<I, K, V>(extra: &Map<String, Value>, vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self::from_extra(extra)?.with_env(vars)
    }

    /// Overlays `ASSET_BRIDGE__*` pairs. Values are read as JSON when that yields a
    /// valid configuration and as plain strings otherwise.
    pub fn with_env<I, K, V>(self, vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let overrides: Vec<(String, String)> = vars
            .into_iter()
            .filter_map(|(key, value)| {
                let key = key.as_ref().strip_prefix(ENV_PREFIX)?;
                Some((key.to_ascii_lowercase().replace('_', "-"), value.into()))
            })
            .collect();
        if overrides.is_empty() {
            return Ok(self);
        }

        let dev_mode = self.dev_mode;
        let Value::Object(mut document) = serde_json::to_value(&self).map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("failed to serialize configuration: {error}"),
            )
        })?
        else {
            return Err(CoreError::new(
                CoreErrorKind::Internal,
                "configuration did not serialize to an object",
            ));
        };

        for (key, raw) in overrides {
            tracing::debug!(key = %key, "applying environment override");
            let candidate = serde_json::from_str::<Value>(&raw)
                .unwrap_or_else(|_| Value::String(raw.clone()));
            document.insert(key.clone(), candidate);
            if serde_json::from_value::<Self>(Value::Object(document.clone())).is_err() {
                document.insert(key, Value::String(raw));
            }
        }

        Ok(Self::from_value(Value::Object(document))?.dev_mode(dev_mode))
    }

    pub fn dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    pub fn adapter_options(&self) -> AdapterOptions {
        AdapterOptions {
            dev_mode: self.dev_mode,
            binary: self.manager_bin.clone(),
            global_options: split_options(&self.manager_options),
            install_options: split_options(&self.manager_install_options),
            update_options: split_options(&self.manager_update_options),
            timeout: self
                .manager_timeout
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            search_path: None,
        }
    }

    /// True when `enable-packages` is empty, or when some `true` pattern matches
    /// the package and no `false` pattern does.
    pub fn is_package_enabled(&self, name: &str) -> bool {
        if self.enable_packages.is_empty() {
            return true;
        }

        let mut enabled = false;
        for (pattern, allow) in &self.enable_packages {
            if matches_pattern(pattern, name) {
                if !allow {
                    return false;
                }
                enabled = true;
            }
        }
        enabled
    }
}

fn split_options(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Case-insensitive glob match of a package name. `*` also crosses the vendor separator.
fn matches_pattern(pattern: &str, name: &str) -> bool {
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    match Pattern::new(pattern) {
        Ok(pattern) => pattern.matches_with(name, options),
        Err(error) => {
            tracing::warn!(pattern, %error, "ignoring invalid enable-packages pattern");
            false
        }
    }
}
