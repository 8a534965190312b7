//! Application configuration for FirstParty.
//!
//! User config lives at `~/.firstparty/firstparty.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FpdError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "firstparty.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".firstparty";

/// Namespace under which the FPD module reads its configuration.
pub const CONFIG_NAMESPACE: &str = "firstPartyData";

/// Default priority of the FPD interceptor on the auction-start hook.
pub const DEFAULT_HOOK_PRIORITY: i32 = 10;

// ---------------------------------------------------------------------------
// Config source
// ---------------------------------------------------------------------------

/// Process-wide configuration access, keyed by module namespace.
///
/// Returns `None` when the namespace has never been configured.
pub trait ConfigSource: Send + Sync {
    fn get_config(&self, namespace: &str) -> Option<Value>;
}

// ---------------------------------------------------------------------------
// Config structs (matching firstparty.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Interceptor registration settings.
    #[serde(default)]
    pub hook: HookConfig,

    /// Pipeline execution settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Per-module configuration tables, keyed by namespace.
    #[serde(default)]
    pub modules: Map<String, Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut modules = Map::new();
        modules.insert(
            CONFIG_NAMESPACE.to_string(),
            serde_json::to_value(ModuleConfig::default()).unwrap_or(Value::Null),
        );
        Self {
            hook: HookConfig::default(),
            pipeline: PipelineConfig::default(),
            modules,
        }
    }
}

impl ConfigSource for AppConfig {
    fn get_config(&self, namespace: &str) -> Option<Value> {
        self.modules.get(namespace).cloned()
    }
}

/// `[hook]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    /// Priority on the `startAuction` extension point; lower runs first.
    #[serde(default = "default_hook_priority")]
    pub priority: i32,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            priority: default_hook_priority(),
        }
    }
}

fn default_hook_priority() -> i32 {
    DEFAULT_HOOK_PRIORITY
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on a single submodule's run. Unset waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submodule_timeout_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Module config (runtime, read once per pipeline run)
// ---------------------------------------------------------------------------

/// The `firstPartyData` configuration record handed to every submodule.
///
/// Known switches are read with loose truthiness (`1`, `"yes"` and `true`
/// all enable them); everything else is kept verbatim in `extra` so
/// submodules can read their own keys. A badly typed switch never discards
/// the rest of the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Map<String, Value>")]
pub struct ModuleConfig {
    /// Disable the built-in `enrichments` submodule.
    pub skip_enrichments: bool,

    /// Disable the built-in `validation` submodule.
    pub skip_validations: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const SKIP_ENRICHMENTS: &str = "skipEnrichments";
const SKIP_VALIDATIONS: &str = "skipValidations";

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl From<Map<String, Value>> for ModuleConfig {
    fn from(mut extra: Map<String, Value>) -> Self {
        let mut switch = |key: &str| extra.remove(key).as_ref().is_some_and(truthy);
        let skip_enrichments = switch(SKIP_ENRICHMENTS);
        let skip_validations = switch(SKIP_VALIDATIONS);
        Self {
            skip_enrichments,
            skip_validations,
            extra,
        }
    }
}

impl ModuleConfig {
    /// Build from a raw namespace value. Absence is not an error; a value
    /// that is not a table is ignored with a warning.
    pub fn from_value(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::default(),
            Some(Value::Object(map)) => Self::from(map),
            Some(other) => {
                tracing::warn!(value = %other, "{CONFIG_NAMESPACE} config is not a table, using defaults");
                Self::default()
            }
        }
    }

    /// Read the namespace from a config source.
    pub fn load(source: &dyn ConfigSource) -> Self {
        Self::from_value(source.get_config(CONFIG_NAMESPACE))
    }

    /// Look up a submodule-specific key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

// ---------------------------------------------------------------------------
// Shared config (mutable between requests)
// ---------------------------------------------------------------------------

/// An [`AppConfig`] that can be swapped while the process runs.
///
/// Readers always see a complete config; each read is independent, so a
/// change lands on the next pipeline run.
#[derive(Debug, Default)]
pub struct SharedConfig {
    inner: RwLock<AppConfig>,
}

impl SharedConfig {
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: RwLock::new(config),
        }
    }

    /// Replace the whole configuration.
    pub fn replace(&self, config: AppConfig) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Set (or clear, with `None`) a single module namespace.
    pub fn set_module(&self, namespace: &str, value: Option<Value>) {
        let mut config = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match value {
            Some(value) => {
                config.modules.insert(namespace.to_string(), value);
            }
            None => {
                config.modules.remove(namespace);
            }
        }
    }

    /// Clone the current configuration.
    pub fn snapshot(&self) -> AppConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ConfigSource for SharedConfig {
    fn get_config(&self, namespace: &str) -> Option<Value> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get_config(namespace)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.firstparty/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| FpdError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.firstparty/firstparty.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FpdError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| FpdError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FpdError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| FpdError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FpdError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
