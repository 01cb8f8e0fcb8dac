use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use toml::Value;

use crate::error::{Error, Result};

fn default_rollback_mode() -> String {
    "none".into()
}

fn default_sentinel_dir() -> PathBuf {
    PathBuf::from("/var/run/aktualizr-session")
}

fn default_sentinel_name() -> String {
    "need_reboot".into()
}

fn default_reboot_command() -> String {
    "/sbin/reboot".into()
}

fn default_deploy_root() -> PathBuf {
    PathBuf::from("/ostree/deploy/lmp/deploy")
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("/var/sota")
}

fn default_need_reboot_file() -> String {
    "need_reboot.json".into()
}

fn default_log_level() -> String {
    "info".into()
}

/// Bootloader integration settings.
///
/// `reboot_sentinel_dir` must live on storage that a real reboot clears (tmpfs
/// or similar). Reboot detection relies on the sentinel disappearing across the
/// OS boundary; nothing here can enforce that for the deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BootloaderConfig {
    // Kept as written; resolved to a `RollbackMode` on every lifecycle call.
    #[serde(default = "default_rollback_mode")]
    pub rollback_mode: String,
    #[serde(default = "default_sentinel_dir")]
    pub reboot_sentinel_dir: PathBuf,
    #[serde(default = "default_sentinel_name")]
    pub reboot_sentinel_name: String,
    #[serde(default = "default_reboot_command")]
    pub reboot_command: String,
    #[serde(default = "default_deploy_root")]
    pub firmware_deploy_root: PathBuf,
}

impl Default for BootloaderConfig {
    fn default() -> Self {
        Self {
            rollback_mode: default_rollback_mode(),
            reboot_sentinel_dir: default_sentinel_dir(),
            reboot_sentinel_name: default_sentinel_name(),
            reboot_command: default_reboot_command(),
            firmware_deploy_root: default_deploy_root(),
        }
    }
}

impl BootloaderConfig {
    pub fn sentinel_path(&self) -> PathBuf {
        self.reboot_sentinel_dir.join(&self.reboot_sentinel_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    #[serde(default = "default_need_reboot_file")]
    pub need_reboot_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            need_reboot_file: default_need_reboot_file(),
        }
    }
}

impl StorageConfig {
    pub fn need_reboot_path(&self) -> PathBuf {
        self.path.join(&self.need_reboot_file)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub bootloader: BootloaderConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ConfigDoc {
    pub path: PathBuf,
    pub value: Value,
}

impl ConfigDoc {
    pub fn empty() -> Self {
        Self {
            path: PathBuf::from("<defaults>"),
            value: Value::Table(Default::default()),
        }
    }

    pub fn value_path(&self, path: &str) -> Option<&Value> {
        let path = path.trim();
        if path.is_empty() {
            return Some(&self.value);
        }
        path.split('.')
            .try_fold(&self.value, |cur, seg| cur.as_table()?.get(seg))
    }

    pub fn deserialize_path<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let Some(v) = self.value_path(path) else {
            return Ok(None);
        };
        let parsed = v
            .clone()
            .try_into()
            .map_err(|e| Error::msg(format!("failed to deserialize config at '{}': {e}", path)))?;
        Ok(Some(parsed))
    }

    pub fn agent_config(&self) -> Result<AgentConfig> {
        Ok(AgentConfig {
            bootloader: self.deserialize_path("bootloader")?.unwrap_or_default(),
            storage: self.deserialize_path("storage")?.unwrap_or_default(),
            logging: self.deserialize_path("logging")?.unwrap_or_default(),
        })
    }
}

pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_tbl), Value::Table(overlay_tbl)) => {
            for (k, v) in overlay_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

fn relative_to(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        return p;
    }
    from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
}

fn take_imports(path: &Path, value: &mut Value) -> Result<Vec<String>> {
    let Some(tbl) = value.as_table_mut() else {
        return Ok(Vec::new());
    };
    let Some(raw) = tbl.remove("imports") else {
        return Ok(Vec::new());
    };
    let Some(arr) = raw.as_array() else {
        return Err(Error::msg(format!(
            "'imports' in {} must be an array of strings",
            path.display()
        )));
    };
    let mut out = Vec::with_capacity(arr.len());
    for v in arr {
        let Some(s) = v.as_str() else {
            return Err(Error::msg(format!(
                "invalid imports entry in {} (expected string)",
                path.display()
            )));
        };
        if !s.trim().is_empty() {
            out.push(s.trim().to_string());
        }
    }
    Ok(out)
}

fn load_layered(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::msg(format!(
            "config import cycle detected at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path)
        .map_err(|e| Error::msg(format!("failed to read config {}: {e}", path.display())))?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::msg(format!("TOML parse error in {}: {e}", path.display())))?;

    // extends < imports (in order) < this file.
    let mut out = Value::Table(Default::default());
    let parent = value
        .as_table_mut()
        .and_then(|t| t.remove("extends"))
        .and_then(|v| v.as_str().map(ToOwned::to_owned));
    if let Some(parent) = parent {
        out = load_layered(&relative_to(path, &parent), stack)?;
    }
    for imp in take_imports(path, &mut value)? {
        let imported = load_layered(&relative_to(path, &imp), stack)?;
        merge(&mut out, imported);
    }
    merge(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

pub fn load(path: &Path) -> Result<ConfigDoc> {
    let mut stack = HashSet::<PathBuf>::new();
    let value = load_layered(path, &mut stack)?;
    Ok(ConfigDoc {
        path: path.to_path_buf(),
        value,
    })
}
