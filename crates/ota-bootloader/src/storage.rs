use std::cell::Cell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fsutil::{atomic_write_durable, remove_if_exists, sync_dir};

/// Persistent "an applied update still waits for a reboot" flag.
pub trait NeedRebootStore {
    fn load_need_reboot(&self) -> Result<bool>;
    fn store_need_reboot(&self) -> Result<()>;
    fn clear_need_reboot(&self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NeedRebootRecord {
    need_reboot: bool,
    set_at: String,
}

/// Keeps the flag as a small JSON record that is replaced atomically.
#[derive(Debug, Clone)]
pub struct FileFlagStore {
    path: PathBuf,
}

impl FileFlagStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NeedRebootStore for FileFlagStore {
    fn load_need_reboot(&self) -> Result<bool> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(Error::storage(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        let rec: NeedRebootRecord = serde_json::from_str(&raw).map_err(|e| {
            Error::storage(format!("failed to parse {}: {e}", self.path.display()))
        })?;
        Ok(rec.need_reboot)
    }

    fn store_need_reboot(&self) -> Result<()> {
        let rec = NeedRebootRecord {
            need_reboot: true,
            set_at: chrono::Utc::now().to_rfc3339(),
        };
        let body = serde_json::to_string_pretty(&rec)
            .map_err(|e| Error::storage(format!("failed to encode need_reboot record: {e}")))?;
        atomic_write_durable(&self.path, &body).map_err(|e| Error::storage(e.to_string()))
    }

    fn clear_need_reboot(&self) -> Result<()> {
        if remove_if_exists(&self.path).map_err(|e| Error::storage(e.to_string()))? {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                sync_dir(parent).map_err(|e| Error::storage(e.to_string()))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    need_reboot: Cell<bool>,
}

impl MemoryFlagStore {
    pub fn new(need_reboot: bool) -> Self {
        Self {
            need_reboot: Cell::new(need_reboot),
        }
    }
}

impl NeedRebootStore for MemoryFlagStore {
    fn load_need_reboot(&self) -> Result<bool> {
        Ok(self.need_reboot.get())
    }

    fn store_need_reboot(&self) -> Result<()> {
        self.need_reboot.set(true);
        Ok(())
    }

    fn clear_need_reboot(&self) -> Result<()> {
        self.need_reboot.set(false);
        Ok(())
    }
}
