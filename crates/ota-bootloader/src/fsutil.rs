use std::fs::{self, DirBuilder, File};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt};
use std::path::Path;

use crate::error::{Error, Result};

const OWNER_ONLY: u32 = 0o700;

/// Creates `dir` with mode 0700, or accepts an existing directory that is
/// already 0700 and owned by the calling user. Parents are not created.
pub fn create_secure_dir(dir: &Path) -> bool {
    if DirBuilder::new().mode(OWNER_ONLY).create(dir).is_ok() {
        return true;
    }
    let Ok(meta) = fs::metadata(dir) else {
        return false;
    };
    let uid = unsafe { libc::getuid() };
    meta.is_dir() && meta.mode() & 0o777 == OWNER_ONLY && meta.uid() == uid
}

pub fn ensure_dir(p: &Path) -> Result<()> {
    fs::create_dir_all(p)
        .map_err(|e| Error::io(format!("failed to create dir {}: {e}", p.display())))
}

pub fn write_empty(p: &Path) -> Result<()> {
    if let Some(parent) = p.parent() {
        ensure_dir(parent)?;
    }
    File::create(p)
        .map(drop)
        .map_err(|e| Error::io(format!("failed to write {}: {e}", p.display())))
}

// Ok(false) if there was nothing to remove.
pub fn remove_if_exists(p: &Path) -> Result<bool> {
    match fs::remove_file(p) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(format!("failed to remove {}: {e}", p.display()))),
    }
}

/// Replaces `path` with `body` so that a crash leaves either the old or the new
/// content, and the new content is on disk when this returns.
pub fn atomic_write_durable(path: &Path, body: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure_dir(parent)?;
    let file_name = path.file_name().and_then(|s| s.to_str()).ok_or_else(|| {
        Error::io(format!(
            "invalid file path for atomic write: {}",
            path.display()
        ))
    })?;
    let tmp = path.with_file_name(format!(
        ".{}.tmp.{}.{}",
        file_name,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));

    let write_tmp = || -> io::Result<()> {
        let mut f = File::create(&tmp)?;
        f.write_all(body.as_bytes())?;
        f.sync_all()
    };
    if let Err(e) = write_tmp() {
        let _ = fs::remove_file(&tmp);
        return Err(Error::io(format!(
            "failed to write temp file {}: {e}",
            tmp.display()
        )));
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::io(format!(
            "failed to rename {} -> {}: {e}",
            tmp.display(),
            path.display()
        ))
    })?;
    sync_dir(parent)
}

pub fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| Error::io(format!("failed to sync {}: {e}", dir.display())))
}
