use std::io;
use std::path::Path;

use crate::error::{Error, Result};

/// OS primitives around a real reboot.
pub trait Platform {
    fn acquire_root(&self) -> Result<()>;
    fn sync_disks(&self);
    // None when the filesystem type cannot be determined.
    fn dir_is_volatile(&self, dir: &Path) -> Option<bool>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HostPlatform;

impl Platform for HostPlatform {
    fn acquire_root(&self) -> Result<()> {
        if unsafe { libc::setuid(0) } != 0 {
            return Err(Error::io(format!(
                "setuid(0) failed: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    fn sync_disks(&self) {
        unsafe { libc::sync() };
    }

    #[cfg(target_os = "linux")]
    fn dir_is_volatile(&self, dir: &Path) -> Option<bool> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        const TMPFS_MAGIC: u32 = 0x0102_1994;
        const RAMFS_MAGIC: u32 = 0x8584_58f6;

        let c_path = CString::new(dir.as_os_str().as_bytes()).ok()?;
        let mut st: libc::statfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statfs(c_path.as_ptr(), &mut st) };
        if rc != 0 {
            return None;
        }
        // f_type width differs per arch; the magic numbers fit in 32 bits.
        let magic = st.f_type as u32;
        Some(magic == TMPFS_MAGIC || magic == RAMFS_MAGIC)
    }

    #[cfg(not(target_os = "linux"))]
    fn dir_is_volatile(&self, _dir: &Path) -> Option<bool> {
        None
    }
}
