use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::config::BootloaderConfig;
use crate::error::Result;
use crate::executor::CommandRunner;
use crate::firmware;
use crate::fsutil::{create_secure_dir, remove_if_exists, write_empty};
use crate::platform::{HostPlatform, Platform};
use crate::rollback::{RollbackMode, apply_writes};
use crate::storage::NeedRebootStore;

static HOST_PLATFORM: HostPlatform = HostPlatform;

/// Bootloader side of the update workflow.
///
/// Reboot detection pairs the durable `need_reboot` flag with a sentinel file
/// in a directory that a real reboot wipes. Flag set and sentinel gone means
/// the device went through a reboot after the update was applied.
pub struct Bootloader<'a> {
    config: BootloaderConfig,
    storage: &'a dyn NeedRebootStore,
    runner: &'a dyn CommandRunner,
    platform: &'a dyn Platform,
    sentinel: PathBuf,
    reboot_detect_supported: bool,
}

impl<'a> Bootloader<'a> {
    pub fn new(
        config: BootloaderConfig,
        storage: &'a dyn NeedRebootStore,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self::with_platform(config, storage, runner, &HOST_PLATFORM)
    }

    pub fn with_platform(
        config: BootloaderConfig,
        storage: &'a dyn NeedRebootStore,
        runner: &'a dyn CommandRunner,
        platform: &'a dyn Platform,
    ) -> Self {
        let sentinel = config.sentinel_path();
        let dir = &config.reboot_sentinel_dir;
        let reboot_detect_supported = create_secure_dir(dir);
        if !reboot_detect_supported {
            warn!(
                "could not create {} securely, reboot detection support disabled",
                dir.display()
            );
        } else if platform.dir_is_volatile(dir) == Some(false) {
            warn!(
                "{} is on persistent storage; reboot detection expects it to be cleared by a reboot",
                dir.display()
            );
        }

        Self {
            config,
            storage,
            runner,
            platform,
            sentinel,
            reboot_detect_supported,
        }
    }

    pub fn sentinel_path(&self) -> &Path {
        &self.sentinel
    }

    pub fn rollback_mode(&self) -> Result<RollbackMode> {
        self.config.rollback_mode.parse().inspect_err(|e| {
            error!("{e}");
        })
    }

    pub fn set_boot_ok(&self) -> Result<()> {
        let mode = self.rollback_mode()?;
        if let Some(tool) = mode.env_tool() {
            apply_writes(self.runner, tool, mode.boot_ok_writes());
        }
        Ok(())
    }

    pub fn update_notify(&self) -> Result<()> {
        let mode = self.rollback_mode()?;
        if let Some(tool) = mode.env_tool() {
            apply_writes(self.runner, tool, mode.update_writes());
        }
        Ok(())
    }

    pub fn install_notify(&self, target_hash: &str) -> Result<()> {
        let mode = self.rollback_mode()?;
        let Some(tool) = mode.env_tool().filter(|_| mode.tracks_boot_firmware()) else {
            return Ok(());
        };
        firmware::notify_if_changed(
            self.runner,
            tool,
            &self.config.firmware_deploy_root,
            target_hash,
        );
        Ok(())
    }

    pub fn supports_reboot_detection(&self) -> bool {
        self.reboot_detect_supported
    }

    // An unreadable sentinel counts as present: no reboot is reported on a stat error.
    pub fn sentinel_exists(&self) -> bool {
        self.sentinel.try_exists().unwrap_or_else(|e| {
            warn!("cannot check {}: {e}", self.sentinel.display());
            true
        })
    }

    pub fn reboot_detected(&self) -> bool {
        if !self.reboot_detect_supported {
            return false;
        }
        let sentinel_exists = self.sentinel_exists();
        let need_reboot = self.storage.load_need_reboot().unwrap_or_else(|e| {
            warn!("failed to load need_reboot flag: {e}");
            false
        });
        need_reboot && !sentinel_exists
    }

    // Sentinel first: a crash in between must not leave the flag without it.
    pub fn reboot_flag_set(&self) -> Result<()> {
        if !self.reboot_detect_supported {
            return Ok(());
        }
        write_empty(&self.sentinel)?;
        self.storage.store_need_reboot()
    }

    // Flag first, mirror of reboot_flag_set.
    pub fn reboot_flag_clear(&self) -> Result<()> {
        if !self.reboot_detect_supported {
            return Ok(());
        }
        self.storage.clear_need_reboot()?;
        remove_if_exists(&self.sentinel)?;
        Ok(())
    }

    /// With `fake`, only drops the sentinel so the next start sees a reboot;
    /// the flag is left for `reboot_detected`/`reboot_flag_clear`.
    pub fn reboot(&self, fake: bool) {
        if fake {
            if let Err(e) = remove_if_exists(&self.sentinel) {
                warn!("fake reboot: {e}");
            }
            return;
        }
        if let Err(e) = self.platform.acquire_root() {
            error!("failed to set/verify a root user so cannot reboot system programmatically: {e}");
            return;
        }
        self.platform.sync_disks();
        let cmd = &self.config.reboot_command;
        info!("rebooting: {cmd}");
        match self.runner.run(cmd) {
            Ok(out) if out.success() => {}
            Ok(out) => error!(status = out.status, "failed to execute the reboot command: {cmd}"),
            Err(e) => error!("failed to execute the reboot command: {cmd}: {e}"),
        }
    }
}
