use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::executor::CommandRunner;
use crate::log_sanitize::sanitize_output;
use crate::rollback::{EnvTool, SET_BOOTUPGRADE_AVAILABLE, apply_write};

pub const VERSION_VAR: &str = "bootfirmware_version";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareCheck {
    // Nothing could be compared; no write was attempted.
    Unknown,
    UpToDate,
    UpgradeFlagged,
}

/// Path of the boot firmware version file shipped inside a deployed target.
pub fn version_file_path(deploy_root: &Path, target_hash: &str) -> Result<PathBuf> {
    let hash = target_hash.trim();
    match hex::decode(hash) {
        Ok(bytes) if bytes.len() == 32 => {}
        _ => {
            return Err(Error::msg(format!(
                "target hash '{target_hash}' is not a sha256 digest"
            )));
        }
    }
    Ok(deploy_root
        .join(format!("{hash}.0"))
        .join("usr/lib/firmware/version.txt"))
}

// Accepts both the version file body and `printenv` output:
// "bootfirmware_version=2.1\n", "bootfirmware_version = 2.1" and "2.1" all yield "2.1".
pub fn parse_version(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let value = line
        .strip_prefix(VERSION_VAR)
        .and_then(|rest| rest.trim_start().strip_prefix('='))
        .unwrap_or(line)
        .trim();
    (!value.is_empty()).then(|| value.to_string())
}

pub fn read_target_version(deploy_root: &Path, target_hash: &str) -> Result<String> {
    let path = version_file_path(deploy_root, target_hash)?;
    info!("reading target boot firmware version file: {}", path.display());
    let raw = fs::read_to_string(&path)
        .map_err(|e| Error::io(format!("failed to read {}: {e}", path.display())))?;
    parse_version(&raw).ok_or_else(|| Error::msg(format!("{} holds no version", path.display())))
}

pub fn read_current_version(runner: &dyn CommandRunner, tool: EnvTool) -> Result<String> {
    let cmd = tool.print_command(VERSION_VAR);
    let out = runner.run(&cmd)?;
    if !out.success() {
        return Err(Error::command(format!("'{cmd}' exited with status {}", out.status)));
    }
    parse_version(&out.output).ok_or_else(|| {
        Error::command(format!(
            "'{cmd}' returned no version: '{}'",
            sanitize_output(&out.output)
        ))
    })
}

/// Flags a boot firmware upgrade when the target ships a different version than
/// the bootloader reports. Any read failure is logged and treated as "no upgrade".
pub fn notify_if_changed(
    runner: &dyn CommandRunner,
    tool: EnvTool,
    deploy_root: &Path,
    target_hash: &str,
) -> FirmwareCheck {
    let target = match read_target_version(deploy_root, target_hash) {
        Ok(v) => v,
        Err(e) => {
            warn!("cannot determine target boot firmware version: {e}");
            return FirmwareCheck::Unknown;
        }
    };
    info!("target boot firmware version: {target}");

    let current = match read_current_version(runner, tool) {
        Ok(v) => v,
        Err(e) => {
            warn!("failed getting {VERSION_VAR} from bootloader: {e}");
            return FirmwareCheck::Unknown;
        }
    };
    info!("current boot firmware version: {current}");

    if current == target {
        info!("update of boot firmware is not needed");
        return FirmwareCheck::UpToDate;
    }
    info!("update boot firmware to version: {target}");
    apply_write(runner, tool, &SET_BOOTUPGRADE_AVAILABLE);
    FirmwareCheck::UpgradeFlagged
}
