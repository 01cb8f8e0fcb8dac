use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::error::{Error, Result};
use crate::executor::CommandRunner;

/// Which bootloader environment protocol the device speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RollbackMode {
    None,
    UbootGeneric,
    UbootMasked,
    // Foundries.io verified boot: OP-TEE backed environment, `fiovb_*` tools.
    VendorSecureBoot,
}

impl RollbackMode {
    pub const ALL: [RollbackMode; 4] = [
        RollbackMode::None,
        RollbackMode::UbootGeneric,
        RollbackMode::UbootMasked,
        RollbackMode::VendorSecureBoot,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RollbackMode::None => "none",
            RollbackMode::UbootGeneric => "uboot_generic",
            RollbackMode::UbootMasked => "uboot_masked",
            RollbackMode::VendorSecureBoot => "fiovb",
        }
    }

    pub fn env_tool(self) -> Option<EnvTool> {
        match self {
            RollbackMode::None => None,
            RollbackMode::UbootGeneric | RollbackMode::UbootMasked => Some(UBOOT_TOOL),
            RollbackMode::VendorSecureBoot => Some(FIOVB_TOOL),
        }
    }

    /// Writes that tell the bootloader the running boot is good.
    pub fn boot_ok_writes(self) -> &'static [EnvWrite] {
        match self {
            RollbackMode::None => &[],
            RollbackMode::UbootGeneric => &[RESET_BOOTCOUNT],
            RollbackMode::UbootMasked | RollbackMode::VendorSecureBoot => {
                &[RESET_BOOTCOUNT, CLEAR_UPGRADE_AVAILABLE]
            }
        }
    }

    /// Writes that arm the bootloader for a freshly installed update.
    pub fn update_writes(self) -> &'static [EnvWrite] {
        match self {
            RollbackMode::None => &[],
            RollbackMode::UbootGeneric => &[RESET_BOOTCOUNT, RESET_ROLLBACK],
            RollbackMode::UbootMasked | RollbackMode::VendorSecureBoot => {
                &[RESET_BOOTCOUNT, SET_UPGRADE_AVAILABLE, RESET_ROLLBACK]
            }
        }
    }

    pub fn tracks_boot_firmware(self) -> bool {
        match self {
            RollbackMode::None | RollbackMode::UbootGeneric => false,
            RollbackMode::UbootMasked | RollbackMode::VendorSecureBoot => true,
        }
    }
}

impl fmt::Display for RollbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RollbackMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RollbackMode::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| Error::unimplemented(format!("unsupported rollback mode '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvTool {
    pub setenv: &'static str,
    pub printenv: &'static str,
}

pub const UBOOT_TOOL: EnvTool = EnvTool {
    setenv: "fw_setenv",
    printenv: "fw_printenv",
};

pub const FIOVB_TOOL: EnvTool = EnvTool {
    setenv: "fiovb_setenv",
    printenv: "fiovb_printenv",
};

impl EnvTool {
    pub fn set_command(&self, var: &str, value: &str) -> String {
        format!("{} {} {}", self.setenv, var, value)
    }

    pub fn print_command(&self, var: &str) -> String {
        format!("{} {}", self.printenv, var)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvWrite {
    pub var: &'static str,
    pub value: &'static str,
    // Warning text when the write fails.
    pub on_failure: &'static str,
}

pub const RESET_BOOTCOUNT: EnvWrite = EnvWrite {
    var: "bootcount",
    value: "0",
    on_failure: "failed resetting bootcount",
};

pub const CLEAR_UPGRADE_AVAILABLE: EnvWrite = EnvWrite {
    var: "upgrade_available",
    value: "0",
    on_failure: "failed resetting upgrade_available",
};

pub const SET_UPGRADE_AVAILABLE: EnvWrite = EnvWrite {
    var: "upgrade_available",
    value: "1",
    on_failure: "failed setting upgrade_available",
};

pub const RESET_ROLLBACK: EnvWrite = EnvWrite {
    var: "rollback",
    value: "0",
    on_failure: "failed resetting rollback flag",
};

pub const SET_BOOTUPGRADE_AVAILABLE: EnvWrite = EnvWrite {
    var: "bootupgrade_available",
    value: "1",
    on_failure: "failed setting bootupgrade_available",
};

/// Runs one environment write; failures are logged and reported as `false`.
pub fn apply_write(runner: &dyn CommandRunner, tool: EnvTool, write: &EnvWrite) -> bool {
    let cmd = tool.set_command(write.var, write.value);
    match runner.run(&cmd) {
        Ok(out) if out.success() => true,
        Ok(out) => {
            warn!(command = %cmd, status = out.status, "{}", write.on_failure);
            false
        }
        Err(e) => {
            warn!(command = %cmd, "{}: {e}", write.on_failure);
            false
        }
    }
}

// Every write is attempted even if an earlier one failed; no retries.
pub fn apply_writes(runner: &dyn CommandRunner, tool: EnvTool, writes: &[EnvWrite]) {
    let failed = writes
        .iter()
        .filter(|w| !apply_write(runner, tool, w))
        .count();
    if failed > 0 {
        warn!(
            tool = tool.setenv,
            "{failed} of {} bootloader environment writes failed",
            writes.len()
        );
    }
}
