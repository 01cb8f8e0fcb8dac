use std::cell::RefCell;
use std::fs;
use std::path::Path;

use ota_bootloader::bootloader::Bootloader;
use ota_bootloader::config::BootloaderConfig;
use ota_bootloader::executor::{CommandOutput, CommandRunner};
use ota_bootloader::firmware::{self, FirmwareCheck};
use ota_bootloader::rollback::UBOOT_TOOL;
use ota_bootloader::storage::MemoryFlagStore;
use ota_bootloader::{Result, RollbackMode};

const HASH: &str = "6f1c9e0d2b8a47f3a5c6e7d8091a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c";

// Answers `*printenv` with a fixed reply; everything else succeeds silently.
struct Bootenv {
    printenv: CommandOutput,
    commands: RefCell<Vec<String>>,
}

impl Bootenv {
    fn reporting(version: &str) -> Self {
        Self::replying(0, &format!("bootfirmware_version={version}\n"))
    }

    fn replying(status: i32, output: &str) -> Self {
        Self {
            printenv: CommandOutput {
                status,
                output: output.to_string(),
            },
            commands: RefCell::new(Vec::new()),
        }
    }

    fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    fn upgrade_flag_writes(&self) -> usize {
        self.commands
            .borrow()
            .iter()
            .filter(|c| c.ends_with("setenv bootupgrade_available 1"))
            .count()
    }
}

impl CommandRunner for Bootenv {
    fn run(&self, command: &str) -> Result<CommandOutput> {
        self.commands.borrow_mut().push(command.to_string());
        if command.contains("printenv") {
            return Ok(self.printenv.clone());
        }
        Ok(CommandOutput::default())
    }
}

fn write_target_version(deploy_root: &Path, body: &str) {
    let p = deploy_root
        .join(format!("{HASH}.0"))
        .join("usr/lib/firmware/version.txt");
    fs::create_dir_all(p.parent().expect("parent")).expect("mkdir");
    fs::write(p, body).expect("write version");
}

fn cfg(root: &Path, mode: RollbackMode) -> BootloaderConfig {
    BootloaderConfig {
        rollback_mode: mode.as_str().into(),
        reboot_sentinel_dir: root.join("session"),
        firmware_deploy_root: root.join("deploy"),
        ..Default::default()
    }
}

#[test]
fn newer_target_firmware_sets_bootupgrade_once() {
    for (mode, printenv) in [
        (RollbackMode::UbootMasked, "fw_printenv bootfirmware_version"),
        (RollbackMode::VendorSecureBoot, "fiovb_printenv bootfirmware_version"),
    ] {
        let tmp = tempfile::tempdir().expect("tempdir");
        write_target_version(&tmp.path().join("deploy"), "bootfirmware_version=2.1\n");
        let store = MemoryFlagStore::default();
        let env = Bootenv::reporting("2.0");
        let bl = Bootloader::new(cfg(tmp.path(), mode), &store, &env);

        bl.install_notify(HASH).expect("install_notify");
        assert_eq!(env.upgrade_flag_writes(), 1, "{mode}");
        assert_eq!(env.commands()[0], printenv);
    }
}

#[test]
fn vendor_backend_uses_vendor_setenv() {
    let tmp = tempfile::tempdir().expect("tempdir");
    write_target_version(&tmp.path().join("deploy"), "bootfirmware_version=2.1\n");
    let store = MemoryFlagStore::default();
    let env = Bootenv::reporting("2.0");
    let bl = Bootloader::new(
        cfg(tmp.path(), RollbackMode::VendorSecureBoot),
        &store,
        &env,
    );
    bl.install_notify(HASH).expect("install_notify");
    assert_eq!(
        env.commands(),
        vec![
            "fiovb_printenv bootfirmware_version",
            "fiovb_setenv bootupgrade_available 1"
        ]
    );
}

#[test]
fn matching_firmware_is_left_alone() {
    let tmp = tempfile::tempdir().expect("tempdir");
    write_target_version(&tmp.path().join("deploy"), "bootfirmware_version=2.1\n");
    let store = MemoryFlagStore::default();
    let env = Bootenv::reporting("2.1");
    let bl = Bootloader::new(cfg(tmp.path(), RollbackMode::UbootMasked), &store, &env);

    bl.install_notify(HASH).expect("install_notify");
    assert_eq!(env.upgrade_flag_writes(), 0);
    assert_eq!(env.commands(), vec!["fw_printenv bootfirmware_version"]);
}

#[test]
fn plain_version_file_without_key_is_accepted() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let deploy = tmp.path().join("deploy");
    write_target_version(&deploy, "2.1");
    let env = Bootenv::reporting("2.1");
    assert_eq!(
        firmware::notify_if_changed(&env, UBOOT_TOOL, &deploy, HASH),
        FirmwareCheck::UpToDate
    );
}

#[test]
fn spaced_key_in_version_file_matches_bootloader() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let deploy = tmp.path().join("deploy");
    write_target_version(&deploy, "bootfirmware_version = 2.1\n");
    let env = Bootenv::reporting("2.1");
    assert_eq!(
        firmware::notify_if_changed(&env, UBOOT_TOOL, &deploy, HASH),
        FirmwareCheck::UpToDate
    );
    assert_eq!(env.upgrade_flag_writes(), 0);
}

#[test]
fn missing_version_file_runs_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = MemoryFlagStore::default();
    let env = Bootenv::reporting("2.0");
    let bl = Bootloader::new(cfg(tmp.path(), RollbackMode::UbootMasked), &store, &env);

    bl.install_notify(HASH).expect("install_notify");
    assert!(env.commands().is_empty());
}

#[test]
fn unreadable_bootloader_version_assumes_no_upgrade() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let deploy = tmp.path().join("deploy");
    write_target_version(&deploy, "bootfirmware_version=2.1\n");

    let failing = Bootenv::replying(1, "");
    assert_eq!(
        firmware::notify_if_changed(&failing, UBOOT_TOOL, &deploy, HASH),
        FirmwareCheck::Unknown
    );
    assert_eq!(failing.upgrade_flag_writes(), 0);

    let empty = Bootenv::replying(0, "bootfirmware_version=\n");
    assert_eq!(
        firmware::notify_if_changed(&empty, UBOOT_TOOL, &deploy, HASH),
        FirmwareCheck::Unknown
    );
    assert_eq!(empty.upgrade_flag_writes(), 0);
}

#[test]
fn backends_without_firmware_tracking_ignore_install() {
    let tmp = tempfile::tempdir().expect("tempdir");
    write_target_version(&tmp.path().join("deploy"), "bootfirmware_version=9.9\n");
    for mode in [RollbackMode::None, RollbackMode::UbootGeneric] {
        let store = MemoryFlagStore::default();
        let env = Bootenv::reporting("1.0");
        let bl = Bootloader::new(cfg(tmp.path(), mode), &store, &env);
        bl.install_notify(HASH).expect("install_notify");
        assert!(env.commands().is_empty(), "{mode}");
    }
}

#[test]
fn traversal_hash_is_ignored() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = MemoryFlagStore::default();
    let env = Bootenv::reporting("2.0");
    let bl = Bootloader::new(cfg(tmp.path(), RollbackMode::UbootMasked), &store, &env);
    bl.install_notify("../../../etc/passwd").expect("install_notify");
    assert!(env.commands().is_empty());
}
