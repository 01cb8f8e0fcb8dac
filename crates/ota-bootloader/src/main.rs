use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use ota_bootloader::Result;
use ota_bootloader::bootloader::Bootloader;
use ota_bootloader::config::{self, AgentConfig, ConfigDoc, LogFormat};
use ota_bootloader::executor::ShellRunner;
use ota_bootloader::storage::{FileFlagStore, NeedRebootStore};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Agent configuration TOML (built-in defaults when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log bootloader commands instead of running them
    #[arg(long, global = true)]
    dry_run: bool,
    /// Override [logging].level
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Override [logging].format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormatArg>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(flatten)]
    Device(DeviceCommand),
    /// Print the fully-resolved configuration (after extends/imports)
    Resolve,
}

// Everything that talks to the bootloader or the sentinel directory.
#[derive(Debug, Subcommand)]
enum DeviceCommand {
    /// Tell the bootloader the current boot is good
    BootOk,
    /// Arm the bootloader for a newly installed update
    UpdateNotify,
    /// Flag a boot firmware upgrade if the target ships a different version
    InstallNotify {
        /// sha256 of the installed target
        target_hash: String,
    },
    /// Record that the device needs a reboot
    FlagSet,
    /// Forget a pending reboot
    FlagClear,
    /// Print whether a reboot happened since the flag was set
    RebootDetected,
    /// Reboot the device
    Reboot {
        /// Only drop the sentinel, as if a reboot had happened
        #[arg(long)]
        fake: bool,
    },
    /// Show rollback mode and reboot detection state
    Status {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let doc = match args.config.as_deref() {
        Some(p) => config::load(p)?,
        None => ConfigDoc::empty(),
    };
    let mut cfg = doc.agent_config()?;
    if let Some(level) = args.log_level.clone() {
        cfg.logging.level = level;
    }
    if let Some(fmt) = args.log_format {
        cfg.logging.format = match fmt {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        };
    }
    ota_bootloader::logging::init(&cfg.logging)?;

    match args.cmd {
        // Resolving must not touch the sentinel directory.
        Command::Resolve => cmd_resolve(&doc),
        Command::Device(cmd) => run_device(cmd, &cfg, args.dry_run),
    }
}

fn run_device(cmd: DeviceCommand, cfg: &AgentConfig, dry_run: bool) -> Result<()> {
    let store = FileFlagStore::new(cfg.storage.need_reboot_path());
    let runner = ShellRunner::new(dry_run);
    let bl = Bootloader::new(cfg.bootloader.clone(), &store, &runner);

    match cmd {
        DeviceCommand::BootOk => bl.set_boot_ok(),
        DeviceCommand::UpdateNotify => bl.update_notify(),
        DeviceCommand::InstallNotify { target_hash } => bl.install_notify(&target_hash),
        DeviceCommand::FlagSet => bl.reboot_flag_set(),
        DeviceCommand::FlagClear => bl.reboot_flag_clear(),
        DeviceCommand::RebootDetected => {
            println!("{}", bl.reboot_detected());
            Ok(())
        }
        DeviceCommand::Reboot { fake } => {
            bl.reboot(fake);
            Ok(())
        }
        DeviceCommand::Status { json } => cmd_status(&bl, &store, cfg, json),
    }
}

fn cmd_resolve(doc: &ConfigDoc) -> Result<()> {
    // Best-effort pretty print of resolved config.
    let s = toml::to_string_pretty(&doc.value).unwrap_or_else(|_| format!("{:?}", doc.value));
    print!("{s}");
    Ok(())
}

fn cmd_status(
    bl: &Bootloader<'_>,
    store: &FileFlagStore,
    cfg: &AgentConfig,
    json: bool,
) -> Result<()> {
    let mode = bl.rollback_mode()?;
    let need_reboot = store.load_need_reboot()?;
    let v = serde_json::json!({
        "rollback_mode": mode.as_str(),
        "reboot_detection_supported": bl.supports_reboot_detection(),
        "need_reboot": need_reboot,
        "sentinel": bl.sentinel_path().display().to_string(),
        "sentinel_present": bl.sentinel_exists(),
        "reboot_detected": bl.reboot_detected(),
        "flag_store": cfg.storage.need_reboot_path().display().to_string(),
    });
    if json {
        println!("{v:#}");
        return Ok(());
    }
    if let Some(obj) = v.as_object() {
        for (k, val) in obj {
            println!("{k:<28} {val}");
        }
    }
    Ok(())
}
