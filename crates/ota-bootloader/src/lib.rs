pub mod bootloader;
pub mod config;
pub mod error;
pub mod executor;
pub mod firmware;
pub mod fsutil;
pub mod log_sanitize;
pub mod logging;
pub mod platform;
pub mod rollback;
pub mod storage;

pub use bootloader::Bootloader;
pub use error::{Error, ErrorKind, Result};
pub use rollback::RollbackMode;
