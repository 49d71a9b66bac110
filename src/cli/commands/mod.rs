//! CLI command implementations

pub mod utils;

pub mod budget;
pub mod cal;
pub mod completions;
pub mod equip;
pub mod export;
pub mod import;
pub mod init;
