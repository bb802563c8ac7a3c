//! Backup ledger and handler registry for installable module directories

pub mod cli;
pub mod core;
pub mod utils;

#[cfg(feature = "server")]
pub mod server;
