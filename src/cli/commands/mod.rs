//! Command implementations.

pub mod config_cmd;
pub mod crawl;
pub mod sort;
pub mod stats;
