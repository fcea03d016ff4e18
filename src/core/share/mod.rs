// src/core/share/mod.rs

//! Share configuration snapshots and the provider that hands them out.

mod config;
mod manager;

pub use config::{ShareConfig, ShareFlags, ShareHandle};
pub use manager::{ShareConfigManager, ShareConfigProvider};
