// src/lib.rs

pub mod config;
pub mod core;
pub mod session;

// Re-export
pub use crate::core::tree::TreeConnectRegistry;
pub use crate::session::{Session, User};
