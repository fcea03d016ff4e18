// src/core/mod.rs

//! The central module containing the tree-connect lifecycle and its collaborators.

pub mod errors;
pub mod ipc;
pub mod metrics;
pub mod share;
pub mod tree;

pub use errors::{IpcError, LogoffReport, TreeConnError, TreeConnErrorKind};
pub use tree::{TreeConnect, TreeConnectRef, TreeConnectRegistry, TreeState};
