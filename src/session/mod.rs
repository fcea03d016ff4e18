// src/session/mod.rs

//! The session-side state consumed by the tree-connect registry.

mod state;

pub(crate) use state::SessionTrees;
pub use state::{Session, User};
