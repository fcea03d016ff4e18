// src/core/tree/mod.rs

//! Tree connects: the binding of an authenticated session to a share.

mod connect;
mod ids;
mod pending;
mod registry;

pub use connect::{TreeConnect, TreeConnectRef, TreeState};
pub use ids::{IdAllocator, IdPool};
pub use registry::TreeConnectRegistry;
