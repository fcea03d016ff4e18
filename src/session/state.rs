// src/session/state.rs

//! Defines the per-session state that tree connects hang off.

use crate::core::tree::{IdAllocator, IdPool, TreeConnect};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;

/// The authenticated identity behind a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub guest: bool,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            guest: false,
        }
    }

    pub fn guest() -> Self {
        Self {
            name: "guest".to_string(),
            guest: true,
        }
    }
}

/// The tree connects registered under one session.
///
/// Shared with teardown tasks, which finish removing a tree even after the
/// caller that started them has gone away.
pub(crate) struct SessionTrees {
    /// Lookups take the read lock, insert/remove the write lock.
    pub(crate) conns: RwLock<Vec<Arc<TreeConnect>>>,
    pub(crate) ids: Arc<dyn IdAllocator>,
    /// Signalled every time a tree connect is removed from `conns`.
    pub(crate) removed: Notify,
}

/// An authenticated session and the tree connects it owns.
pub struct Session {
    id: u64,
    user: Arc<User>,
    pub(crate) trees: Arc<SessionTrees>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user", &self.user.name)
            .field("tree_conns", &self.tree_conn_count())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session whose tree ids come from `1..=max_tree_conns`.
    pub fn new(id: u64, user: Arc<User>, max_tree_conns: u32) -> Self {
        Self::with_id_allocator(id, user, Arc::new(IdPool::new(max_tree_conns)))
    }

    pub fn with_id_allocator(id: u64, user: Arc<User>, tree_ids: Arc<dyn IdAllocator>) -> Self {
        Self {
            id,
            user,
            trees: Arc::new(SessionTrees {
                conns: RwLock::new(Vec::new()),
                ids: tree_ids,
                removed: Notify::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn user(&self) -> &Arc<User> {
        &self.user
    }

    pub fn tree_conn_count(&self) -> usize {
        self.trees.conns.read().len()
    }

    /// A snapshot of the registered tree ids, in collection order.
    pub fn tree_conn_ids(&self) -> Vec<u32> {
        self.trees.conns.read().iter().map(|t| t.id()).collect()
    }
}
