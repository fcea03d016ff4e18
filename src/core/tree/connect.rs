// src/core/tree/connect.rs

//! Defines `TreeConnect`, one binding of a session to a share, and the
//! reference-counting protocol that keeps it alive while requests run against it.
//!
//! The refcount starts at one for the registration itself. Every successful lookup
//! adds one, and `TreeConnectRef` gives it back on drop. Disconnect drops the
//! registration reference and then waits on `drained` until the count reaches zero;
//! whoever brings it to zero signals the waiter. The count is never touched under
//! the session lock, so a disconnect waiting for drainage cannot block lookups.

use crate::core::ipc::TreeConnFlags;
use crate::core::share::{ShareConfig, ShareHandle};
use crate::session::User;
use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::error;

/// The lifecycle state of a tree connect. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeState {
    /// Allocated, not yet visible to lookups.
    New,
    /// Registered in its session and visible to lookups.
    Connected,
    /// Being torn down; lookups no longer succeed.
    Disconnected,
}

pub struct TreeConnect {
    id: u32,
    share: RwLock<Option<ShareHandle>>,
    user: Weak<User>,
    flags: TreeConnFlags,
    refcount: AtomicU32,
    state: Mutex<TreeState>,
    drained: Notify,
}

impl fmt::Debug for TreeConnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeConnect")
            .field("id", &self.id)
            .field("share", &self.share_name())
            .field("flags", &self.flags)
            .field("refcount", &self.refcount())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl TreeConnect {
    /// Allocates a tentative tree connect in the `New` state.
    pub(crate) fn new(id: u32, share: Option<ShareHandle>) -> Self {
        Self {
            id,
            share: RwLock::new(share),
            user: Weak::new(),
            flags: TreeConnFlags::empty(),
            refcount: AtomicU32::new(0),
            state: Mutex::new(TreeState::New),
            drained: Notify::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Borrows the share configuration. `None` once the tree has been torn down.
    pub fn share(&self) -> Option<MappedRwLockReadGuard<'_, ShareConfig>> {
        RwLockReadGuard::try_map(self.share.read(), |share| share.as_deref()).ok()
    }

    pub fn share_name(&self) -> Option<String> {
        self.share().map(|share| share.name.clone())
    }

    /// The session user this tree was connected for, if the session still exists.
    pub fn user(&self) -> Option<Arc<User>> {
        self.user.upgrade()
    }

    pub fn flags(&self) -> TreeConnFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: TreeConnFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn is_writable(&self) -> bool {
        self.has_flag(TreeConnFlags::WRITABLE) && !self.has_flag(TreeConnFlags::READ_ONLY)
    }

    pub fn state(&self) -> TreeState {
        *self.state.lock()
    }

    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Acquire)
    }

    // --- Construction-time setters, only usable before the tree is shared ---

    pub(crate) fn set_flags(&mut self, flags: TreeConnFlags) {
        self.flags = flags;
    }

    pub(crate) fn bind_user(&mut self, user: &Arc<User>) {
        self.user = Arc::downgrade(user);
    }

    /// Moves a `New` tree to `Connected` holding the registration reference.
    pub(crate) fn mark_connected(&mut self) {
        *self.state.get_mut() = TreeState::Connected;
        *self.refcount.get_mut() = 1;
    }

    // --- Shared-state transitions ---

    /// Moves a `Connected` tree to `Disconnected`. Returns false if it was not connected.
    /// Callers hold the session write lock.
    pub(crate) fn mark_disconnected(&self) -> bool {
        let mut state = self.state.lock();
        if *state != TreeState::Connected {
            return false;
        }
        *state = TreeState::Disconnected;
        true
    }

    /// Takes the share handle out for release during teardown.
    pub(crate) fn take_share(&self) -> Option<ShareHandle> {
        self.share.write().take()
    }

    /// Increments the refcount unless it has already drained to zero.
    pub(crate) fn try_get(&self) -> bool {
        self.refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count != 0).then(|| count + 1)
            })
            .is_ok()
    }

    /// Drops one reference. Returns true if this brought the count to zero.
    pub(crate) fn put(&self) -> bool {
        match self
            .refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            }) {
            Ok(1) => {
                // Stores a permit if the disconnecting task has not started waiting yet.
                self.drained.notify_one();
                true
            }
            Ok(_) => false,
            Err(_) => {
                error!("Tree connect {}: refcount underflow ignored", self.id);
                false
            }
        }
    }

    /// Drops the registration reference and waits for every other holder to release.
    /// Returns true if it had to wait.
    pub(crate) async fn put_and_drain(&self) -> bool {
        if self.put() {
            return false;
        }
        while self.refcount() != 0 {
            self.drained.notified().await;
        }
        true
    }
}

/// A temporary claim on a tree connect obtained through lookup.
///
/// The claim is released when the guard is dropped (or through `release`),
/// which may wake a disconnect waiting for the tree to drain.
pub struct TreeConnectRef {
    tree: Arc<TreeConnect>,
}

impl TreeConnectRef {
    pub(crate) fn new(tree: Arc<TreeConnect>) -> Self {
        Self { tree }
    }

    pub fn tree(&self) -> &Arc<TreeConnect> {
        &self.tree
    }

    /// Releases the claim explicitly.
    pub fn release(self) {}

    /// Releases the claim and hands back the tree, e.g. to pass it to `disconnect`.
    pub fn into_tree(self) -> Arc<TreeConnect> {
        Arc::clone(&self.tree)
    }
}

impl Deref for TreeConnectRef {
    type Target = TreeConnect;

    fn deref(&self) -> &Self::Target {
        &self.tree
    }
}

impl fmt::Debug for TreeConnectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TreeConnectRef").field(&self.tree).finish()
    }
}

impl Drop for TreeConnectRef {
    fn drop(&mut self) {
        self.tree.put();
    }
}
