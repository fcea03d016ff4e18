// src/core/tree/pending.rs

//! Defines `PendingTree`, an RAII guard for the resources a connect holds before
//! the tree is registered.

use super::connect::TreeConnect;
use super::ids::IdAllocator;
use crate::core::share::{ShareConfig, ShareConfigProvider, ShareHandle};
use tracing::debug;

/// Holds the id and share reference of a connect in progress.
///
/// If the guard is dropped before `into_tree`, because the connect failed or the
/// caller stopped waiting on it, both are given back.
pub(crate) struct PendingTree<'a> {
    id: u32,
    share: Option<ShareHandle>,
    ids: &'a dyn IdAllocator,
    shares: &'a dyn ShareConfigProvider,
    is_committed: bool,
}

impl<'a> PendingTree<'a> {
    pub(crate) fn new(
        id: u32,
        share: ShareHandle,
        ids: &'a dyn IdAllocator,
        shares: &'a dyn ShareConfigProvider,
    ) -> Self {
        Self {
            id,
            share: Some(share),
            ids,
            shares,
            is_committed: false,
        }
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn share(&self) -> Option<&ShareConfig> {
        self.share.as_deref()
    }

    /// Swaps in a fresh share handle, returning the one it replaces.
    pub(crate) fn replace_share(&mut self, share: ShareHandle) -> Option<ShareHandle> {
        self.share.replace(share)
    }

    /// Hands the id and share over to a new tree. Nothing is released on drop after this.
    pub(crate) fn into_tree(mut self) -> TreeConnect {
        self.is_committed = true;
        TreeConnect::new(self.id, self.share.take())
    }
}

impl Drop for PendingTree<'_> {
    fn drop(&mut self) {
        if self.is_committed {
            return;
        }
        self.ids.release(self.id);
        if let Some(share) = self.share.take() {
            self.shares.release(share);
        }
        debug!("Tree {}: unfinished connect gave back its id and share", self.id);
    }
}
