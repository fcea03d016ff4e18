// src/core/tree/registry.rs

//! Connects, looks up, disconnects and bulk-tears-down the tree connects of a session.
//!
//! # Locking
//!
//! Each session's collection sits behind a read/write lock. Lookups take the read
//! lock just long enough to find the entry and bump its refcount. Insertion,
//! removal and the `Connected -> Disconnected` transition take the write lock.
//! No lock is held across a call into the authorization channel or across the
//! wait for a tree to drain.

use super::connect::{TreeConnect, TreeConnectRef, TreeState};
use super::pending::PendingTree;
use crate::core::errors::{LogoffReport, TreeConnError};
use crate::core::ipc::{AuthorizationChannel, TreeConnFlags, TreeConnectRequest};
use crate::core::metrics;
use crate::core::share::ShareConfigProvider;
use crate::session::{Session, SessionTrees};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// The tree-connect lifecycle service, shared by every session.
pub struct TreeConnectRegistry {
    shares: Arc<dyn ShareConfigProvider>,
    channel: Arc<dyn AuthorizationChannel>,
}

impl TreeConnectRegistry {
    pub fn new(shares: Arc<dyn ShareConfigProvider>, channel: Arc<dyn AuthorizationChannel>) -> Self {
        Self { shares, channel }
    }

    /// Connects `session` to the share called `share_name`.
    ///
    /// On success the returned tree is registered and visible to `lookup`, holding
    /// the registration reference (refcount 1). On failure nothing is left behind:
    /// the id, the share reference and the allocation are all given back.
    pub async fn connect(
        &self,
        session: &Session,
        peer_addr: SocketAddr,
        share_name: &str,
    ) -> Result<Arc<TreeConnect>, TreeConnError> {
        match self.try_connect(session, peer_addr, share_name).await {
            Ok(tree) => {
                metrics::TREE_CONNECTS_TOTAL.inc();
                metrics::ACTIVE_TREE_CONNECTS.inc();
                info!(
                    "Session {}: connected tree {} to share '{}' from {}",
                    session.id(),
                    tree.id(),
                    share_name,
                    peer_addr
                );
                Ok(tree)
            }
            Err(e) => {
                metrics::TREE_CONNECT_FAILURES_TOTAL
                    .with_label_values(&[e.kind().as_str()])
                    .inc();
                warn!(
                    "Session {}: tree connect to share '{}' failed: {}",
                    session.id(),
                    share_name,
                    e
                );
                Err(e)
            }
        }
    }

    async fn try_connect(
        &self,
        session: &Session,
        peer_addr: SocketAddr,
        share_name: &str,
    ) -> Result<Arc<TreeConnect>, TreeConnError> {
        let share = self
            .shares
            .resolve(share_name)
            .ok_or(TreeConnError::NotFound)?;

        // Reserve the collection slot up front so a failed allocation surfaces here
        // rather than after the daemon has approved the connect.
        if session.trees.conns.write().try_reserve(1).is_err() {
            self.shares.release(share);
            return Err(TreeConnError::OutOfMemory);
        }

        let Some(id) = session.trees.ids.acquire() else {
            self.shares.release(share);
            return Err(TreeConnError::InvalidId);
        };

        // From here on, an error or a dropped future gives the id and share back.
        let mut pending =
            PendingTree::new(id, share, session.trees.ids.as_ref(), self.shares.as_ref());
        let flags = self
            .authorize(session, peer_addr, share_name, &mut pending)
            .await?;

        let mut tree = pending.into_tree();
        tree.set_flags(flags);
        tree.bind_user(session.user());
        tree.mark_connected();
        let tree = Arc::new(tree);
        session.trees.conns.write().push(Arc::clone(&tree));
        Ok(tree)
    }

    /// Asks the authorization channel to approve the pending tree and returns the
    /// connection flags, refreshing the share configuration if the daemon reports
    /// it stale.
    async fn authorize(
        &self,
        session: &Session,
        peer_addr: SocketAddr,
        share_name: &str,
        pending: &mut PendingTree<'_>,
    ) -> Result<TreeConnFlags, TreeConnError> {
        let share_flags = pending.share().map(|share| share.flags).unwrap_or_default();
        let request = TreeConnectRequest {
            session_id: session.id(),
            account: session.user().name.clone(),
            share_name: share_name.to_string(),
            share_flags,
            tree_id: pending.id(),
            peer_addr,
        };

        let response = self
            .channel
            .request_connect(request)
            .await
            .ok_or(TreeConnError::AuthorizationFailed(None))?;
        if !response.status.is_ok() {
            return Err(TreeConnError::AuthorizationFailed(Some(response.status)));
        }

        let flags = response.connection_flags;
        if flags.contains(TreeConnFlags::UPDATE) {
            if let Some(stale) = pending.share() {
                self.shares.invalidate(stale);
            }
            // The stale handle stays pending until the fresh one is in hand,
            // so a failed refresh unwinds like any other failure.
            let Some(fresh) = self.shares.resolve(share_name) else {
                error!("Failed to update stale share config");
                return Err(TreeConnError::StaleShare);
            };
            if let Some(stale) = pending.replace_share(fresh) {
                self.shares.release(stale);
            }
            debug!(
                "Session {}: refreshed stale config of share '{}'",
                session.id(),
                share_name
            );
        }

        Ok(flags)
    }

    /// Finds the connected tree with `id` and takes a temporary claim on it.
    ///
    /// Returns `None` if no such tree is registered, if it is no longer connected,
    /// or if a concurrent disconnect has already drained its refcount.
    pub fn lookup(&self, session: &Session, id: u32) -> Option<TreeConnectRef> {
        let trees = session.trees.conns.read();
        let tree = trees.iter().find(|tree| tree.id() == id)?;
        if tree.state() != TreeState::Connected || !tree.try_get() {
            return None;
        }
        Some(TreeConnectRef::new(Arc::clone(tree)))
    }

    /// Disconnects a single tree.
    ///
    /// Callers must have released their own lookup claims first (see
    /// `TreeConnectRef::into_tree`); this waits until every other claim is gone.
    /// A notification failure is returned, but cleanup has completed regardless.
    pub async fn disconnect(
        &self,
        session: &Session,
        tree: &Arc<TreeConnect>,
    ) -> Result<(), TreeConnError> {
        let claimed = {
            let _trees = session.trees.conns.write();
            tree.mark_disconnected()
        };
        if !claimed {
            debug!(
                "Session {}: tree {} is already being disconnected",
                session.id(),
                tree.id()
            );
            return Err(TreeConnError::AlreadyDisconnected);
        }
        self.teardown(session, tree).await
    }

    /// Drains and frees a tree already moved to `Disconnected` by the caller.
    ///
    /// The work runs on its own task, so it completes even if the caller stops
    /// waiting: a claimed tree always leaves the collection.
    async fn teardown(&self, session: &Session, tree: &Arc<TreeConnect>) -> Result<(), TreeConnError> {
        let teardown = Teardown {
            session_id: session.id(),
            trees: Arc::clone(&session.trees),
            tree: Arc::clone(tree),
            shares: Arc::clone(&self.shares),
            channel: Arc::clone(&self.channel),
        };
        match tokio::spawn(teardown.run()).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                error!(
                    "Session {}: teardown of tree {} did not complete: {}",
                    session.id(),
                    tree.id(),
                    e
                );
                Err(TreeConnError::NotificationFailed(e.to_string()))
            }
        }
    }

    /// Tears down every tree connect of a session.
    ///
    /// Trees claimed by a concurrent `disconnect` are skipped and reported as
    /// `AlreadyDisconnected`; this then waits for that disconnect to remove them.
    /// When it returns the session's collection is empty and every tree has been
    /// drained and freed.
    pub async fn logoff_session(&self, session: &Session) -> LogoffReport {
        let mut report = LogoffReport::default();
        let mut skipped = HashSet::new();

        loop {
            // Registered before inspecting the list so a removal in between is not missed.
            let removed = session.trees.removed.notified();

            let next = {
                let trees = session.trees.conns.write();
                if trees.is_empty() {
                    break;
                }
                let claimed = trees.iter().find(|tree| tree.mark_disconnected()).cloned();
                if claimed.is_none() {
                    for tree in trees.iter() {
                        if skipped.insert(tree.id()) {
                            report.record(TreeConnError::AlreadyDisconnected);
                        }
                    }
                }
                claimed
            };

            match next {
                Some(tree) => {
                    report.disconnected += 1;
                    if let Err(e) = self.teardown(session, &tree).await {
                        report.record(e);
                    }
                }
                None => removed.await,
            }
        }

        info!(
            "Session {}: logoff disconnected {} trees ({} errors)",
            session.id(),
            report.disconnected,
            report.errors.len()
        );
        report
    }
}

/// Everything needed to finish removing a claimed tree, owned so it can run detached.
struct Teardown {
    session_id: u64,
    trees: Arc<SessionTrees>,
    tree: Arc<TreeConnect>,
    shares: Arc<dyn ShareConfigProvider>,
    channel: Arc<dyn AuthorizationChannel>,
}

impl Teardown {
    async fn run(self) -> Result<(), TreeConnError> {
        let Self {
            session_id,
            trees,
            tree,
            shares,
            channel,
        } = self;

        let holders = tree.refcount().saturating_sub(1);
        if holders > 0 {
            debug!(
                "Session {}: tree {} waiting for {} in-flight references",
                session_id,
                tree.id(),
                holders
            );
        }
        let started = Instant::now();
        if tree.put_and_drain().await {
            metrics::DISCONNECT_WAIT_SECONDS.observe(started.elapsed().as_secs_f64());
        }

        let notified = channel.request_disconnect(session_id, tree.id()).await;

        {
            // Released under the write lock: an id is never registered twice, and a
            // reader that finds the collection empty finds everything given back.
            let mut conns = trees.conns.write();
            conns.retain(|t| !Arc::ptr_eq(t, &tree));
            trees.ids.release(tree.id());
            if let Some(share) = tree.take_share() {
                shares.release(share);
            }
        }
        trees.removed.notify_waiters();

        metrics::ACTIVE_TREE_CONNECTS.dec();
        metrics::TREE_DISCONNECTS_TOTAL.inc();
        debug!("Session {}: tree {} disconnected", session_id, tree.id());

        notified.map_err(|e| {
            warn!(
                "Session {}: tree {} disconnect notification failed: {}",
                session_id,
                tree.id(),
                e
            );
            metrics::TREE_DISCONNECT_FAILURES_TOTAL.inc();
            TreeConnError::from(e)
        })
    }
}
