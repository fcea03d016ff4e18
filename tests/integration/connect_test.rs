// tests/integration/connect_test.rs

//! Integration tests for tree connect: success, every failure path, and the
//! stale share refresh.

use super::test_helpers::{TestContext, peer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use treeconn::config::ShareDefinition;
use treeconn::core::ipc::{TreeConnFlags, TreeConnStatus};
use treeconn::core::share::{ShareConfigProvider, ShareFlags};
use treeconn::core::{IpcError, TreeConnError, TreeState};

#[tokio::test]
async fn test_connect_registers_connected_tree() {
    let ctx = TestContext::new();

    let tree = ctx.connect("docs").await.unwrap();

    assert_eq!(tree.id(), 1);
    assert_eq!(tree.state(), TreeState::Connected);
    assert_eq!(tree.refcount(), 1);
    assert_eq!(tree.share_name().as_deref(), Some("docs"));
    assert_eq!(tree.user().unwrap().name, "alice");
    assert!(tree.is_writable());
    assert_eq!(ctx.session.tree_conn_ids(), vec![1]);
    assert_eq!(ctx.shares.references("docs"), 1);
}

#[tokio::test]
async fn test_connect_sends_request_details() {
    let ctx = TestContext::new();

    let tree = ctx.connect("DOCS").await.unwrap();

    let requests = ctx.channel.connect_requests.lock().clone();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.session_id, 7);
    assert_eq!(request.account, "alice");
    assert_eq!(request.share_name, "DOCS");
    assert_eq!(request.tree_id, tree.id());
    assert_eq!(request.peer_addr, peer());
    assert!(request.share_flags.contains(ShareFlags::BROWSEABLE));
}

#[tokio::test]
async fn test_connect_copies_connection_flags() {
    let ctx = TestContext::new();
    ctx.channel.reply_with(
        TreeConnStatus::Ok,
        TreeConnFlags::READ_ONLY | TreeConnFlags::GUEST_ACCOUNT,
    );

    let tree = ctx.connect("media").await.unwrap();

    assert!(tree.has_flag(TreeConnFlags::READ_ONLY));
    assert!(tree.has_flag(TreeConnFlags::GUEST_ACCOUNT));
    assert!(!tree.is_writable());
}

#[tokio::test]
async fn test_connect_unknown_share() {
    let ctx = TestContext::new();

    let err = ctx.connect("nope").await.unwrap_err();

    assert_eq!(err, TreeConnError::NotFound);
    assert_eq!(ctx.channel.connect_count(), 0);
    ctx.assert_clean();
}

#[tokio::test]
async fn test_connect_id_space_exhausted() {
    let ctx = TestContext::with_shares(&[ShareDefinition::disk("docs", "/srv/docs")], 2);
    let first = ctx.connect("docs").await.unwrap();
    let second = ctx.connect("docs").await.unwrap();

    let err = ctx.connect("docs").await.unwrap_err();

    assert_eq!(err, TreeConnError::InvalidId);
    assert_eq!(ctx.session.tree_conn_count(), 2);
    assert_eq!(ctx.ids.in_use(), 2);
    assert_eq!(ctx.shares.references("docs"), 2);
    assert_eq!(ctx.channel.connect_count(), 2);

    ctx.disconnect(&first).await.unwrap();
    ctx.disconnect(&second).await.unwrap();
    ctx.assert_clean();
}

#[tokio::test]
async fn test_connect_no_response_unwinds() {
    let ctx = TestContext::new();
    ctx.channel.stop_responding();

    let err = ctx.connect("docs").await.unwrap_err();

    assert_eq!(err, TreeConnError::AuthorizationFailed(None));
    ctx.assert_clean();
    assert!(!ctx.shares.is_cached("docs"));
}

#[tokio::test]
async fn test_connect_rejected_status_is_propagated() {
    let ctx = TestContext::new();
    ctx.channel
        .reply_with(TreeConnStatus::TooManyConns, TreeConnFlags::empty());

    let err = ctx.connect("docs").await.unwrap_err();

    assert_eq!(
        err,
        TreeConnError::AuthorizationFailed(Some(TreeConnStatus::TooManyConns))
    );
    ctx.assert_clean();
}

#[tokio::test]
async fn test_failed_connect_leaves_existing_state_untouched() {
    let ctx = TestContext::new();
    let tree = ctx.connect("docs").await.unwrap();
    ctx.channel
        .reply_with(TreeConnStatus::NoUser, TreeConnFlags::empty());

    let err = ctx.connect("docs").await.unwrap_err();

    assert_eq!(
        err,
        TreeConnError::AuthorizationFailed(Some(TreeConnStatus::NoUser))
    );
    assert_eq!(ctx.session.tree_conn_ids(), vec![tree.id()]);
    assert_eq!(ctx.ids.in_use(), 1);
    assert_eq!(ctx.shares.references("docs"), 1);
}

#[tokio::test]
async fn test_connect_refreshes_stale_share() {
    let ctx = TestContext::new();
    let held = ctx.shares.resolve("docs").unwrap();
    ctx.shares
        .upsert_definition(ShareDefinition::disk("docs", "/srv/docs-v2"));
    ctx.channel.reply_with(
        TreeConnStatus::Ok,
        TreeConnFlags::WRITABLE | TreeConnFlags::UPDATE,
    );

    let tree = ctx.connect("docs").await.unwrap();

    let share = tree.share().unwrap();
    assert_eq!(share.path.as_deref(), Some(std::path::Path::new("/srv/docs-v2")));
    assert!(share.generation > held.generation);
    drop(share);
    // The tree no longer references the stale snapshot.
    assert_eq!(Arc::strong_count(&held), 1);
    assert_eq!(ctx.shares.references("docs"), 1);

    ctx.shares.release(held);
    ctx.disconnect(&tree).await.unwrap();
    ctx.assert_clean();
}

#[tokio::test]
async fn test_connect_stale_share_refresh_failure() {
    let ctx = TestContext::new();
    let held = ctx.shares.resolve("docs").unwrap();
    ctx.shares.remove_definition("docs");
    ctx.channel
        .reply_with(TreeConnStatus::Ok, TreeConnFlags::UPDATE);

    let err = ctx.connect("docs").await.unwrap_err();

    assert_eq!(err, TreeConnError::StaleShare);
    assert_eq!(ctx.session.tree_conn_count(), 0);
    assert_eq!(ctx.ids.in_use(), 0);
    assert_eq!(Arc::strong_count(&held), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connects_get_distinct_trees() {
    let ctx = TestContext::new();
    let gate = Arc::new(Semaphore::new(0));
    ctx.channel.gate_connects(gate.clone());

    let a = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.connect("docs").await }
    });
    let b = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.connect("docs").await }
    });

    // Both requests are parked in the daemon with their ids reserved.
    super::test_helpers::wait_until(|| ctx.channel.connect_count() == 2).await;
    assert_eq!(ctx.ids.in_use(), 2);
    // Lookups are not blocked while connects wait on the daemon.
    assert!(ctx.registry.lookup(&ctx.session, 1).is_none());
    gate.add_permits(2);

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    assert_ne!(a.id(), b.id());
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.share().unwrap().generation, b.share().unwrap().generation);
    assert_eq!(ctx.shares.references("docs"), 2);
    let mut ids = ctx.session.tree_conn_ids();
    ids.sort();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn test_connect_pipe_share() {
    let ctx = TestContext::new();

    let tree = ctx.connect("ipc$").await.unwrap();

    let share = tree.share().unwrap();
    assert!(share.is_pipe());
    assert!(share.path.is_none());
}

#[tokio::test]
async fn test_disconnect_notification_failure_does_not_block_reconnect() {
    let ctx = TestContext::new();
    let tree = ctx.connect("docs").await.unwrap();
    ctx.channel.fail_disconnects(IpcError::NoResponse);

    let err = ctx.disconnect(&tree).await.unwrap_err();
    assert_eq!(
        err,
        TreeConnError::NotificationFailed(IpcError::NoResponse.to_string())
    );

    let again = ctx.connect("docs").await.unwrap();
    assert_eq!(again.id(), 1);
}

#[tokio::test]
async fn test_abandoned_connect_gives_back_id_and_share() {
    let ctx = TestContext::with_shares(&super::test_helpers::default_shares(), 2);
    let gate = Arc::new(Semaphore::new(0));
    ctx.channel.gate_connects(gate.clone());

    // More abandoned connects than there are ids: none of them may keep one.
    for _ in 0..3 {
        let abandoned = tokio::time::timeout(Duration::from_millis(20), ctx.connect("docs")).await;
        assert!(abandoned.is_err(), "gated connect finished");
    }
    assert_eq!(ctx.channel.connect_count(), 3);
    ctx.assert_clean();

    gate.add_permits(1);
    let tree = ctx.connect("docs").await.unwrap();
    assert_eq!(tree.id(), 1);
    assert_eq!(ctx.shares.references("docs"), 1);
}

