// src/core/ipc/channel.rs

//! An in-process `AuthorizationChannel` that hands requests to an authorization
//! daemon task over a bounded queue and waits for its reply.
//!
//! Every request carries a `oneshot` reply sender. The caller waits for the reply
//! under the configured timeout; a timeout, a full queue, or a daemon that drops
//! the reply sender all surface as "no response".

use super::{AuthorizationChannel, TreeConnStatus, TreeConnectRequest, TreeConnectResponse};
use crate::config::IpcConfig;
use crate::core::errors::IpcError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// A message delivered to the authorization daemon.
#[derive(Debug)]
pub enum IpcRequest {
    TreeConnect {
        request: TreeConnectRequest,
        reply: oneshot::Sender<TreeConnectResponse>,
    },
    TreeDisconnect {
        session_id: u64,
        tree_id: u32,
        reply: oneshot::Sender<TreeConnStatus>,
    },
}

/// The requesting side of the authorization queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct IpcChannel {
    sender: mpsc::Sender<IpcRequest>,
    timeout: Duration,
}

impl IpcChannel {
    /// Creates a new channel and returns the receiver the daemon task should drain.
    pub fn new(config: &IpcConfig) -> (Self, mpsc::Receiver<IpcRequest>) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let channel = Self {
            sender,
            timeout: config.timeout,
        };
        (channel, receiver)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Enqueues a request without waiting for queue space.
    fn enqueue(&self, request: IpcRequest) -> Result<(), IpcError> {
        match self.sender.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                error!("Authorization queue is full. The daemon is lagging behind requests.");
                Err(IpcError::NoResponse)
            }
            Err(TrySendError::Closed(_)) => {
                error!("Authorization queue is closed. The daemon has stopped.");
                Err(IpcError::Closed)
            }
        }
    }

    async fn await_reply<T>(&self, rx: oneshot::Receiver<T>) -> Result<T, IpcError> {
        match timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                warn!("Authorization daemon dropped a request without replying.");
                Err(IpcError::NoResponse)
            }
            Err(_) => {
                warn!(
                    "Authorization daemon did not reply within {:?}.",
                    self.timeout
                );
                Err(IpcError::NoResponse)
            }
        }
    }
}

#[async_trait]
impl AuthorizationChannel for IpcChannel {
    async fn request_connect(&self, request: TreeConnectRequest) -> Option<TreeConnectResponse> {
        debug!(
            "Session {}: requesting tree connect to '{}' (tree id {})",
            request.session_id, request.share_name, request.tree_id
        );
        let (reply, rx) = oneshot::channel();
        self.enqueue(IpcRequest::TreeConnect { request, reply }).ok()?;
        self.await_reply(rx).await.ok()
    }

    async fn request_disconnect(&self, session_id: u64, tree_id: u32) -> Result<(), IpcError> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(IpcRequest::TreeDisconnect {
            session_id,
            tree_id,
            reply,
        })?;
        let status = self.await_reply(rx).await?;
        if status.is_ok() {
            Ok(())
        } else {
            Err(IpcError::Status(status))
        }
    }
}
