// src/core/ipc/mod.rs

//! The contract with the out-of-process authorization daemon that approves
//! tree connects and is told about tree disconnects.

mod channel;

pub use channel::{IpcChannel, IpcRequest};

use crate::core::errors::IpcError;
use crate::core::share::ShareFlags;
use async_trait::async_trait;
use bitflags::bitflags;
use std::fmt;
use std::net::SocketAddr;

bitflags! {
    /// Connection flags handed back by the authorization daemon.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TreeConnFlags: u32 {
        const GUEST_ACCOUNT = 1 << 0;
        const READ_ONLY     = 1 << 1;
        const WRITABLE      = 1 << 2;
        const ADMIN_ACCOUNT = 1 << 3;
        const UPDATE        = 1 << 4;  // The share config we sent is stale.
    }
}

/// Status codes of a tree connect response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeConnStatus {
    Ok,
    NoMemory,
    NoShare,
    NoUser,
    Error,
    TooManyConns,
    TooManySessions,
    Other(u32),
}

impl TreeConnStatus {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => TreeConnStatus::Ok,
            1 => TreeConnStatus::NoMemory,
            2 => TreeConnStatus::NoShare,
            3 => TreeConnStatus::NoUser,
            4 => TreeConnStatus::Error,
            5 => TreeConnStatus::TooManyConns,
            6 => TreeConnStatus::TooManySessions,
            other => TreeConnStatus::Other(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            TreeConnStatus::Ok => 0,
            TreeConnStatus::NoMemory => 1,
            TreeConnStatus::NoShare => 2,
            TreeConnStatus::NoUser => 3,
            TreeConnStatus::Error => 4,
            TreeConnStatus::TooManyConns => 5,
            TreeConnStatus::TooManySessions => 6,
            TreeConnStatus::Other(code) => *code,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, TreeConnStatus::Ok)
    }
}

impl fmt::Display for TreeConnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeConnStatus::Ok => write!(f, "OK"),
            TreeConnStatus::NoMemory => write!(f, "NOMEM"),
            TreeConnStatus::NoShare => write!(f, "NO_SHARE"),
            TreeConnStatus::NoUser => write!(f, "NO_USER"),
            TreeConnStatus::Error => write!(f, "ERROR"),
            TreeConnStatus::TooManyConns => write!(f, "TOO_MANY_CONNS"),
            TreeConnStatus::TooManySessions => write!(f, "TOO_MANY_SESSIONS"),
            TreeConnStatus::Other(code) => write!(f, "UNKNOWN({code})"),
        }
    }
}

/// Everything the daemon needs to decide on a tree connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConnectRequest {
    pub session_id: u64,
    pub account: String,
    pub share_name: String,
    pub share_flags: ShareFlags,
    /// The tentative tree id, already reserved in the session.
    pub tree_id: u32,
    pub peer_addr: SocketAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConnectResponse {
    pub status: TreeConnStatus,
    pub connection_flags: TreeConnFlags,
}

/// The authorization channel consulted on every tree connect and disconnect.
///
/// Both calls may block for an inter-process round trip. Implementations report
/// transport failures through their return values and never panic.
#[async_trait]
pub trait AuthorizationChannel: Send + Sync {
    /// Asks for approval of a tree connect. `None` means no response was received.
    async fn request_connect(&self, request: TreeConnectRequest) -> Option<TreeConnectResponse>;

    /// Tells the daemon that a tree connect has gone away.
    async fn request_disconnect(&self, session_id: u64, tree_id: u32) -> Result<(), IpcError>;
}
