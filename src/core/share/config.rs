// src/core/share/config.rs

use crate::config::ShareDefinition;
use bitflags::bitflags;
use std::path::PathBuf;
use std::sync::Arc;

bitflags! {
    /// Static properties of a share.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShareFlags: u32 {
        const READ_ONLY  = 1 << 0;
        const BROWSEABLE = 1 << 1;
        const GUEST_OK   = 1 << 2;
        const PIPE       = 1 << 3;  // IPC$-style named pipe share, no backing path.
    }
}

/// A shared, reference-counted handle to a resolved share configuration.
pub type ShareHandle = Arc<ShareConfig>;

/// An immutable snapshot of one share's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareConfig {
    pub name: String,
    pub path: Option<PathBuf>,
    pub comment: Option<String>,
    pub flags: ShareFlags,
    /// Bumped every time the provider rebuilds a snapshot.
    pub generation: u64,
}

impl ShareConfig {
    pub(crate) fn from_definition(def: &ShareDefinition, generation: u64) -> Self {
        let mut flags = ShareFlags::empty();
        flags.set(ShareFlags::READ_ONLY, def.read_only);
        flags.set(ShareFlags::BROWSEABLE, def.browseable);
        flags.set(ShareFlags::GUEST_OK, def.guest_ok);
        flags.set(ShareFlags::PIPE, def.pipe);

        Self {
            name: def.name.clone(),
            path: def.path.clone(),
            comment: def.comment.clone(),
            flags,
            generation,
        }
    }

    pub fn has_flag(&self, flag: ShareFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn is_pipe(&self) -> bool {
        self.has_flag(ShareFlags::PIPE)
    }

    /// The case-insensitive lookup key for this share.
    pub fn key(&self) -> String {
        share_key(&self.name)
    }
}

pub(crate) fn share_key(name: &str) -> String {
    name.to_lowercase()
}
