// src/core/share/manager.rs

//! Resolves share names to shared configuration snapshots.
//!
//! Resolved snapshots are cached; every handle given out is a clone of the cached
//! `Arc`, so the strong count doubles as the share's reference count. Definitions
//! can change underneath the cache, which leaves the cached snapshot stale until
//! someone invalidates it.

use super::config::{ShareConfig, ShareHandle, share_key};
use crate::config::ShareDefinition;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// The share-config collaborator consumed by the tree-connect registry.
pub trait ShareConfigProvider: Send + Sync {
    /// Returns a new strong reference to the named share, or `None` if it does not exist.
    fn resolve(&self, name: &str) -> Option<ShareHandle>;

    /// Forgets the cached snapshot so the next `resolve` rebuilds it.
    fn invalidate(&self, share: &ShareConfig);

    /// Gives back a reference obtained from `resolve`.
    fn release(&self, share: ShareHandle);
}

/// The default `ShareConfigProvider`, backed by the configured share definitions.
#[derive(Debug, Default)]
pub struct ShareConfigManager {
    definitions: RwLock<HashMap<String, ShareDefinition>>,
    cache: DashMap<String, ShareHandle>,
    generation: AtomicU64,
}

impl ShareConfigManager {
    pub fn new(definitions: &[ShareDefinition]) -> Self {
        let manager = Self::default();
        {
            let mut defs = manager.definitions.write();
            for def in definitions {
                defs.insert(share_key(&def.name), def.clone());
            }
        }
        info!("Loaded {} share definitions", definitions.len());
        manager
    }

    /// Adds or replaces a share definition. A cached snapshot of the same share
    /// stays in use until it is invalidated.
    pub fn upsert_definition(&self, def: ShareDefinition) {
        debug!("Updating definition of share '{}'", def.name);
        self.definitions.write().insert(share_key(&def.name), def);
    }

    pub fn remove_definition(&self, name: &str) -> Option<ShareDefinition> {
        self.definitions.write().remove(&share_key(name))
    }

    /// The names of all defined shares.
    pub fn share_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .definitions
            .read()
            .values()
            .map(|d| d.name.clone())
            .collect();
        names.sort();
        names
    }

    /// The number of outstanding references to the cached snapshot of `name`,
    /// not counting the cache itself. Zero when nothing is cached.
    pub fn references(&self, name: &str) -> usize {
        self.cache
            .get(&share_key(name))
            .map_or(0, |entry| Arc::strong_count(entry.value()) - 1)
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.contains_key(&share_key(name))
    }

    fn build(&self, key: &str) -> Option<ShareHandle> {
        let defs = self.definitions.read();
        let def = defs.get(key)?;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        Some(Arc::new(ShareConfig::from_definition(def, generation)))
    }
}

impl ShareConfigProvider for ShareConfigManager {
    fn resolve(&self, name: &str) -> Option<ShareHandle> {
        let key = share_key(name);
        if let Some(entry) = self.cache.get(&key) {
            return Some(Arc::clone(entry.value()));
        }

        let fresh = self.build(&key)?;
        // Two resolvers may race to build the same share; the first insert wins.
        let entry = self.cache.entry(key).or_insert(fresh);
        Some(Arc::clone(entry.value()))
    }

    fn invalidate(&self, share: &ShareConfig) {
        let removed = self
            .cache
            .remove_if(&share.key(), |_, cached| cached.generation == share.generation);
        if removed.is_some() {
            debug!(
                "Invalidated share '{}' (generation {})",
                share.name, share.generation
            );
        }
    }

    fn release(&self, share: ShareHandle) {
        // The cache and `share` are the last two holders: nobody else uses this snapshot.
        self.cache.remove_if(&share.key(), |_, cached| {
            Arc::ptr_eq(cached, &share) && Arc::strong_count(cached) == 2
        });
        drop(share);
    }
}
