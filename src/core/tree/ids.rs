// src/core/tree/ids.rs

//! Per-session tree id allocation.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use tracing::error;

/// Hands out ids that are unique among the ids currently held.
pub trait IdAllocator: Send + Sync {
    /// Reserves a fresh id, or `None` if the id space is exhausted.
    fn acquire(&self) -> Option<u32>;

    /// Returns an id to the pool.
    fn release(&self, id: u32);
}

/// The default allocator: always hands out the lowest free id in `1..=max`.
#[derive(Debug)]
pub struct IdPool {
    max: u32,
    in_use: Mutex<BTreeSet<u32>>,
}

impl IdPool {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            in_use: Mutex::new(BTreeSet::new()),
        }
    }

    /// The number of ids currently held.
    pub fn in_use(&self) -> usize {
        self.in_use.lock().len()
    }

    pub fn is_in_use(&self, id: u32) -> bool {
        self.in_use.lock().contains(&id)
    }
}

impl IdAllocator for IdPool {
    fn acquire(&self) -> Option<u32> {
        let mut in_use = self.in_use.lock();
        if in_use.len() >= self.max as usize {
            return None;
        }

        // The set is ordered, so the first gap in 1, 2, 3... is the lowest free id.
        let mut candidate = 1u32;
        for &id in in_use.iter() {
            if id != candidate {
                break;
            }
            candidate += 1;
        }

        if candidate > self.max {
            return None;
        }
        in_use.insert(candidate);
        Some(candidate)
    }

    fn release(&self, id: u32) {
        if !self.in_use.lock().remove(&id) {
            error!("Attempted to release tree id {} which is not in use", id);
        }
    }
}

