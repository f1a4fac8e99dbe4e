// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process-wide table of live queues plus the `qid` allocator. A queue
//! registers itself once setup completes and removes itself as the
//! first step of teardown (`queue::teardown`), so nothing outside this
//! module ever needs to reason about a half-torn-down queue.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

/// Free-bitmap allocator for queue identifiers. The original source
/// hands these out from a monotonic counter that never wraps within a
/// controller's lifetime; this crate instead reclaims `qid`s so a
/// long-lived target with many short connections doesn't exhaust the
/// 16-bit space.
pub struct QidAllocator {
    bits: Mutex<Vec<u64>>,
    capacity: u16,
}

impl QidAllocator {
    pub fn new(capacity: u16) -> Self {
        let words = (capacity as usize).div_ceil(64);
        QidAllocator { bits: Mutex::new(vec![0u64; words]), capacity }
    }

    pub async fn alloc(&self) -> Option<u16> {
        let mut bits = self.bits.lock().await;
        for (word_idx, word) in bits.iter_mut().enumerate() {
            if *word != u64::MAX {
                let bit = (!*word).trailing_zeros() as usize;
                let qid = word_idx * 64 + bit;
                if qid >= self.capacity as usize {
                    return None;
                }
                *word |= 1 << bit;
                return Some(qid as u16);
            }
        }
        None
    }

    pub async fn free(&self, qid: u16) {
        let mut bits = self.bits.lock().await;
        let word_idx = qid as usize / 64;
        let bit = qid as usize % 64;
        bits[word_idx] &= !(1 << bit);
    }
}

/// Marker entry kept per live queue. The registry doesn't need to hold
/// the `Queue` itself (each queue's worker task owns that); it only
/// needs enough to answer "is this qid live" and to hand a shutdown
/// signal to a specific queue's task if asked.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub qid: u16,
}

#[derive(Clone)]
pub struct Registry {
    queues: Arc<DashMap<u16, RegistryEntry>>,
    qids: Arc<QidAllocator>,
}

impl Registry {
    pub fn new(max_queues: u16) -> Self {
        Registry { queues: Arc::new(DashMap::new()), qids: Arc::new(QidAllocator::new(max_queues)) }
    }

    /// Allocates a fresh `qid` and registers it as live in one step, so
    /// no caller can observe a `qid` that's allocated but not yet
    /// tracked.
    pub async fn register(&self) -> Option<u16> {
        let qid = self.qids.alloc().await?;
        self.queues.insert(qid, RegistryEntry { qid });
        Some(qid)
    }

    pub async fn remove(&self, qid: u16) {
        self.queues.remove(&qid);
        self.qids.free(qid).await;
    }

    pub fn is_live(&self, qid: u16) -> bool {
        self.queues.contains_key(&qid)
    }

    pub fn live_count(&self) -> usize {
        self.queues.len()
    }
}
