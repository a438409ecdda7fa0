//! Bounded page cache with pluggable eviction.
//!
//! The pool maps `(file, offset)` to shared page handles and is bounded by a
//! fixed capacity; on insertion at capacity one victim is evicted by the
//! active policy:
//!
//! - **LRU**: recency list, front = most recent; `get` refreshes, evict the
//!   tail.
//! - **CLOCK**: fixed ring of `(key, reference_bit)` slots with a sweeping
//!   hand; `get` sets the bit, insertion sweeps: bit 0 → evict and install,
//!   bit 1 → clear and advance.
//! - **RANDOM**: unordered key pool; evict a uniformly drawn entry.
//!
//! Callers guard the pool with a single lock (see `PageManager`); the pool
//! itself is plain mutable state.

use crate::page::Page;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Cache key: file identity plus page offset, so that two files at the same
/// offset never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub file: String,
    pub offset: u64,
}

/// Selects how the pool picks eviction victims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    Lru,
    Clock,
    Random,
}

#[derive(Debug, Clone)]
struct ClockSlot {
    key: PageKey,
    referenced: bool,
}

/// Per-policy bookkeeping, rebuilt when the policy changes.
#[derive(Debug)]
enum PolicyState {
    Lru {
        /// Front = most recently used.
        recency: VecDeque<PageKey>,
    },
    Clock {
        slots: Vec<Option<ClockSlot>>,
        hand: usize,
    },
    Random {
        pool: Vec<PageKey>,
    },
}

impl PolicyState {
    fn new(policy: EvictionPolicy, capacity: usize, keys: impl Iterator<Item = PageKey>) -> Self {
        match policy {
            EvictionPolicy::Lru => PolicyState::Lru {
                recency: keys.collect(),
            },
            EvictionPolicy::Clock => {
                let mut slots = vec![None; capacity];
                for (slot, key) in slots.iter_mut().zip(keys) {
                    *slot = Some(ClockSlot {
                        key,
                        referenced: false,
                    });
                }
                PolicyState::Clock { slots, hand: 0 }
            }
            EvictionPolicy::Random => PolicyState::Random {
                pool: keys.collect(),
            },
        }
    }

    fn policy(&self) -> EvictionPolicy {
        match self {
            PolicyState::Lru { .. } => EvictionPolicy::Lru,
            PolicyState::Clock { .. } => EvictionPolicy::Clock,
            PolicyState::Random { .. } => EvictionPolicy::Random,
        }
    }
}

/// Bounded cache of deserialized pages shared across SSTable files.
#[derive(Debug)]
pub struct BufferPool {
    capacity: usize,
    table: HashMap<PageKey, Arc<Page>>,
    state: PolicyState,
    hits: u64,
}

impl BufferPool {
    /// Creates a pool holding at most `capacity` pages (clamped to ≥ 1).
    #[must_use]
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            table: HashMap::with_capacity(capacity),
            state: PolicyState::new(policy, capacity, std::iter::empty()),
            hits: 0,
        }
    }

    /// Looks up a page, updating recency bookkeeping and the hit counter.
    pub fn get(&mut self, key: &PageKey) -> Option<Arc<Page>> {
        let page = self.table.get(key).cloned()?;
        self.hits += 1;
        self.touch(key);
        Some(page)
    }

    /// Inserts or replaces a page. At capacity, one victim is evicted by the
    /// active policy before the new page is installed. Replacing a resident
    /// page never evicts.
    pub fn put(&mut self, key: PageKey, page: Arc<Page>) {
        if let Some(existing) = self.table.get_mut(&key) {
            *existing = page;
            self.touch(&key);
            return;
        }
        if self.table.len() >= self.capacity {
            if let Some(victim) = self.evict() {
                self.table.remove(&victim);
            }
        }
        self.table.insert(key.clone(), page);
        self.install(key);
    }

    /// Switches the eviction policy, rebuilding its bookkeeping over the
    /// resident pages.
    pub fn set_policy(&mut self, policy: EvictionPolicy) {
        self.state = PolicyState::new(policy, self.capacity, self.table.keys().cloned());
    }

    #[must_use]
    pub fn policy(&self) -> EvictionPolicy {
        self.state.policy()
    }

    /// Number of `get` calls that found their page resident.
    #[must_use]
    pub fn cache_hits(&self) -> u64 {
        self.hits
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // ---- Policy mechanics ----

    fn touch(&mut self, key: &PageKey) {
        match &mut self.state {
            PolicyState::Lru { recency } => {
                if let Some(pos) = recency.iter().position(|k| k == key) {
                    recency.remove(pos);
                }
                recency.push_front(key.clone());
            }
            PolicyState::Clock { slots, .. } => {
                for slot in slots.iter_mut().flatten() {
                    if slot.key == *key {
                        slot.referenced = true;
                        break;
                    }
                }
            }
            // Access order is irrelevant to random eviction.
            PolicyState::Random { .. } => {}
        }
    }

    /// Registers a freshly inserted key with the active policy.
    fn install(&mut self, key: PageKey) {
        match &mut self.state {
            PolicyState::Lru { recency } => recency.push_front(key),
            PolicyState::Clock { slots, hand } => {
                // A free slot is guaranteed: eviction ran first when full.
                let len = slots.len();
                for step in 0..len {
                    let idx = (*hand + step) % len;
                    if slots[idx].is_none() {
                        slots[idx] = Some(ClockSlot {
                            key,
                            referenced: true,
                        });
                        *hand = (idx + 1) % len;
                        return;
                    }
                }
            }
            PolicyState::Random { pool } => pool.push(key),
        }
    }

    fn evict(&mut self) -> Option<PageKey> {
        match &mut self.state {
            PolicyState::Lru { recency } => recency.pop_back(),
            PolicyState::Clock { slots, hand } => {
                // Sweep: clear set bits until an unreferenced slot turns up.
                loop {
                    match &mut slots[*hand] {
                        Some(slot) if slot.referenced => {
                            slot.referenced = false;
                            *hand = (*hand + 1) % slots.len();
                        }
                        Some(slot) => {
                            let key = slot.key.clone();
                            slots[*hand] = None;
                            return Some(key);
                        }
                        None => return None,
                    }
                }
            }
            PolicyState::Random { pool } => {
                if pool.is_empty() {
                    return None;
                }
                let idx = rand::thread_rng().gen_range(0..pool.len());
                Some(pool.swap_remove(idx))
            }
        }
    }
}
