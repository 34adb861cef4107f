use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Why an entry left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// The store needed the capacity.
    Capacity,
    /// The entry's expiration passed.
    Expired,
    /// The entry was removed on request.
    Removed,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionReason::Capacity => write!(f, "evicted due to capacity"),
            EvictionReason::Expired => write!(f, "evicted due to expiration"),
            EvictionReason::Removed => write!(f, "removed"),
        }
    }
}

/// Receives a notification for every stored entry that leaves the store.
///
/// Called synchronously on the thread that removed the entry; keep it cheap.
pub trait EvictionListener: Send + Sync {
    fn on_evict(&self, key: &str, size: u64, reason: EvictionReason);
}

/// Counts evictions caused by capacity pressure and nothing else.
#[derive(Debug, Default)]
pub struct CapacityEvictionCounter {
    count: AtomicU64,
}

impl CapacityEvictionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl EvictionListener for CapacityEvictionCounter {
    fn on_evict(&self, _key: &str, _size: u64, reason: EvictionReason) {
        if reason == EvictionReason::Capacity {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }
}
