use moka::Expiry;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest time to live the store hands to moka.
pub(crate) const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A stored factory result, type-erased so one store holds any value type.
#[derive(Clone)]
pub(crate) struct Stored {
    value: Arc<dyn Any + Send + Sync>,
    pub(crate) size: u64,
    ttl: Duration,
}

impl Stored {
    pub(crate) fn new<T: Send + Sync + 'static>(value: T, size: u64, ttl: Duration) -> Self {
        Stored {
            value: Arc::new(value),
            size,
            ttl: ttl.min(MAX_TTL),
        }
    }

    /// The value, if it was stored as a `T`.
    pub(crate) fn downcast<T: Clone + 'static>(&self) -> Option<T> {
        self.value.downcast_ref::<T>().cloned()
    }

    pub(crate) fn weight(&self) -> u32 {
        u32::try_from(self.size).unwrap_or(u32::MAX)
    }
}

/// Expiration fixed at population; reads and replacements keep it.
pub(crate) struct EntryExpiry;

impl Expiry<String, Stored> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Stored,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}
