//! Statistics snapshots and health classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Capacity usage (percent) at or above which the cache is under pressure.
pub const PRESSURE_THRESHOLD_PERCENT: f64 = 90.0;

/// Hit ratio below which a populated cache is ineffective.
pub const INEFFECTIVE_HIT_RATIO: f64 = 0.5;

/// Classification of cache effectiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    Empty,
    Healthy,
    UnderPressure,
    Ineffective,
}

impl CacheState {
    /// Decision table, first match wins:
    /// no entries → `Empty`, capacity ≥ 90% → `UnderPressure`,
    /// hit ratio < 50% → `Ineffective`, otherwise `Healthy`.
    pub fn classify(entries_count: u64, capacity_used_percent: f64, hit_ratio: f64) -> Self {
        if entries_count == 0 {
            CacheState::Empty
        } else if capacity_used_percent >= PRESSURE_THRESHOLD_PERCENT {
            CacheState::UnderPressure
        } else if hit_ratio < INEFFECTIVE_HIT_RATIO {
            CacheState::Ineffective
        } else {
            CacheState::Healthy
        }
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheState::Empty => write!(f, "empty"),
            CacheState::Healthy => write!(f, "healthy"),
            CacheState::UnderPressure => write!(f, "under pressure"),
            CacheState::Ineffective => write!(f, "ineffective"),
        }
    }
}

/// Raw counters read from the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCounters {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
    /// Sum of the size units of resident entries.
    pub estimated_size: u64,
    pub evictions: u64,
}

/// Point-in-time statistics.
///
/// `hit_ratio`, `capacity_used_percent` and `state` are derived from the
/// counters when the snapshot is built and are never stored elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    /// 0.0 to 1.0; 0.0 when nothing was looked up yet.
    pub hit_ratio: f64,
    pub entries_count: u64,
    pub estimated_unit_size: u64,
    pub default_item_size: u64,
    pub max_unit_size: u64,
    /// 0 to 100; 0 when no ceiling is configured.
    pub capacity_used_percent: f64,
    pub eviction_count: u64,
    pub state: CacheState,
}

impl CacheStatistics {
    pub fn new(raw: RawCounters, default_item_size: u64, max_unit_size: u64) -> Self {
        let lookups = raw.hits.saturating_add(raw.misses);
        let hit_ratio = if lookups == 0 {
            0.0
        } else {
            raw.hits as f64 / lookups as f64
        };
        let capacity_used_percent = if max_unit_size == 0 {
            0.0
        } else {
            raw.estimated_size as f64 * 100.0 / max_unit_size as f64
        };

        CacheStatistics {
            hits: raw.hits,
            misses: raw.misses,
            hit_ratio,
            entries_count: raw.entries,
            estimated_unit_size: raw.estimated_size,
            default_item_size,
            max_unit_size,
            capacity_used_percent,
            eviction_count: raw.evictions,
            state: CacheState::classify(raw.entries, capacity_used_percent, hit_ratio),
        }
    }

    /// Snapshot for a store that does not report statistics.
    pub fn zeroed(default_item_size: u64, max_unit_size: u64) -> Self {
        Self::new(RawCounters::default(), default_item_size, max_unit_size)
    }

    pub fn total_lookups(&self) -> u64 {
        self.hits.saturating_add(self.misses)
    }
}
