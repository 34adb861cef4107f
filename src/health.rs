//! Health check reporting derived from cache statistics.

use crate::statistics::{CacheState, CacheStatistics};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl From<CacheState> for HealthStatus {
    fn from(state: CacheState) -> Self {
        match state {
            CacheState::Empty | CacheState::Healthy => HealthStatus::Healthy,
            CacheState::UnderPressure | CacheState::Ineffective => HealthStatus::Degraded,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Outcome of a health check, ready to be served by a health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub description: String,
    /// Statistics snapshot, or `null` when none is available.
    pub data: Value,
}

impl HealthReport {
    pub fn from_statistics(stats: &CacheStatistics) -> Self {
        let description = match stats.state {
            CacheState::Empty => "Cache is empty".to_string(),
            CacheState::Healthy => format!(
                "Cache is healthy: hit ratio {:.1}%, {:.1}% capacity used",
                stats.hit_ratio * 100.0,
                stats.capacity_used_percent
            ),
            CacheState::UnderPressure => format!(
                "Cache is under memory pressure: {:.1}% capacity used",
                stats.capacity_used_percent
            ),
            CacheState::Ineffective => format!(
                "Cache is ineffective: hit ratio {:.1}%",
                stats.hit_ratio * 100.0
            ),
        };

        let data = match serde_json::to_value(stats) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to serialize cache statistics: {}", e);
                Value::Null
            }
        };

        HealthReport {
            status: stats.state.into(),
            description,
            data,
        }
    }

    pub fn unhealthy(description: impl Into<String>) -> Self {
        HealthReport {
            status: HealthStatus::Unhealthy,
            description: description.into(),
            data: Value::Null,
        }
    }
}
