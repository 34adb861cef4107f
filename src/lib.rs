//! # anime-cache
//!
//! In-process get-or-create cache for the anime catalog backend.
//!
//! ## Features
//!
//! - **Single-flight:** concurrent misses on one key run the factory once
//! - **Derived keys:** a computation descriptor ([`Expr`]) can stand in for
//!   an explicit key; equal inputs hit the same entry
//! - **Normalized keys:** case and whitespace differences never split entries
//! - **Bounded:** entries carry a size; the store evicts to stay under its
//!   ceiling and counts those evictions
//! - **Observable:** statistics snapshots, health classification, metrics
//!   hooks and `log` output
//!
//! ## Quick Start
//!
//! Use [`CacheService`] for easy sharing across threads:
//!
//! ```ignore
//! use anime_cache::{CacheService, EntryOptions, Expr, Method};
//! use std::time::Duration;
//!
//! let cache = CacheService::from_env()?;
//! let cache_clone = cache.clone();  // Cheap - just Arc increment
//!
//! // explicit key
//! let genres = cache.get_or_create("genres:all", || repo.genres()).await?;
//!
//! // key derived from what the factory computes
//! let descriptor = Expr::lambda(Expr::call(
//!     Expr::constant("anime_service"),
//!     Method::asynchronous("AnimeService", "get_by_id"),
//!     vec![Expr::captured("id", id)],
//! ));
//! let anime = cache
//!     .get_or_create_auto_with(
//!         &descriptor,
//!         || repo.get_by_id(id),
//!         EntryOptions::default().with_ttl(Duration::from_secs(60)),
//!     )
//!     .await?;
//!
//! let report = cache.health();
//! ```
//!
//! ### Lower-level pieces
//!
//! [`CacheStore`] works with already normalized string keys, [`Evaluator`]
//! and [`KeyDeriver`] expose key derivation on their own.

#[macro_use]
extern crate log;

pub mod compiled;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod health;
pub mod key;
pub mod observability;
pub mod service;
pub mod statistics;
pub mod store;

// Re-exports for convenience
pub use compiled::CompiledFragments;
pub use config::CacheConfig;
pub use error::{Error, Result};
pub use evaluator::Evaluator;
pub use expression::{Expr, Method, StaticOwner, StaticType};
pub use health::{HealthReport, HealthStatus};
pub use key::{KeyDeriver, KeyNormalizer};
pub use service::CacheService;
pub use statistics::{CacheState, CacheStatistics};
pub use store::{CacheStore, EntryOptions, EvictionListener, EvictionReason};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
