//! Caching layer for pitwall-core
//!
//! Provides the SQLite-backed persistent store behind the session provider.

pub mod session_cache;

pub use session_cache::{BundlePart, CacheStats, SessionCache, SessionCoord, CACHE_DB_FILE};
