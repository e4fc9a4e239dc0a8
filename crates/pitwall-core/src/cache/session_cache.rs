//! SQLite cache for loaded session parts and season calendars
//!
//! Schema:
//! - session_parts table: one row per (season, round, kind, part), payload is bincode
//! - schedules table: one row per season, payload is the bincode-encoded calendar
//!
//! Writers use `INSERT OR REPLACE`, so two fetches of the same session racing each
//! other both succeed and the last one wins. WAL mode lets warmup workers and the
//! interactive path read while another connection writes.
//!
//! Cache Version History:
//! - v1: Initial version

use crate::models::{EventInfo, SessionKind};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Current cache version
///
/// **IMPORTANT**: Increment this version whenever a cached model changes shape
/// (ResultRow, LapTiming, PitStop, EventInfo, ...). bincode payloads are not
/// self-describing, so a mismatch clears the cache on startup.
const CACHE_VERSION: i32 = 1;

/// Database file name inside the cache directory
pub const CACHE_DB_FILE: &str = "sessions.db";

/// Resolved coordinates of a session, independent of how it was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionCoord {
    pub season: i32,
    pub round: u32,
    pub kind: SessionKind,
}

impl SessionCoord {
    pub fn new(season: i32, round: u32, kind: SessionKind) -> Self {
        Self {
            season,
            round,
            kind,
        }
    }
}

/// Separately cached slice of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundlePart {
    Results,
    Laps,
    PitStops,
    Telemetry,
    Weather,
}

impl BundlePart {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundlePart::Results => "results",
            BundlePart::Laps => "laps",
            BundlePart::PitStops => "pit_stops",
            BundlePart::Telemetry => "telemetry",
            BundlePart::Weather => "weather",
        }
    }
}

/// SQLite-based session cache (thread-safe)
pub struct SessionCache {
    conn: Mutex<Connection>,
    cache_path: PathBuf,
}

impl SessionCache {
    /// Create or open cache database
    pub fn new(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir).with_context(|| {
            format!("Failed to create cache directory: {}", cache_dir.display())
        })?;

        let cache_path = cache_dir.join(CACHE_DB_FILE);
        let conn = Connection::open(&cache_path)
            .with_context(|| format!("Failed to open cache database: {}", cache_path.display()))?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL mode")?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_metadata (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS session_parts (
                season INTEGER NOT NULL,
                round INTEGER NOT NULL,
                kind TEXT NOT NULL,
                part TEXT NOT NULL,
                fetched_at TEXT NOT NULL,
                data BLOB NOT NULL,
                PRIMARY KEY (season, round, kind, part)
            );

            CREATE TABLE IF NOT EXISTS schedules (
                season INTEGER PRIMARY KEY,
                fetched_at TEXT NOT NULL,
                data BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_parts_season ON session_parts(season);
            "#,
        )
        .context("Failed to create schema")?;

        // Check cache version and auto-invalidate if mismatch
        let stored_version: Option<i32> = conn
            .query_row(
                "SELECT value FROM cache_metadata WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query cache version")?;

        match stored_version {
            Some(v) if v != CACHE_VERSION => {
                warn!(
                    stored = v,
                    current = CACHE_VERSION,
                    "Cache version mismatch detected, clearing stale cache"
                );

                conn.execute_batch("DELETE FROM session_parts; DELETE FROM schedules;")
                    .context("Failed to clear stale cache")?;
                conn.execute(
                    "INSERT OR REPLACE INTO cache_metadata (key, value) VALUES ('version', ?)",
                    params![CACHE_VERSION],
                )
                .context("Failed to update cache version")?;
            }
            None => {
                conn.execute(
                    "INSERT OR REPLACE INTO cache_metadata (key, value) VALUES ('version', ?)",
                    params![CACHE_VERSION],
                )
                .context("Failed to initialize cache version")?;
                debug!("Cache version initialized to {}", CACHE_VERSION);
            }
            Some(_) => {}
        }

        debug!(path = %cache_path.display(), "Session cache initialized");

        Ok(Self {
            conn: Mutex::new(conn),
            cache_path,
        })
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.cache_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Session cache lock poisoned: {}", e))
    }

    /// Get a cached session part, None on miss
    pub fn get_part<T: DeserializeOwned>(
        &self,
        coord: SessionCoord,
        part: BundlePart,
    ) -> Result<Option<T>> {
        let conn = self.lock()?;

        let bytes: Option<Vec<u8>> = conn
            .query_row(
                "SELECT data FROM session_parts
                 WHERE season = ? AND round = ? AND kind = ? AND part = ?",
                params![coord.season, coord.round, coord.kind.as_str(), part.as_str()],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query session part")?;

        match bytes {
            Some(bytes) => {
                let value = bincode::deserialize(&bytes)
                    .context("Failed to deserialize cached session part")?;
                debug!(?coord, part = part.as_str(), "Cache hit");
                Ok(Some(value))
            }
            None => {
                debug!(?coord, part = part.as_str(), "Cache miss");
                Ok(None)
            }
        }
    }

    /// Store a session part (last writer wins)
    pub fn put_part<T: Serialize>(
        &self,
        coord: SessionCoord,
        part: BundlePart,
        value: &T,
    ) -> Result<()> {
        let data = bincode::serialize(value).context("Failed to serialize session part")?;
        let conn = self.lock()?;

        conn.execute(
            "INSERT OR REPLACE INTO session_parts (season, round, kind, part, fetched_at, data)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                coord.season,
                coord.round,
                coord.kind.as_str(),
                part.as_str(),
                Utc::now().to_rfc3339(),
                &data,
            ],
        )
        .context("Failed to insert session part")?;

        debug!(?coord, part = part.as_str(), bytes = data.len(), "Session part cached");
        Ok(())
    }

    /// Check for a cached part without decoding it
    pub fn contains(&self, coord: SessionCoord, part: BundlePart) -> Result<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM session_parts
                 WHERE season = ? AND round = ? AND kind = ? AND part = ?",
                params![coord.season, coord.round, coord.kind.as_str(), part.as_str()],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query session part")?;
        Ok(found.is_some())
    }

    /// Get a cached calendar if present and younger than `max_age`
    pub fn get_schedule(
        &self,
        season: i32,
        max_age: Option<Duration>,
    ) -> Result<Option<Vec<EventInfo>>> {
        let conn = self.lock()?;

        let row: Option<(String, Vec<u8>)> = conn
            .query_row(
                "SELECT fetched_at, data FROM schedules WHERE season = ?",
                params![season],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to query schedule")?;

        let Some((fetched_at, bytes)) = row else {
            return Ok(None);
        };

        if let Some(max_age) = max_age {
            let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
                .context("Invalid schedule timestamp")?
                .with_timezone(&Utc);
            let age = Utc::now().signed_duration_since(fetched_at);
            if age.to_std().map(|age| age > max_age).unwrap_or(false) {
                debug!(season, age_hours = age.num_hours(), "Cached schedule expired");
                return Ok(None);
            }
        }

        let events =
            bincode::deserialize(&bytes).context("Failed to deserialize cached schedule")?;
        Ok(Some(events))
    }

    /// Store a season calendar
    pub fn put_schedule(&self, season: i32, events: &[EventInfo]) -> Result<()> {
        let data = bincode::serialize(events).context("Failed to serialize schedule")?;
        let conn = self.lock()?;

        conn.execute(
            "INSERT OR REPLACE INTO schedules (season, fetched_at, data) VALUES (?, ?, ?)",
            params![season, Utc::now().to_rfc3339(), &data],
        )
        .context("Failed to insert schedule")?;

        debug!(season, events = events.len(), "Schedule cached");
        Ok(())
    }

    /// Drop every cached part of one session
    pub fn invalidate_session(&self, coord: SessionCoord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM session_parts WHERE season = ? AND round = ? AND kind = ?",
            params![coord.season, coord.round, coord.kind.as_str()],
        )
        .context("Failed to delete session parts")?;

        debug!(?coord, "Session cache entry invalidated");
        Ok(())
    }

    /// Get cache statistics
    pub fn stats(&self) -> Result<CacheStats> {
        let conn = self.lock()?;

        let total_parts: i64 = conn
            .query_row("SELECT COUNT(*) FROM session_parts", [], |row| row.get(0))
            .context("Failed to count parts")?;

        let sessions: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM (SELECT DISTINCT season, round, kind FROM session_parts)",
                [],
                |row| row.get(0),
            )
            .context("Failed to count sessions")?;

        let seasons: i64 = conn
            .query_row("SELECT COUNT(*) FROM schedules", [], |row| row.get(0))
            .context("Failed to count schedules")?;

        let total_size: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(data)), 0) FROM session_parts",
                [],
                |row| row.get(0),
            )
            .context("Failed to sum payload sizes")?;

        Ok(CacheStats {
            total_parts: total_parts as usize,
            sessions: sessions as usize,
            seasons: seasons as usize,
            total_size_bytes: total_size as usize,
        })
    }

    /// Clear all cache entries
    pub fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("DELETE FROM session_parts; DELETE FROM schedules;")
            .context("Failed to clear cache")?;

        debug!("Cache cleared");
        Ok(())
    }

    /// Vacuum database to reclaim space
    pub fn vacuum(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("VACUUM", []).context("Failed to vacuum")?;

        debug!("Database vacuumed");
        Ok(())
    }
}

impl Drop for SessionCache {
    fn drop(&mut self) {
        // Flush the WAL into the main file so it does not grow across restarts
        if let Ok(conn) = self.conn.lock() {
            if let Err(e) = conn.pragma_update(None, "wal_checkpoint", "TRUNCATE") {
                warn!("Failed to checkpoint WAL on SessionCache drop: {}", e);
            }
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_parts: usize,
    pub sessions: usize,
    pub seasons: usize,
    pub total_size_bytes: usize,
}
