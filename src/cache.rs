//! Persistent response cache keyed by prompt fingerprint.
//!
//! One `SQLite` table, one row per fingerprint. Reads ignore rows older than
//! the expiration window; every write trims the table back to `max_size`
//! rows, oldest first.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::Result;

pub const DEFAULT_MAX_SIZE: usize = 1000;
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Size and age bounds for the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub max_size: usize,
    pub expiration: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            expiration: DEFAULT_EXPIRATION,
        }
    }
}

/// A stored response with its write timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// SHA-256 of the prompt's UTF-8 bytes, lowercase hex
pub fn fingerprint(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// First 8 characters of a key, for logs
pub fn key_prefix(key: &str) -> &str {
    key.get(..8).unwrap_or(key)
}

pub struct ResponseCache {
    conn: Mutex<Connection>,
    options: CacheOptions,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    /// Open (or create) the cache file at `path`
    pub fn open(path: impl AsRef<Path>, options: CacheOptions, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let cache = Self::with_connection(conn, options, clock)?;
        info!(
            path = %path.display(),
            max_size = cache.options.max_size,
            expiration_secs = cache.options.expiration.as_secs(),
            "response cache opened"
        );
        Ok(cache)
    }

    /// Cache that lives only as long as the process (for tests)
    pub fn open_in_memory(options: CacheOptions, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, options, clock)
    }

    fn with_connection(conn: Connection, options: CacheOptions, clock: Arc<dyn Clock>) -> Result<Self> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS cache (
                prompt_hash TEXT PRIMARY KEY,
                response TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cache_created_at ON cache (created_at);
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            options: CacheOptions {
                max_size: options.max_size.max(1),
                ..options
            },
            clock,
        })
    }

    pub fn options(&self) -> CacheOptions {
        self.options
    }

    /// Stored response for `key`, unless absent or expired
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let start = Instant::now();
        let cutoff = self.expiry_cutoff();
        let conn = self.lock();
        let value: Option<String> = conn
            .query_row(
                "SELECT response FROM cache WHERE prompt_hash = ?1 AND created_at >= ?2",
                params![key, cutoff],
                |row| row.get(0),
            )
            .optional()?;
        debug!(
            key = %key_prefix(key),
            hit = value.is_some(),
            latency_ms = start.elapsed().as_secs_f64() * 1000.0,
            "cache lookup"
        );
        Ok(value)
    }

    /// Insert or replace `key`, then trim to `max_size` rows
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = self.clock.now().timestamp_millis();
        // Slots left for rows other than the one being written.
        let keep_others = i64::try_from(self.options.max_size - 1).unwrap_or(i64::MAX);

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO cache (prompt_hash, response, created_at) VALUES (?1, ?2, ?3)",
            params![key, value, now],
        )?;
        let evicted = tx.execute(
            "DELETE FROM cache
             WHERE prompt_hash != ?1
             AND prompt_hash NOT IN (
                 SELECT prompt_hash FROM cache
                 WHERE prompt_hash != ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2
             )",
            params![key, keep_others],
        )?;
        tx.commit()?;

        if evicted > 0 {
            debug!(key = %key_prefix(key), evicted, "cache trimmed to max size");
        }
        Ok(())
    }

    /// Raw row for `key`, expired or not
    pub fn entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT prompt_hash, response, created_at FROM cache WHERE prompt_hash = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(key, response, millis)| CacheEntry {
            key,
            response,
            created_at: DateTime::from_timestamp_millis(millis).unwrap_or_default(),
        }))
    }

    /// Physical row count, expired rows included
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self.lock().query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Delete rows past the expiration window, returning how many went
    pub fn purge_expired(&self) -> Result<usize> {
        let cutoff = self.expiry_cutoff();
        let removed = self
            .lock()
            .execute("DELETE FROM cache WHERE created_at < ?1", params![cutoff])?;
        if removed > 0 {
            info!(removed, "purged expired cache entries");
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        self.lock().execute("DELETE FROM cache", [])?;
        Ok(())
    }

    fn expiry_cutoff(&self) -> i64 {
        let window = i64::try_from(self.options.expiration.as_millis()).unwrap_or(i64::MAX);
        self.clock.now().timestamp_millis().saturating_sub(window)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}
