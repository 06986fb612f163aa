// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Key-value storage with per-key TTL.
//!
//! Two interchangeable backends sit behind [`KeyValueStore`]:
//!
//! 1. [`MemoryStore`] - in-process map, visible to a single instance only.
//! 2. [`RedisStore`] - shared across instances; required for the configured
//!    limits to hold when running more than one replica.
//!
//! The trait deliberately includes an atomic [`incr_window`] primitive so the
//! limiter can branch on the result of a single increment rather than on a
//! separately fetched snapshot. Two concurrent attempts for the same key each
//! observe a distinct post-increment count, so the window quota cannot be
//! overshot under contention.
//!
//! [`incr_window`]: KeyValueStore::incr_window

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::clock::Clock;

/// Store error types.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable or a command failed. Resolves through the
    /// configured fail policy, never silently.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("stored value corrupt: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result of an atomic window increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Post-increment attempt count, starting at 1 for a fresh window.
    pub count: u64,
    /// When the current window began.
    pub window_started_at: DateTime<Utc>,
    /// When the window (and the key) expires.
    pub expires_at: DateTime<Utc>,
}

/// Key/value storage with TTL semantics.
///
/// Keys with no activity past their TTL are logically absent, which is
/// equivalent to "never attempted".
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically increment a windowed counter.
    ///
    /// Creates the key at 1 with `window` TTL when absent or expired;
    /// otherwise increments without touching the TTL, so the window stays
    /// fixed from its first attempt.
    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError>;

    /// Read-only projection of a windowed counter. Mutates nothing.
    async fn window(&self, key: &str) -> Result<Option<WindowCount>, StoreError>;
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(d.as_millis() as i64)
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Stored {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Windowed counter payload as persisted by [`MemoryStore`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct CounterSlot {
    count: u64,
    window_started_at: DateTime<Utc>,
}

/// In-process store. Entries past their TTL are absent on read and removed
/// for good by [`purge_expired`](MemoryStore::purge_expired), which the
/// binary runs on a timer.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Stored>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, stored| stored.expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "purged expired store entries");
        }
        removed
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|stored| stored.expires_at > now)
            .map(|stored| stored.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = self.clock.now() + to_chrono(ttl);
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Stored {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        if let Some(stored) = entries.get_mut(key) {
            if stored.expires_at > now {
                let mut slot: CounterSlot = serde_json::from_str(&stored.value)?;
                slot.count += 1;
                stored.value = serde_json::to_string(&slot)?;
                return Ok(WindowCount {
                    count: slot.count,
                    window_started_at: slot.window_started_at,
                    expires_at: stored.expires_at,
                });
            }
        }

        // Absent or expired: fresh window, count starts at 1.
        let slot = CounterSlot {
            count: 1,
            window_started_at: now,
        };
        let expires_at = now + to_chrono(window);
        entries.insert(
            key.to_string(),
            Stored {
                value: serde_json::to_string(&slot)?,
                expires_at,
            },
        );
        Ok(WindowCount {
            count: 1,
            window_started_at: now,
            expires_at,
        })
    }

    async fn window(&self, key: &str) -> Result<Option<WindowCount>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let Some(stored) = entries.get(key).filter(|s| s.expires_at > now) else {
            return Ok(None);
        };
        let slot: CounterSlot = serde_json::from_str(&stored.value)?;
        Ok(Some(WindowCount {
            count: slot.count,
            window_started_at: slot.window_started_at,
            expires_at: stored.expires_at,
        }))
    }
}

// ---------------------------------------------------------------------------
// Redis backend
// ---------------------------------------------------------------------------

/// Shared store backed by Redis. The window increment runs as a single
/// MULTI/EXEC pipeline (`INCR` + `PEXPIRE NX` + `PTTL`), so counter and TTL
/// are established atomically across instances. Requires Redis 7 for the
/// `NX` expire option.
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
    clock: Arc<dyn Clock>,
}

impl RedisStore {
    pub async fn connect(url: &str, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { conn, clock })
    }
}

fn redis_err(e: redis::RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.map_err(redis_err)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, secs).await.map_err(redis_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(redis_err)?;
        Ok(())
    }

    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let mut conn = self.conn.clone();
        let window_ms = window.as_millis() as i64;
        let (count, pttl_ms): (u64, i64) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("PEXPIRE")
            .arg(key)
            .arg(window_ms)
            .arg("NX")
            .ignore()
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;

        let now = self.clock.now();
        let remaining = if pttl_ms > 0 {
            chrono::Duration::milliseconds(pttl_ms)
        } else {
            to_chrono(window)
        };
        let expires_at = now + remaining;
        Ok(WindowCount {
            count,
            window_started_at: expires_at - to_chrono(window),
            expires_at,
        })
    }

    async fn window(&self, key: &str) -> Result<Option<WindowCount>, StoreError> {
        let mut conn = self.conn.clone();
        let (value, pttl_ms): (Option<String>, i64) = redis::pipe()
            .cmd("GET")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;

        let Some(raw) = value else {
            return Ok(None);
        };
        let Ok(count) = raw.parse::<u64>() else {
            return Ok(None);
        };
        let now = self.clock.now();
        let remaining = chrono::Duration::milliseconds(pttl_ms.max(0));
        Ok(Some(WindowCount {
            count,
            window_started_at: now,
            expires_at: now + remaining,
        }))
    }
}
