//! Counter store abstraction.
//!
//! The limiter keeps no counters of its own: every count lives in a
//! [`CounterStore`], which is what lets many processes share one quota.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value of `key`, or `None` if it does not exist.
    async fn get(&self, key: &str) -> Result<Option<u64>>;

    /// Increment `key` by one and (re)set its time-to-live.
    async fn increment_and_expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Increment several keys. Stores that can batch should do so in one
    /// round-trip.
    async fn increment_all(&self, entries: &[(String, Duration)]) -> Result<()> {
        for (key, ttl) in entries {
            self.increment_and_expire(key, *ttl).await?;
        }
        Ok(())
    }

    /// Delete every key starting with `prefix`, returning how many went.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64>;

    async fn ping(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: u64,
    expires_at: Duration,
}

/// In-process store with TTL emulation.
///
/// Only shares counters between clones of itself, so it suits tests and
/// single-instance deployments.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        entries.values().filter(|e| e.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Every window rollover writes fresh keys; dead buckets go on the next write.
fn prune_expired(entries: &mut HashMap<String, Entry>, now: Duration) {
    entries.retain(|_, e| e.expires_at > now);
}

fn bump(entries: &mut HashMap<String, Entry>, key: &str, ttl: Duration, now: Duration) {
    let entry = entries.entry(key.to_string()).or_insert(Entry {
        value: 0,
        expires_at: now,
    });
    if entry.expires_at <= now {
        entry.value = 0;
    }
    entry.value += 1;
    entry.expires_at = now.saturating_add(ttl);
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value))
    }

    async fn increment_and_expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        prune_expired(&mut entries, now);
        bump(&mut entries, key, ttl, now);
        Ok(())
    }

    async fn increment_all(&self, entries: &[(String, Duration)]) -> Result<()> {
        // One lock for the whole batch, like a MULTI/EXEC on Redis.
        let now = self.clock.now();
        let mut map = self.entries.lock().await;
        prune_expired(&mut map, now);
        for (key, ttl) in entries {
            bump(&mut map, key, *ttl, now);
        }
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
