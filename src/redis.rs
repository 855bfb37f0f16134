use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::{LimiterError, Result};
use crate::store::CounterStore;

/// Keys fetched per SCAN step during prefix deletion.
const SCAN_BATCH: usize = 500;

/// Redis-backed counter store shared by every limiter instance.
///
/// Cloning is cheap: clones multiplex over the same managed connection,
/// which reconnects on its own after failures.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| LimiterError::Store(format!("Failed to create Redis client: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| LimiterError::Store(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.connection.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<u64>>(&mut conn)
            .await
            .map_err(|e| LimiterError::Store(format!("GET {} failed: {}", key, e)))
    }

    async fn increment_and_expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| LimiterError::Store(format!("INCR/EXPIRE {} failed: {}", key, e)))
    }

    async fn increment_all(&self, entries: &[(String, Duration)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, ttl) in entries {
            pipe.cmd("INCR").arg(key).ignore();
            pipe.cmd("EXPIRE").arg(key).arg(ttl.as_secs()).ignore();
        }

        let mut conn = self.connection.clone();
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| LimiterError::Store(format!("Counter pipeline failed: {}", e)))
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        // SCAN rather than KEYS so a reset never blocks the server.
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| LimiterError::Store(format!("SCAN {} failed: {}", pattern, e)))?;

            if !keys.is_empty() {
                let removed: u64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| LimiterError::Store(format!("DEL failed: {}", e)))?;
                deleted += removed;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern = %pattern, deleted, "Deleted keys by prefix");
        Ok(deleted)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| LimiterError::Store(format!("Ping failed: {}", e)))
    }
}
