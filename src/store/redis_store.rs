//! Redis-backed Store implementation.
//!
//! Uses a `redis::aio::ConnectionManager` for automatic reconnection, the
//! same pattern the teacher uses for both its stream queue and its dedupe
//! manager. Lists/sets/sorted-sets/hashes map directly onto their Redis
//! counterparts; the one non-trivial primitive is
//! [`RedisStore::watch_status_and_register`], which implements the
//! WATCH/MULTI/EXEC retry loop spec.md §4.3 describes for dependency
//! registration.

use crate::config::{RedisStoreConfig, MAX_WATCH_ATTEMPTS};
use crate::error::StoreError;
use crate::store::{DependencyCheck, Store, StoreResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;

/// Redis-backed Store.
///
/// Cloning `ConnectionManager` is cheap (it's an `Arc` around the shared
/// connection state), so each call grabs its own clone rather than holding
/// a lock across an await point. `watch_status_and_register` is the one
/// exception: WATCH/MULTI/EXEC is a per-connection session, and the shared
/// `ConnectionManager` multiplexes every caller onto the same one, so one
/// caller's EXEC clears every other caller's WATCH too. That method opens
/// its own dedicated connection off `client` instead.
pub struct RedisStore {
    connection: ConnectionManager,
    client: redis::Client,
}

impl RedisStore {
    /// Connects to `redis_url`, establishing the connection manager.
    pub async fn new(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        let connection = ConnectionManager::new(client.clone()).await?;
        Ok(Self { connection, client })
    }

    /// Connects using `RedisStoreConfig::from_env()`.
    pub async fn from_env() -> Result<Self, String> {
        let config = RedisStoreConfig::from_env()?;
        Self::new(&config.redis_url)
            .await
            .map_err(|e| e.to_string())
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn list_rpush(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: i64 = conn.rpush(key, value).await?;
        Ok(())
    }

    async fn list_lpop(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn.lpop(key, None).await?;
        Ok(value)
    }

    async fn list_len(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn();
        let len: i64 = conn.llen(key).await?;
        Ok(len)
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        let values: Vec<String> = conn.lrange(key, start as isize, stop as isize).await?;
        Ok(values)
    }

    async fn list_remove_all(&self, key: &str, value: &str) -> StoreResult<i64> {
        let mut conn = self.conn();
        // LREM count=0 removes every matching occurrence in either direction.
        let removed: i64 = conn.lrem(key, 0, value).await?;
        Ok(removed)
    }

    async fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.rename(from, to).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: i64 = conn.sadd(key, member).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<i64> {
        let mut conn = self.conn();
        let removed: i64 = conn.srem(key, member).await?;
        Ok(removed)
    }

    async fn set_card(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn();
        let card: i64 = conn.scard(key).await?;
        Ok(card)
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn set_pop(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn();
        let member: Option<String> = conn.spop(key).await?;
        Ok(member)
    }

    async fn zset_add(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: i64 = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zset_remove(&self, key: &str, member: &str) -> StoreResult<i64> {
        let mut conn = self.conn();
        let removed: i64 = conn.zrem(key, member).await?;
        Ok(removed)
    }

    async fn zset_range_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = conn.zrangebyscore(key, min, max).await?;
        Ok(members)
    }

    async fn hash_set_all(&self, key: &str, fields: Vec<(String, String)>) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let _: () = conn.hset_multiple(key, &fields).await?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<Option<HashMap<String, String>>> {
        let mut conn = self.conn();
        let fields: HashMap<String, String> = conn.hgetall(key).await?;
        if fields.is_empty() {
            // Redis returns an empty map for a missing key; the Job Record
            // layer tells the two cases apart via a required `id` field.
            return Ok(None);
        }
        Ok(Some(fields))
    }

    async fn blocking_lpop(
        &self,
        keys: &[String],
        timeout_secs: Option<u64>,
    ) -> StoreResult<Option<(String, String)>> {
        let mut conn = self.conn();
        match timeout_secs {
            None => {
                for key in keys {
                    let value: Option<String> = conn.lpop(key, None).await?;
                    if let Some(value) = value {
                        return Ok(Some((key.clone(), value)));
                    }
                }
                Ok(None)
            }
            Some(timeout) => {
                if keys.is_empty() {
                    // BLPOP requires at least one key; nothing to wait on.
                    return Ok(None);
                }
                let result: Option<(String, String)> = conn.blpop(keys, timeout as f64).await?;
                Ok(result)
            }
        }
    }

    async fn watch_status_and_register(
        &self,
        parent_job_key: &str,
        status_field: &str,
        finished_value: &str,
        dependents_key: &str,
        child_id: &str,
    ) -> StoreResult<DependencyCheck> {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            if attempts > MAX_WATCH_ATTEMPTS {
                return Err(StoreError::WatchContentionExhausted {
                    key: parent_job_key.to_string(),
                    attempts,
                });
            }

            // Exclusive connection per attempt: WATCH's dirty-key tracking
            // is per-session, so this must not be a clone of the shared
            // ConnectionManager another caller's EXEC could clear.
            let mut conn = self.client.get_async_connection().await?;

            let _: () = redis::cmd("WATCH")
                .arg(parent_job_key)
                .query_async(&mut conn)
                .await?;

            let status: Option<String> = conn.hget(parent_job_key, status_field).await?;
            if status.as_deref() == Some(finished_value) {
                let _: () = redis::cmd("UNWATCH").query_async(&mut conn).await?;
                return Ok(DependencyCheck::ParentFinished);
            }

            let mut pipe = redis::pipe();
            pipe.atomic().sadd(dependents_key, child_id);
            let committed: Option<Vec<i64>> = pipe.query_async(&mut conn).await?;

            match committed {
                Some(_) => return Ok(DependencyCheck::Registered),
                // EXEC aborted because the watched key changed underneath us;
                // the watch/transaction window shrinks on every retry.
                None => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis_url() -> Option<String> {
        std::env::var("REDIS_URL").ok()
    }

    #[tokio::test]
    async fn connects_when_redis_url_is_configured() {
        let Some(url) = redis_url() else {
            println!("skipping: REDIS_URL not set");
            return;
        };
        let store = RedisStore::new(&url).await;
        assert!(store.is_ok(), "should connect to a configured Redis instance");
    }

    #[tokio::test]
    async fn round_trips_a_list_entry() {
        let Some(url) = redis_url() else {
            println!("skipping: REDIS_URL not set");
            return;
        };
        let store = RedisStore::new(&url).await.expect("connect");
        let key = format!("test:jobqueue-core:{}", uuid::Uuid::new_v4());
        store.list_rpush(&key, "value").await.unwrap();
        assert_eq!(store.list_len(&key).await.unwrap(), 1);
        assert_eq!(
            store.list_lpop(&key).await.unwrap(),
            Some("value".to_string())
        );
        store.delete(&key).await.unwrap();
    }
}
