//! Redis cache backend.

use super::DistributedCache;
use crate::error::LockerResult;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tracing::{debug, info};

/// Deletes KEYS[1] only while it still holds ARGV[1].
const UNLOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Cache backed by a shared Redis instance.
///
/// Commands go through one multiplexed connection; clones of it share the
/// underlying socket.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
    unlock_script: redis::Script,
}

impl RedisCache {
    pub async fn connect(url: &str) -> LockerResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("connected to redis cache");
        Ok(Self {
            conn,
            unlock_script: redis::Script::new(UNLOCK_SCRIPT),
        })
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl DistributedCache for RedisCache {
    async fn get(&self, key: &str) -> LockerResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> LockerResult<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> LockerResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> LockerResult<Option<Duration>> {
        let mut conn = self.conn.clone();
        // -2: missing, -1: no expiry
        let millis: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }

    async fn try_lock(&self, resource: &str, owner: &str, ttl: Duration) -> LockerResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(resource)
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn unlock(&self, resource: &str, owner: &str) -> LockerResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .unlock_script
            .key(resource)
            .arg(owner)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn health_check(&self) -> LockerResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn disconnect(&self) -> LockerResult<()> {
        // The multiplexed connection closes when its last clone is dropped.
        debug!("redis cache disconnect requested");
        Ok(())
    }
}
