use std::time::Duration;

use redis::{Client, Script, aio::MultiplexedConnection};
use tracing::info;

/// Deletes the lease only if it is still held by the caller.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Extends the lease only if it is still held by the caller.
const RENEW_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
end
return 0
"#;

#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

impl RedisService {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = Client::open(connection_string)?;

        // Test connection
        let _conn = client.get_multiplexed_async_connection().await?;

        info!("✅ Connected to Redis");
        Ok(Self { client })
    }

    pub async fn get_conn(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    /// `SET key holder NX PX ttl`; true when the lease was taken.
    pub async fn try_acquire_lease(
        &self,
        key: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, redis::RedisError> {
        let mut conn = self.get_conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(holder)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    /// Resets the lease TTL; false when the lease is no longer ours.
    pub async fn renew_lease(
        &self,
        key: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, redis::RedisError> {
        let mut conn = self.get_conn().await?;
        let renewed: i32 = Script::new(RENEW_SCRIPT)
            .key(key)
            .arg(holder)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(renewed == 1)
    }

    pub async fn release_lease(&self, key: &str, holder: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.get_conn().await?;
        let deleted: i32 = Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(holder)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}

pub fn job_lease_key(job_id: &str) -> String {
    format!("conversion:lease:{}", job_id)
}

/// How often a held lease is renewed: a third of its TTL, at least a second.
pub fn lease_renew_interval(ttl: Duration) -> Duration {
    (ttl / 3).max(Duration::from_secs(1))
}
