//! Redis-backed distributed lock.
//!
//! A lock is the key set with `SET key token NX PX expiry`; releasing it runs
//! a compare-and-delete script so a holder whose lease expired cannot free a
//! lock somebody else acquired since. Connections come from a `deadpool-redis`
//! pool shared by every lock the factory makes.

use crate::config::LockConfig;
use crate::domain::ports::{Lock, LockFactory};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use std::time::Duration;
use tracing::debug;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Random value identifying one lock holder.
fn new_token() -> String {
    format!("{:032x}", rand::random::<u128>())
}

#[derive(Clone)]
pub struct RedisLockFactory {
    pool: Pool,
    config: LockConfig,
}

impl RedisLockFactory {
    pub fn new(pool: Pool, config: LockConfig) -> Self {
        Self { pool, config }
    }

    /// Builds the connection pool lazily; no connection is opened here.
    pub fn from_url(redis_url: &str, config: LockConfig) -> Result<Self> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| PaymentError::store("creating redis pool", e.to_string()))?;
        Ok(Self::new(pool, config))
    }
}

impl LockFactory for RedisLockFactory {
    fn make(&self, key: &str) -> Box<dyn Lock> {
        Box::new(RedisLock {
            key: key.to_string(),
            token: new_token(),
            pool: self.pool.clone(),
            config: self.config,
        })
    }

    fn lease(&self) -> Option<Duration> {
        Some(self.config.expiry)
    }
}

pub struct RedisLock {
    key: String,
    token: String,
    pool: Pool,
    config: LockConfig,
}

impl RedisLock {
    fn acquire_failed(&self, reason: impl ToString) -> PaymentError {
        PaymentError::LockAcquisitionFailed {
            key: self.key.clone(),
            reason: reason.to_string(),
        }
    }

    fn release_failed(&self, reason: impl ToString) -> PaymentError {
        PaymentError::LockReleaseFailed {
            key: self.key.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Lock for RedisLock {
    fn key(&self) -> &str {
        &self.key
    }

    async fn lock(&self) -> Result<()> {
        let mut connection = self
            .pool
            .get()
            .await
            .map_err(|e| self.acquire_failed(e))?;
        let expiry_ms = u64::try_from(self.config.expiry.as_millis()).unwrap_or(u64::MAX);
        let tries = self.config.tries.max(1);

        for attempt in 1..=tries {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&self.key)
                .arg(&self.token)
                .arg("NX")
                .arg("PX")
                .arg(expiry_ms)
                .query_async(&mut connection)
                .await
                .map_err(|e| self.acquire_failed(e))?;
            if acquired.is_some() {
                debug!(key = %self.key, attempt, "redis lock acquired");
                return Ok(());
            }
            if attempt < tries {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }
        Err(self.acquire_failed(format!("still held after {tries} attempts")))
    }

    async fn unlock(&self) -> Result<()> {
        let mut connection = self
            .pool
            .get()
            .await
            .map_err(|e| self.release_failed(e))?;
        let released: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut connection)
            .await
            .map_err(|e| self.release_failed(e))?;
        if released == 1 {
            debug!(key = %self.key, "redis lock released");
            Ok(())
        } else {
            Err(self.release_failed("lock expired or is held by another owner"))
        }
    }
}
