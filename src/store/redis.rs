//! Redis snapshot store implementation.
//!
//! The snapshot JSON lives under a single key, written with one `SET`, so
//! several dashboard processes can share one roster.

use super::{decode, encode, SnapshotStore};
use crate::error::{Error, Result};
use crate::record::Snapshot;
use deadpool_redis::{redis::AsyncCommands, Config as PoolConfig, Pool, Runtime};
use std::time::Duration;

/// Default Redis connection pool size. One refresher and a handful of
/// readers never need more.
/// Override with FOOTFALL_REDIS_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: u32 = 4;

/// Default key holding the snapshot.
pub const DEFAULT_SNAPSHOT_KEY: &str = "footfall:snapshot";

/// Configuration for the Redis store.
#[derive(Clone, Debug)]
pub struct RedisStoreConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: u32,
    pub pool_size: u32,
    pub connection_timeout: Duration,
    pub key: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        RedisStoreConfig {
            host: "localhost".to_string(),
            port: 6379,
            username: None,
            password: None,
            database: 0,
            pool_size: DEFAULT_POOL_SIZE,
            connection_timeout: Duration::from_secs(5),
            key: DEFAULT_SNAPSHOT_KEY.to_string(),
        }
    }
}

impl RedisStoreConfig {
    /// Build Redis connection string.
    pub fn connection_string(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(password)) => format!(
                "redis://{}:{}@{}:{}/{}",
                user, password, self.host, self.port, self.database
            ),
            (None, Some(password)) => format!(
                "redis://default:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            ),
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }

    /// Pool settings: `pool_size` connections, and `connection_timeout` as
    /// both the checkout wait and the connect timeout.
    pub fn pool_config(&self) -> deadpool_redis::PoolConfig {
        let mut pool = deadpool_redis::PoolConfig::new(self.pool_size as usize);
        pool.timeouts.wait = Some(self.connection_timeout);
        pool.timeouts.create = Some(self.connection_timeout);
        pool
    }
}

/// Redis snapshot store with connection pooling.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    key: String,
}

impl RedisStore {
    /// Create a store from configuration.
    ///
    /// # Errors
    /// Returns `Err` if pool creation fails.
    pub async fn new(config: RedisStoreConfig) -> Result<Self> {
        let mut cfg = PoolConfig::from_url(config.connection_string());
        cfg.pool = Some(config.pool_config());

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::StoreError(format!("Failed to create Redis pool: {}", e)))?;

        info!(
            "✓ Redis snapshot store initialized: {}:{} key={} (timeout {:?})",
            config.host, config.port, config.key, config.connection_timeout
        );

        Ok(RedisStore {
            pool,
            key: config.key,
        })
    }

    /// Create from a connection string, using the default key.
    ///
    /// Pool size is taken from `FOOTFALL_REDIS_POOL_SIZE` when set.
    ///
    /// # Errors
    /// Returns `Err` if pool creation fails.
    pub async fn from_connection_string(conn_str: &str) -> Result<Self> {
        let pool_size = std::env::var("FOOTFALL_REDIS_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);

        let mut cfg = PoolConfig::from_url(conn_str);
        cfg.pool = Some(deadpool_redis::PoolConfig::new(pool_size as usize));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::StoreError(format!("Failed to create Redis pool: {}", e)))?;

        info!(
            "✓ Redis snapshot store initialized from connection string (pool size: {})",
            pool_size
        );

        Ok(RedisStore {
            pool,
            key: DEFAULT_SNAPSHOT_KEY.to_string(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::StoreError(format!("Failed to get Redis connection: {}", e)))
    }
}

impl SnapshotStore for RedisStore {
    async fn load(&self) -> Result<Option<Snapshot>> {
        let mut conn = self.connection().await?;

        let value: Option<Vec<u8>> = conn.get(&self.key).await.map_err(|e| {
            Error::StoreError(format!("Redis GET failed for key {}: {}", self.key, e))
        })?;

        match value {
            Some(bytes) => {
                debug!("✓ Redis LOAD {} ({} bytes)", self.key, bytes.len());
                decode(&bytes).map(Some)
            }
            None => {
                debug!("✓ Redis LOAD {} -> empty", self.key);
                Ok(None)
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let bytes = encode(snapshot)?;
        let mut conn = self.connection().await?;

        conn.set::<_, _, ()>(&self.key, bytes).await.map_err(|e| {
            Error::StoreError(format!("Redis SET failed for key {}: {}", self.key, e))
        })?;

        debug!("✓ Redis SAVE {}", self.key);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.connection().await?;

        let pong: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| Error::StoreError(format!("Redis PING failed: {}", e)))?;

        Ok(pong.contains("PONG"))
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.connection().await?;

        conn.del::<_, ()>(&self.key)
            .await
            .map_err(|e| Error::StoreError(format!("Redis DEL failed for key {}: {}", self.key, e)))?;

        warn!("⚠ Redis CLEAR {} - snapshot dropped!", self.key);
        Ok(())
    }
}
