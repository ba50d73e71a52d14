use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ErrorKind, RedisError, Script};

use crate::script::LockScripts;
use crate::store::LockStore;
use crate::LockError;

/// Connection URL used when the caller passes an empty string.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Redis-backed lock store.
///
/// Acquire and release each run as a single Lua script, so the ownership
/// check and the write that follows are never interleaved with other clients.
/// Scripts are sent with EVALSHA and fall back to EVAL when the server has not
/// cached them yet.
#[derive(Clone)]
pub struct RedisLockStore {
    conn: MultiplexedConnection,
    key_prefix: Option<String>,
    acquire: Script,
    release: Script,
}

impl RedisLockStore {
    /// Create a new RedisLockStore from a Redis URL.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://:password@127.0.0.1:6379").
    ///   An empty string connects to localhost:6379 without authentication.
    pub async fn connect(url: &str) -> Result<Self, LockError> {
        let url = if url.is_empty() { DEFAULT_REDIS_URL } else { url };
        let client = Client::open(url).map_err(map_redis_error)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)?;
        tracing::info!("Redis 接続を確立しました");
        Ok(Self::from_connection(conn))
    }

    /// Create a new RedisLockStore from an existing multiplexed connection.
    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        let scripts = LockScripts::default();
        Self {
            conn,
            key_prefix: None,
            acquire: Script::new(&scripts.acquire),
            release: Script::new(&scripts.release),
        }
    }

    /// Replace the built-in scripts, e.g. with sources loaded by [`LockScripts::from_files`].
    pub fn with_scripts(mut self, scripts: &LockScripts) -> Self {
        self.acquire = Script::new(&scripts.acquire);
        self.release = Script::new(&scripts.release);
        self
    }

    /// Set a key prefix for namespace isolation.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    fn lock_key(&self, key: &str) -> String {
        format_lock_key(self.key_prefix.as_deref(), key)
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let result: i64 = self
            .acquire
            .key(self.lock_key(key))
            .arg(token)
            .arg(millis)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(result == 1)
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        let result: i64 = self
            .release
            .key(self.lock_key(key))
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(result == 1)
    }

    async fn holder(&self, key: &str) -> Result<Option<String>, LockError> {
        let mut conn = self.conn.clone();
        let holder: Option<String> = conn
            .get(self.lock_key(key))
            .await
            .map_err(map_redis_error)?;
        Ok(holder)
    }
}

/// 接続断・タイムアウト・認証失敗は Connection、それ以外は Operation に分類する。
fn map_redis_error(err: RedisError) -> LockError {
    if err.kind() == ErrorKind::InvalidClientConfig {
        return LockError::InvalidConfig(err.to_string());
    }
    let connection_level = err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
        || err.kind() == ErrorKind::AuthenticationFailed;
    if connection_level {
        LockError::Connection(err.to_string())
    } else {
        LockError::Operation(err.to_string())
    }
}

/// Helper function to format lock keys (exposed for testing without Redis connection).
pub fn format_lock_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{key}"),
        None => key.to_string(),
    }
}
