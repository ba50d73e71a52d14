use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::MutexConfig;
use crate::identity::LockToken;
use crate::store::LockStore;
use crate::LockError;

/// Backoff between attempts in [`RedisMutex::lock`] unless overridden.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Longest TTL accepted. Redis rejects expiries beyond `i64::MAX` milliseconds.
pub const MAX_TTL: Duration = Duration::from_millis(i64::MAX.unsigned_abs());

/// Handle to a named distributed lock.
///
/// Every handle carries its own [`LockToken`]; calling [`try_lock`](Self::try_lock)
/// while already holding the lock renews its TTL instead of failing. The local
/// guard only serializes callers sharing this handle. Exclusion between
/// processes and between handles is provided by the store.
pub struct RedisMutex {
    name: String,
    ttl: Duration,
    backoff: Duration,
    token: LockToken,
    store: Arc<dyn LockStore>,
    local: Mutex<()>,
}

impl RedisMutex {
    pub fn new(
        name: impl Into<String>,
        ttl: Duration,
        store: Arc<dyn LockStore>,
    ) -> Result<Self, LockError> {
        let name = name.into();
        if name.is_empty() {
            return Err(LockError::InvalidConfig("lock name is required".into()));
        }
        // PX はミリ秒単位のため 1ms 未満は期限なしロックと区別できない
        if ttl.as_millis() == 0 {
            return Err(LockError::InvalidConfig(format!(
                "ttl must be at least 1ms: {ttl:?}"
            )));
        }
        if ttl > MAX_TTL {
            return Err(LockError::InvalidConfig(format!(
                "ttl must not exceed {MAX_TTL:?}: {ttl:?}"
            )));
        }
        Ok(Self {
            name,
            ttl,
            backoff: DEFAULT_BACKOFF,
            token: LockToken::generate(),
            store,
            local: Mutex::new(()),
        })
    }

    pub fn from_config(config: &MutexConfig, store: Arc<dyn LockStore>) -> Result<Self, LockError> {
        config.validate()?;
        Self::new(config.name.clone(), config.ttl(), store)?.with_backoff(config.backoff())
    }

    /// Redis に接続してミューテックスを生成する。空の URL は localhost:6379 に接続する。
    #[cfg(feature = "redis")]
    pub async fn connect(
        name: impl Into<String>,
        ttl: Duration,
        url: &str,
    ) -> Result<Self, LockError> {
        let store = crate::redis::RedisLockStore::connect(url).await?;
        Self::new(name, ttl, Arc::new(store))
    }

    /// 設定の `redis.url` に接続してミューテックスを生成する。
    #[cfg(feature = "redis")]
    pub async fn connect_from_config(config: &MutexConfig) -> Result<Self, LockError> {
        config.validate()?;
        let store = crate::redis::RedisLockStore::connect(&config.redis.url).await?;
        Self::from_config(config, Arc::new(store))
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Result<Self, LockError> {
        if backoff.is_zero() {
            return Err(LockError::InvalidConfig("backoff must be > 0".into()));
        }
        self.backoff = backoff;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// Makes a single attempt to acquire the lock.
    ///
    /// Returns `Ok(false)` when another holder owns the name. Locking a mutex
    /// this handle already holds resets its TTL.
    pub async fn try_lock(&self) -> Result<bool, LockError> {
        let _guard = self.local.lock().await;
        let acquired = self
            .store
            .acquire(&self.name, self.token.as_str(), self.ttl)
            .await?;
        tracing::debug!(
            name = %self.name,
            token = %self.token,
            acquired,
            "ロック取得を試行しました"
        );
        Ok(acquired)
    }

    /// Waits until the lock is acquired, retrying every `backoff`.
    ///
    /// There is no bound on the wait; use [`lock_with_timeout`](Self::lock_with_timeout)
    /// or [`lock_with_cancel`](Self::lock_with_cancel) when the caller needs one.
    /// Store errors end the wait immediately.
    pub async fn lock(&self) -> Result<(), LockError> {
        self.wait_for_lock(std::future::pending()).await?;
        Ok(())
    }

    /// Like [`lock`](Self::lock) but gives up with [`LockError::Cancelled`]
    /// once `cancel` fires.
    pub async fn lock_with_cancel(&self, cancel: &CancellationToken) -> Result<(), LockError> {
        if self.wait_for_lock(cancel.cancelled()).await? {
            Ok(())
        } else {
            Err(LockError::Cancelled(self.name.clone()))
        }
    }

    /// Like [`lock`](Self::lock) but gives up with [`LockError::Timeout`]
    /// once `timeout` has elapsed.
    pub async fn lock_with_timeout(&self, timeout: Duration) -> Result<(), LockError> {
        // 期限が表現できないほど長い場合は無期限待機として扱う
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.lock().await;
        };
        if self.wait_for_lock(tokio::time::sleep_until(deadline)).await? {
            Ok(())
        } else {
            Err(LockError::Timeout {
                name: self.name.clone(),
                waited: timeout,
            })
        }
    }

    /// `stop` はバックオフ待機中にのみ評価する。ストアへの往復は途中で打ち切らない。
    /// 取得できれば `true`、`stop` が先に完了すれば `false` を返す。
    async fn wait_for_lock<F>(&self, stop: F) -> Result<bool, LockError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            match self.try_lock().await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(name = %self.name, attempts, error = %e, "ロック待機を中断しました");
                    return Err(e);
                }
            }
            tokio::select! {
                () = &mut stop => {
                    tracing::debug!(name = %self.name, attempts, "ロック待機を終了しました");
                    return Ok(false);
                }
                () = tokio::time::sleep(self.backoff) => {}
            }
        }
    }

    /// If the stored token matches this handle's token, the lock is deleted.
    ///
    /// `Ok(false)` means the lock was not held by this handle, either because
    /// the TTL already expired or because another holder has taken it since.
    pub async fn unlock(&self) -> Result<bool, LockError> {
        let _guard = self.local.lock().await;
        let released = self.store.release(&self.name, self.token.as_str()).await?;
        if released {
            tracing::debug!(name = %self.name, token = %self.token, "ロックを解放しました");
        } else {
            tracing::warn!(name = %self.name, token = %self.token, "保持していないロックの解放を試みました");
        }
        Ok(released)
    }

    /// Whether any holder currently owns the name.
    pub async fn is_locked(&self) -> Result<bool, LockError> {
        Ok(self.store.holder(&self.name).await?.is_some())
    }

    /// Whether this handle currently owns the name.
    pub async fn is_held(&self) -> Result<bool, LockError> {
        let holder = self.store.holder(&self.name).await?;
        Ok(holder.as_deref() == Some(self.token.as_str()))
    }
}

impl std::fmt::Debug for RedisMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisMutex")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("backoff", &self.backoff)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
