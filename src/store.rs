use std::time::Duration;

use async_trait::async_trait;

use crate::LockError;

/// Shared key-value store holding lock records.
///
/// Both mutating operations must be indivisible on the store side: no other
/// client may observe or modify the record between the ownership check and
/// the write that follows it.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Acquire-or-renew.
    ///
    /// * key absent: store `token` with expiry `ttl`, return `true`.
    /// * key holds `token`: reset expiry to `ttl`, return `true`.
    /// * key holds another token: leave it untouched, return `false`.
    async fn acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Delete the record only if it holds `token`. `false` covers both a missing
    /// key and a record owned by someone else.
    async fn release(&self, key: &str, token: &str) -> Result<bool, LockError>;

    /// 現在の保持者トークンを返す。診断用であり、ロックプロトコルでは使用しない。
    async fn holder(&self, key: &str) -> Result<Option<String>, LockError>;
}
