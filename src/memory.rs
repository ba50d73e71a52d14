use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::store::LockStore;
use crate::LockError;

struct LockRecord {
    token: String,
    expires_at: Instant,
}

impl LockRecord {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// プロセス内で完結するロックストア。
///
/// 各操作は単一の Mutex クリティカルセクション内で実行されるため、
/// Redis の Lua スクリプトと同じ不可分性を持つ。有効期限は参照時に判定する。
pub struct InMemoryLockStore {
    records: Mutex<HashMap<String, LockRecord>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| LockError::InvalidConfig(format!("ttl is out of range: {ttl:?}")))?;
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(key) {
            if !record.is_expired() {
                if record.token != token {
                    return Ok(false);
                }
                record.expires_at = expires_at;
                return Ok(true);
            }
        }
        records.insert(
            key.to_string(),
            LockRecord {
                token: token.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool, LockError> {
        let mut records = self.records.lock().await;
        match records.get(key) {
            Some(record) if record.is_expired() => {
                records.remove(key);
                Ok(false)
            }
            Some(record) if record.token == token => {
                records.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn holder(&self, key: &str) -> Result<Option<String>, LockError> {
        let records = self.records.lock().await;
        Ok(records
            .get(key)
            .filter(|record| !record.is_expired())
            .map(|record| record.token.clone()))
    }
}
