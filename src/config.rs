use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::LockError;

/// RedisConfig は Redis 接続設定。
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// MutexConfig は分散ミューテックス 1 つ分の設定。
#[derive(Debug, Clone, Deserialize)]
pub struct MutexConfig {
    pub name: String,
    pub ttl_ms: u64,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default)]
    pub redis: RedisConfig,
}

fn default_backoff_ms() -> u64 {
    1000
}

impl MutexConfig {
    pub fn new(name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            name: name.into(),
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            backoff_ms: default_backoff_ms(),
            redis: RedisConfig::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// 設定値のバリデーション。
    pub fn validate(&self) -> Result<(), LockError> {
        if self.name.is_empty() {
            return Err(LockError::InvalidConfig("name is required".into()));
        }
        if self.ttl_ms == 0 {
            return Err(LockError::InvalidConfig("ttl_ms must be > 0".into()));
        }
        if self.ttl_ms > i64::MAX.unsigned_abs() {
            return Err(LockError::InvalidConfig(
                "ttl_ms must not exceed i64::MAX".into(),
            ));
        }
        if self.backoff_ms == 0 {
            return Err(LockError::InvalidConfig("backoff_ms must be > 0".into()));
        }
        Ok(())
    }
}

/// YAML を読み込み MutexConfig を返す。REDIS_URL 環境変数があれば接続先を上書きする。
pub fn load(path: impl AsRef<Path>) -> Result<MutexConfig, LockError> {
    let data = std::fs::read_to_string(path)?;
    let mut config = parse(&data)?;
    if let Ok(url) = std::env::var("REDIS_URL") {
        config.redis.url = url;
    }
    Ok(config)
}

/// YAML 文字列を解析して検証する。環境変数は参照しない。
pub fn parse(yaml: &str) -> Result<MutexConfig, LockError> {
    let config: MutexConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}
