//! k1s0-redisync: Redis を用いた分散ミューテックスライブラリ。
//!
//! 取得 (更新を兼ねる) と解放をそれぞれ 1 本の Lua スクリプトでアトミックに実行し、
//! TTL によってクラッシュした保持者のロックを自動的に失効させる。

pub mod config;
pub mod error;
pub mod identity;
pub mod memory;
pub mod mutex;
#[cfg(feature = "redis")]
pub mod redis;
#[cfg(feature = "redis")]
pub mod script;
pub mod store;

pub use config::{MutexConfig, RedisConfig};
pub use error::LockError;
pub use identity::LockToken;
pub use memory::InMemoryLockStore;
pub use mutex::{RedisMutex, DEFAULT_BACKOFF, MAX_TTL};
#[cfg(feature = "redis")]
pub use self::redis::RedisLockStore;
#[cfg(feature = "redis")]
pub use script::LockScripts;
pub use store::LockStore;

#[cfg(feature = "mock")]
pub use store::MockLockStore;

pub use tokio_util::sync::CancellationToken;
