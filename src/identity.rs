use std::fmt;

use uuid::Uuid;

/// Opaque identity proving ownership of a lock record.
///
/// Generated once per handle and never changed, which is what lets the store
/// tell a renewal by the holder apart from an acquisition by someone else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// 128 ビットの乱数から新しいトークンを生成する (8-4-4-4-12 形式)。
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LockToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for LockToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
