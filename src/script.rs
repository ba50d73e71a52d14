use std::path::Path;

use crate::LockError;

/// Lua script implementing acquire-or-renew.
///
/// KEYS[1]: lock key
/// ARGV[1]: holder token
/// ARGV[2]: TTL in milliseconds
///
/// Returns 1 when the caller now holds the lock, 0 when another token owns it.
pub const ACQUIRE_SCRIPT: &str = r#"
local current = redis.call("get", KEYS[1])
if current == false then
    redis.call("set", KEYS[1], ARGV[1], "PX", ARGV[2])
    return 1
elseif current == ARGV[1] then
    redis.call("pexpire", KEYS[1], ARGV[2])
    return 1
else
    return 0
end
"#;

/// Lua script for safe lock release.
/// Only deletes the key if the stored value matches the token.
///
/// KEYS[1]: lock key
/// ARGV[1]: holder token
pub const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// 取得・解放スクリプトのソース。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockScripts {
    pub acquire: String,
    pub release: String,
}

impl Default for LockScripts {
    fn default() -> Self {
        Self {
            acquire: ACQUIRE_SCRIPT.to_string(),
            release: RELEASE_SCRIPT.to_string(),
        }
    }
}

impl LockScripts {
    /// ファイルからスクリプトを読み込む。読み込めない、または空の場合はエラーを返す。
    pub fn from_files(
        acquire_path: impl AsRef<Path>,
        release_path: impl AsRef<Path>,
    ) -> Result<Self, LockError> {
        Ok(Self {
            acquire: read_source(acquire_path.as_ref())?,
            release: read_source(release_path.as_ref())?,
        })
    }
}

fn read_source(path: &Path) -> Result<String, LockError> {
    let source = std::fs::read_to_string(path).map_err(|source| LockError::ScriptSource {
        path: path.to_path_buf(),
        source,
    })?;
    if source.trim().is_empty() {
        return Err(LockError::ScriptSource {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "script is empty"),
        });
    }
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_acquire_script_sets_with_px_and_renews_with_pexpire() {
        assert!(ACQUIRE_SCRIPT.contains("redis.call(\"get\""));
        assert!(ACQUIRE_SCRIPT.contains("\"PX\""));
        assert!(ACQUIRE_SCRIPT.contains("redis.call(\"pexpire\""));
    }

    #[test]
    fn test_release_script_contains_get_and_del() {
        assert!(RELEASE_SCRIPT.contains("redis.call(\"get\""));
        assert!(RELEASE_SCRIPT.contains("redis.call(\"del\""));
    }

    #[test]
    fn test_from_files_reads_sources() {
        let mut acquire = tempfile::NamedTempFile::new().unwrap();
        let mut release = tempfile::NamedTempFile::new().unwrap();
        write!(acquire, "return 1").unwrap();
        write!(release, "return 0").unwrap();

        let scripts = LockScripts::from_files(acquire.path(), release.path()).unwrap();
        assert_eq!(scripts.acquire, "return 1");
        assert_eq!(scripts.release, "return 0");
    }

    #[test]
    fn test_from_files_missing_file_returns_error() {
        let release = tempfile::NamedTempFile::new().unwrap();
        let result = LockScripts::from_files("/nonexistent/lock.lua", release.path());
        match result {
            Err(LockError::ScriptSource { path, .. }) => {
                assert_eq!(path, Path::new("/nonexistent/lock.lua"));
            }
            other => panic!("Expected ScriptSource error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_files_empty_file_returns_error() {
        let mut acquire = tempfile::NamedTempFile::new().unwrap();
        write!(acquire, "return 1").unwrap();
        let release = tempfile::NamedTempFile::new().unwrap();
        let result = LockScripts::from_files(acquire.path(), release.path());
        assert!(matches!(result, Err(LockError::ScriptSource { .. })));
    }
}
