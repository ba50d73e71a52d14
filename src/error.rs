use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// ロック操作のエラー。
///
/// 競合による取得失敗や非保持状態での解放は `Ok(false)` で表現し、ここには含めない。
#[derive(Debug, Error)]
pub enum LockError {
    #[error("ストアへの接続に失敗しました: {0}")]
    Connection(String),
    #[error("ロック操作に失敗しました: {0}")]
    Operation(String),
    #[error("設定が不正です: {0}")]
    InvalidConfig(String),
    #[error("スクリプトを読み込めません: {path}: {source}")]
    ScriptSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("設定ファイルの読み込みに失敗しました: {0}")]
    ReadConfig(#[from] std::io::Error),
    #[error("設定ファイルの解析に失敗しました: {0}")]
    ParseConfig(#[from] serde_yaml::Error),
    #[error("ロック待機がキャンセルされました: {0}")]
    Cancelled(String),
    #[error("ロック待機がタイムアウトしました: {name} ({waited:?})")]
    Timeout { name: String, waited: Duration },
}

impl LockError {
    /// 接続断・認証失敗など、呼び出し側で再接続を検討すべきエラーかどうか。
    pub fn is_connection(&self) -> bool {
        matches!(self, LockError::Connection(_))
    }
}
