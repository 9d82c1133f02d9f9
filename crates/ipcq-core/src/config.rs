//! LoopConfig - イベントループの設定

use serde::{Deserialize, Serialize};

/// ThreadLoop / TokioLoop 共通の設定
///
/// コードでは [`LoopConfig::named`]、設定ファイルからは serde で読み込む。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// ループの OS スレッド名
    pub thread_name: String,
}

impl LoopConfig {
    pub fn named(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::named("ipcq-loop")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_thread_name() {
        assert_eq!(LoopConfig::default().thread_name, "ipcq-loop");
    }

    #[test]
    fn missing_fields_fall_back_to_default() {
        let config: LoopConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LoopConfig::default());

        let config: LoopConfig = serde_json::from_str(r#"{"thread_name":"ui"}"#).unwrap();
        assert_eq!(config.thread_name, "ui");
    }
}
