pub mod error;

pub use error::*;

use flowwait_core::{EngineConfig, RateLimitConfig, TimeoutConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 設定ファイル名
pub const CONFIG_FILE: &str = "flowwait.yaml";
/// 設定ファイルパスを直接指定する環境変数
pub const CONFIG_ENV: &str = "FLOWWAIT_CONFIG";

/// flowwaitの設定ディレクトリ (~/.config/flowwait)
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("flowwait"))
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 引数で明示されたパス（存在しなければエラー）
/// 2. 環境変数 FLOWWAIT_CONFIG
/// 3. カレントディレクトリ: flowwait.yaml
/// 4. ./.flowwait/flowwait.yaml
/// 5. ~/.config/flowwait/flowwait.yaml (グローバル設定)
///
/// どこにもなければ `Ok(None)`（デフォルト設定で動作する）
pub fn find_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    // 1. 明示指定
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(ConfigError::ConfigFileNotFound(path.to_path_buf()));
    }

    // 2. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::ConfigFileNotFound(path));
    }

    // 3. カレントディレクトリ
    let current_dir = std::env::current_dir()?;
    let path = current_dir.join(CONFIG_FILE);
    if path.exists() {
        return Ok(Some(path));
    }

    // 4. ./.flowwait/ ディレクトリ
    let path = current_dir.join(".flowwait").join(CONFIG_FILE);
    if path.exists() {
        return Ok(Some(path));
    }

    // 5. グローバル設定
    if let Ok(config_dir) = get_config_dir() {
        let path = config_dir.join(CONFIG_FILE);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    Ok(None)
}

/// 読み込んだ設定と、その読み込み元
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub source: Option<PathBuf>,
    pub config: FileConfig,
}

/// 設定ファイルを探して読み込む
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    match find_config_file(explicit)? {
        Some(path) => {
            let config = load_file(&path)?;
            tracing::debug!("Loaded config from {}", path.display());
            Ok(LoadedConfig {
                source: Some(path),
                config,
            })
        }
        None => {
            tracing::debug!("No config file found, using defaults");
            Ok(LoadedConfig::default())
        }
    }
}

/// 指定パスの設定ファイルを読み込む
pub fn load_file(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// YAML文字列から設定を読み込む
pub fn parse_config(content: &str) -> Result<FileConfig> {
    Ok(serde_yaml::from_str(content)?)
}

/// 設定ファイルの内容
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub timeouts: TimeoutSection,
    pub rate_limits: RateLimitSection,
    /// 時間のかかるアクションのポーリング予算倍率
    pub slow_operations: HashMap<String, u32>,
    pub codes: CodeSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointSection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutSection {
    pub read_secs: u64,
    pub write_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        let defaults = TimeoutConfig::default();
        Self {
            read_secs: defaults.read.as_secs(),
            write_secs: defaults.write.as_secs(),
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitSection {
    pub default_per_second: u32,
    /// アクションごとの上限 (回/秒)
    pub actions: HashMap<String, u32>,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            default_per_second: RateLimitConfig::default().default_per_second,
            actions: HashMap::new(),
        }
    }
}

/// 組み込みリストに追加するエラーコード
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodeSection {
    pub retryable: Vec<String>,
    pub not_found: Vec<String>,
}

/// コントロールプレーンの接続先
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointSection {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Bearerトークンを読む環境変数名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl EndpointSection {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl FileConfig {
    /// エンジン設定に変換（検証込み）
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let config = EngineConfig {
            timeouts: TimeoutConfig {
                read: Duration::from_secs(self.timeouts.read_secs),
                write: Duration::from_secs(self.timeouts.write_secs),
                poll_interval: Duration::from_millis(self.timeouts.poll_interval_ms),
            },
            rate_limits: RateLimitConfig {
                default_per_second: self.rate_limits.default_per_second,
                per_action: self.rate_limits.actions.clone(),
            },
            slow_operations: self.slow_operations.clone(),
            extra_retryable_codes: self.codes.retryable.clone(),
            extra_not_found_codes: self.codes.not_found.clone(),
        };
        config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
