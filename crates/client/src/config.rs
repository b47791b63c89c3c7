//! # クライアント設定
//!
//! 共有秘密鍵・ベースURL等は構築時に明示的に渡す。グローバル状態は持たない。

use std::time::Duration;

use crate::error::ClientError;

/// 外部サービスのデフォルトベースURL
pub const DEFAULT_BASE_URL: &str = "https://cs.sase.pre.eagleyun.com";
/// 1リクエストのデフォルトタイムアウト
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// 疎通確認のタイムアウト
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
/// デフォルト試行回数
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// バックオフの初期待機時間（以降 2倍ずつ）
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// 外部サービスのエンドポイントパス。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// ウォーターマーク付与タスク作成
    pub add_watermark_task: String,
    /// タスク状態照会（`{query_task}/{task_id}`）
    pub query_task: String,
    /// ウォーターマーク抽出タスク作成
    pub extract_watermark_task: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            add_watermark_task: "/dlp/file_process/add_watermark_task".to_string(),
            query_task: "/dlp/file_process/task".to_string(),
            extract_watermark_task: "/dlp/file_process/extract_watermark_task".to_string(),
        }
    }
}

/// 署名付きAPIクライアントの設定。
#[derive(Clone)]
pub struct WatermarkConfig {
    /// ベースURL（末尾スラッシュなし）
    pub base_url: String,
    /// `X-HMAC-ACCESS-KEY` に送るアクセスキー
    pub access_key: String,
    /// HMAC共有秘密鍵
    pub secret_key: String,
    pub endpoints: Endpoints,
    /// 1回の試行のタイムアウト
    pub timeout: Duration,
    /// 疎通確認のタイムアウト
    pub health_timeout: Duration,
    /// 最大試行回数
    pub max_retries: u32,
    /// バックオフの初期待機時間
    pub base_delay: Duration,
}

impl std::fmt::Debug for WatermarkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkConfig")
            .field("base_url", &self.base_url)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("endpoints", &self.endpoints)
            .field("timeout", &self.timeout)
            .field("health_timeout", &self.health_timeout)
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}

impl WatermarkConfig {
    /// 必須項目を指定して構築する。その他はデフォルト値。
    pub fn new(
        base_url: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            endpoints: Endpoints::default(),
            timeout: DEFAULT_TIMEOUT,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    /// 環境変数から構築する。
    ///
    /// - `WATERMARK_BASE_URL`（省略時 [`DEFAULT_BASE_URL`]）
    /// - `WATERMARK_ACCESS_KEY` / `WATERMARK_SECRET_KEY`（必須）
    /// - `WATERMARK_TIMEOUT_SECS`（省略時 30）
    /// - `WATERMARK_MAX_RETRIES`（省略時 3）
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url =
            std::env::var("WATERMARK_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let access_key = std::env::var("WATERMARK_ACCESS_KEY")
            .map_err(|_| ClientError::Config("WATERMARK_ACCESS_KEYが設定されていません".to_string()))?;
        let secret_key = std::env::var("WATERMARK_SECRET_KEY")
            .map_err(|_| ClientError::Config("WATERMARK_SECRET_KEYが設定されていません".to_string()))?;

        let mut config = Self::new(base_url, access_key, secret_key);

        if let Ok(secs) = std::env::var("WATERMARK_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|e| {
                ClientError::Config(format!("WATERMARK_TIMEOUT_SECSが不正です: {e}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Ok(retries) = std::env::var("WATERMARK_MAX_RETRIES") {
            config.max_retries = retries.parse().map_err(|e| {
                ClientError::Config(format!("WATERMARK_MAX_RETRIESが不正です: {e}"))
            })?;
        }

        Ok(config)
    }

    /// 設定値の整合性を検証する。
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.base_url.is_empty() {
            return Err(ClientError::Config("ベースURLが空です".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ClientError::Config(format!(
                "ベースURLはhttp(s)で始まる必要があります: {}",
                self.base_url
            )));
        }
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(ClientError::Config(
                "アクセスキーと秘密鍵は空にできません".to_string(),
            ));
        }
        Ok(())
    }
}
