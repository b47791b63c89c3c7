//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use watermark_client::WatermarkClient;

use crate::storage::{FileStore, MAX_UPLOAD_BYTES};

/// デフォルト待ち受けポート
pub const DEFAULT_PORT: u16 = 3001;
/// 永続ディスク利用時の保持期間
pub const LOCAL_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);
/// 一時領域利用時の保持期間
pub const EPHEMERAL_RETENTION: Duration = Duration::from_secs(60 * 60);
/// 期限切れスイープの間隔
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// 保存先の種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// 永続ディスク（`./uploads`）
    Local,
    /// サーバーレス環境等の一時領域（`$TMPDIR/watermark-uploads`）
    Ephemeral,
}

impl StorageMode {
    fn default_root(self) -> PathBuf {
        match self {
            StorageMode::Local => PathBuf::from("./uploads"),
            StorageMode::Ephemeral => std::env::temp_dir().join("watermark-uploads"),
        }
    }

    fn default_retention(self) -> Duration {
        match self {
            StorageMode::Local => LOCAL_RETENTION,
            StorageMode::Ephemeral => EPHEMERAL_RETENTION,
        }
    }
}

/// Gatewayの起動設定。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub storage_mode: StorageMode,
    /// 保存ルート。`files/` と `index.json` を配下に持つ
    pub upload_root: PathBuf,
    /// アップロードから削除までの保持期間
    pub retention: Duration,
    pub sweep_interval: Duration,
    /// 返却URLのスキーム+ホストを固定する場合に指定
    pub public_base_url: Option<String>,
    /// アップロード上限（バイト）
    pub max_upload_size: u64,
}

impl GatewayConfig {
    /// 環境変数から読み込む。
    ///
    /// - `PORT`（省略時 3001）
    /// - `STORAGE_MODE` = `local` | `ephemeral`（`VERCEL` が設定されていれば `ephemeral`）
    /// - `UPLOAD_ROOT` / `RETENTION_SECS` / `SWEEP_INTERVAL_SECS` / `PUBLIC_BASE_URL`
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match lookup("PORT") {
            Some(v) => v
                .parse()
                .map_err(|e| anyhow::anyhow!("PORTが不正です: {v} ({e})"))?,
            None => DEFAULT_PORT,
        };

        let storage_mode = match lookup("STORAGE_MODE").as_deref() {
            Some("local") => StorageMode::Local,
            Some("ephemeral") => StorageMode::Ephemeral,
            Some(other) => anyhow::bail!("STORAGE_MODEは local か ephemeral を指定してください: {other}"),
            None if lookup("VERCEL").is_some() => StorageMode::Ephemeral,
            None => StorageMode::Local,
        };

        let upload_root = lookup("UPLOAD_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| storage_mode.default_root());

        let retention = match lookup("RETENTION_SECS") {
            Some(v) => Duration::from_secs(parse_positive_secs("RETENTION_SECS", &v)?),
            None => storage_mode.default_retention(),
        };

        let sweep_interval = match lookup("SWEEP_INTERVAL_SECS") {
            Some(v) => Duration::from_secs(parse_positive_secs("SWEEP_INTERVAL_SECS", &v)?),
            None => DEFAULT_SWEEP_INTERVAL,
        };

        let public_base_url = lookup("PUBLIC_BASE_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty());

        Ok(Self {
            port,
            storage_mode,
            upload_root,
            retention,
            sweep_interval,
            public_base_url,
            max_upload_size: MAX_UPLOAD_BYTES,
        })
    }
}

fn parse_positive_secs(key: &str, value: &str) -> anyhow::Result<u64> {
    let secs: u64 = value
        .parse()
        .map_err(|e| anyhow::anyhow!("{key}が不正です: {value} ({e})"))?;
    if secs == 0 {
        anyhow::bail!("{key}は1以上である必要があります");
    }
    Ok(secs)
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// アップロードファイルの保存先（トレイトで抽象化）
    pub store: Arc<dyn FileStore>,
    /// 外部ウォーターマークサービスのクライアント。認証情報未設定時は `None`
    pub watermark: Option<WatermarkClient>,
    pub retention: chrono::Duration,
    pub max_upload_size: u64,
    pub public_base_url: Option<String>,
}
