//! # Watermark Relay 共有型定義
//!
//! アップロードGateway・署名付きAPIクライアント・CLIの間で共有するデータ構造。
//!
//! ## 命名規則
//! - 公開HTTP API（`/api/...`）: camelCase
//! - 外部ウォーターマークサービスへのリクエスト: snake_case（サービス側の定義に従う）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// 保存済みファイル
// ---------------------------------------------------------------------------

/// アップロード済みファイルのレコード。
///
/// アップロード成功時に作成され、以後変更されない。
/// 保持期間切れのスイープまたは明示的な削除で破棄される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    /// ファイルID（保存名から拡張子を除いたもの）
    pub id: String,
    /// クライアントが送信した元のファイル名
    pub original_name: String,
    /// 保存名 (`{unixMillis}_{32桁hex}{ext}`)
    pub stored_name: String,
    /// サイズ（バイト）
    pub size_bytes: u64,
    /// 宣言されたMIMEタイプ
    pub mime_type: String,
    /// ディスク上の保存先パス
    pub storage_path: String,
    /// 作成日時
    pub created_at: DateTime<Utc>,
    /// 有効期限（常に `created_at` より後）
    pub expires_at: DateTime<Utc>,
}

impl StoredFile {
    /// `now` 時点で有効期限を過ぎているか。
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// ---------------------------------------------------------------------------
// 公開HTTP API レスポンス
// ---------------------------------------------------------------------------

/// 全エンドポイント共通のエラーレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// 常に `false`
    pub success: bool,
    /// エラーメッセージ
    pub error: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// `POST /api/upload/public` レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    /// ファイルID
    pub file_id: String,
    /// 公開URL (`{scheme}://{host}/files/{storedName}`)
    pub file_url: String,
    /// 元のファイル名
    pub file_name: String,
    /// サイズ（バイト）
    pub file_size: u64,
    /// MIMEタイプ
    #[serde(rename = "mimetype")]
    pub mime_type: String,
    /// アップロード日時
    pub upload_time: DateTime<Utc>,
    /// 有効期限
    pub expires_at: DateTime<Utc>,
}

/// `GET /api/upload/info/{fileId}` レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfoResponse {
    pub success: bool,
    pub file_id: String,
    /// 保存名
    pub filename: String,
    pub public_url: String,
    pub size: u64,
    pub upload_time: DateTime<Utc>,
    pub exists: bool,
}

/// `DELETE /api/upload/{fileId}` レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// `GET /api/health` レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub success: bool,
    /// 常に `"running"`
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// サービス名
    pub service: String,
    /// サービスのバージョン
    pub version: String,
}

// ---------------------------------------------------------------------------
// Gateway経由のウォーターマーク操作リクエスト
// ---------------------------------------------------------------------------

/// `POST /api/watermark/tasks` リクエスト。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    /// ウォーターマークを付与するファイルのURL
    pub file_url: String,
    /// ウォーターマーク文字列
    pub content: String,
    /// 業務ID
    pub biz_id: String,
}

/// `POST /api/watermark/extract-tasks` リクエスト。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractTaskRequest {
    /// 抽出対象ファイルのURL
    pub file_url: String,
    /// 業務ID
    pub biz_id: String,
}

// ---------------------------------------------------------------------------
// 外部ウォーターマークサービス
// ---------------------------------------------------------------------------

/// 可視ウォーターマーク。
pub const WATERMARK_TYPE_VISIBLE: u8 = 1;
/// 不可視ウォーターマーク。
pub const WATERMARK_TYPE_INVISIBLE: u8 = 2;

/// ウォーターマーク付与タスク作成の送信ボディ。
///
/// フィールド順はシリアライズ結果（＝署名対象の文字列）に影響するため変更しないこと。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddWatermarkTaskBody {
    pub file_url: String,
    pub content: String,
    pub biz_id: String,
    /// ウォーターマーク種別（1: 可視, 2: 不可視）
    #[serde(rename = "type")]
    pub watermark_type: u8,
    pub timing: TaskTiming,
}

/// タスクの定時実行設定。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskTiming {
    pub enabled: bool,
}

/// ウォーターマーク抽出タスク作成の送信ボディ。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractWatermarkTaskBody {
    pub file_url: String,
    pub biz_id: String,
}

/// 外部サービスが返すタスク情報。
///
/// 形式は外部サービスが所有するため、受信したJSONをそのまま保持する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskReference(pub serde_json::Value);

impl TaskReference {
    /// タスクIDを取得する。トップレベルまたは `data` 配下の
    /// `task_id` / `taskId` を探す。
    pub fn task_id(&self) -> Option<&str> {
        self.lookup(&["task_id", "taskId"])
    }

    /// タスク状態を取得する（文字列の場合のみ）。
    pub fn status(&self) -> Option<&str> {
        self.lookup(&["status", "task_status"])
    }

    fn lookup(&self, keys: &[&str]) -> Option<&str> {
        let scopes = [Some(&self.0), self.0.get("data")];
        scopes
            .into_iter()
            .flatten()
            .flat_map(|scope| keys.iter().filter_map(move |k| scope.get(*k)))
            .find_map(|v| v.as_str())
    }

    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }
}

/// 外部サービスへの疎通確認結果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHealth {
    /// `"healthy"` または `"unhealthy"`
    pub status: String,
    #[serde(rename = "baseURL")]
    pub base_url: String,
    /// レスポンスを受信できた場合のみ。ステータス < 500 なら `true`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessible: Option<bool>,
    /// 通信に失敗した場合のエラー内容
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
