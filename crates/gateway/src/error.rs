//! # Gateway エラー型
//!
//! 全てのエラーは `{"success": false, "error": "..."}` のJSONで返す。

use axum::http::StatusCode;
use axum::Json;
use watermark_client::ClientError;
use watermark_types::ApiError;

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// multipartに `file` フィールドがない
    #[error("ファイルがアップロードされていません")]
    NoFile,
    /// 許可リスト外のMIMEタイプ
    #[error("サポートされていないファイル形式です: {0}")]
    UnsupportedType(String),
    /// サイズ上限超過
    #[error("ファイルサイズが上限を超えています（上限: {}）", format_limit(.limit))]
    TooLarge { limit: u64 },
    /// 不正なリクエスト
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// ファイルが存在しない
    #[error("ファイルが存在しません")]
    NotFound,
    /// ストレージ操作に失敗
    #[error("ストレージ操作に失敗: {0}")]
    Storage(String),
    /// 外部ウォーターマークサービスの呼び出しに失敗
    #[error("ウォーターマークサービスの呼び出しに失敗: {0}")]
    Remote(#[from] ClientError),
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

/// 上限値の表示。1MiB未満はバイト単位。
fn format_limit(limit: &u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if *limit >= MIB && *limit % MIB == 0 {
        format!("{}MB", limit / MIB)
    } else if *limit >= MIB {
        format!("{:.1}MB", *limit as f64 / MIB as f64)
    } else {
        format!("{limit}バイト")
    }
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::NoFile
            | GatewayError::UnsupportedType(_)
            | GatewayError::TooLarge { .. }
            | GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Remote(ClientError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::Storage(_) | GatewayError::Remote(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Storage(e.to_string())
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "リクエスト処理に失敗しました");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "リクエストを拒否しました");
        }
        (status, Json(ApiError::new(self.to_string()))).into_response()
    }
}
