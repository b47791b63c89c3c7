//! # Gatewayエンドポイント
//!
//! - `POST /api/upload/public` — ファイルアップロード
//! - `GET /api/upload/info/{fileId}` — ファイル情報
//! - `DELETE /api/upload/{fileId}` — ファイル削除
//! - `GET /api/health` — 稼働確認
//! - `/api/watermark/*` — 外部ウォーターマークサービスの中継

pub mod delete;
pub mod health;
pub mod info;
pub mod upload;
pub mod watermark;

pub use delete::handle_delete;
pub use health::handle_health;
pub use info::handle_file_info;
pub use upload::handle_upload;
pub use watermark::{
    handle_create_extract_task, handle_create_task, handle_query_task, handle_watermark_health,
};

use axum::http::{header, HeaderMap};

/// 返却URLのスキーム+ホスト部分。
///
/// 設定値があればそれを使い、なければ `X-Forwarded-Proto`（既定 `http`）と `Host` から組み立てる。
pub(crate) fn public_base_url(headers: &HeaderMap, configured: Option<&str>) -> String {
    if let Some(base) = configured {
        return base.trim_end_matches('/').to_string();
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| *v == "http" || *v == "https")
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    format!("{scheme}://{host}")
}

/// 保存名から公開URLを組み立てる。
pub(crate) fn public_file_url(base: &str, stored_name: &str) -> String {
    format!("{base}/files/{stored_name}")
}
