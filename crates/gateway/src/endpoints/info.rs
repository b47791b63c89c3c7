//! # GET /api/upload/info/{fileId}

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use watermark_types::FileInfoResponse;

use crate::config::GatewayState;
use crate::error::GatewayError;

use super::{public_base_url, public_file_url};

/// GET /api/upload/info/{fileId} — ファイル情報。
///
/// レコードがない場合、または実体が既に失われている場合は404。
pub async fn handle_file_info(
    State(state): State<Arc<GatewayState>>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<FileInfoResponse>, GatewayError> {
    let stored = state
        .store
        .get(&file_id)
        .await?
        .ok_or(GatewayError::NotFound)?;

    // 保存ルートが移動していても解決できるよう、現在の配信ディレクトリから引く
    let path = state.store.files_dir().join(&stored.stored_name);
    let exists = tokio::fs::try_exists(&path)
        .await
        .unwrap_or(false);
    if !exists {
        tracing::warn!(file_id = %file_id, "レコードはあるが実体が存在しません");
        return Err(GatewayError::NotFound);
    }

    let base = public_base_url(&headers, state.public_base_url.as_deref());
    Ok(Json(FileInfoResponse {
        success: true,
        public_url: public_file_url(&base, &stored.stored_name),
        file_id: stored.id,
        filename: stored.stored_name,
        size: stored.size_bytes,
        upload_time: stored.created_at,
        exists,
    }))
}
