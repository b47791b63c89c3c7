//! # DELETE /api/upload/{fileId}

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use watermark_types::DeleteResponse;

use crate::config::GatewayState;
use crate::error::GatewayError;

/// DELETE /api/upload/{fileId} — レコードと実体を削除する。
pub async fn handle_delete(
    State(state): State<Arc<GatewayState>>,
    Path(file_id): Path<String>,
) -> Result<Json<DeleteResponse>, GatewayError> {
    state
        .store
        .delete(&file_id)
        .await?
        .ok_or(GatewayError::NotFound)?;

    Ok(Json(DeleteResponse {
        success: true,
        message: "ファイルを削除しました".to_string(),
    }))
}
