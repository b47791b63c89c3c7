//! # POST /api/upload/public
//!
//! multipartの `file` フィールドを受け取り、検証して保存する。

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use axum::Json;
use watermark_types::UploadResponse;

use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::storage::{self, check_mime_type};

use super::{public_base_url, public_file_url};

/// multipartから取り出したファイル。
struct ReceivedFile {
    bytes: Vec<u8>,
    original_name: String,
    mime_type: String,
}

/// POST /api/upload/public — ファイルアップロード。
///
/// MIMEタイプは本文を読む前に検証し、サイズは受信しながら上限を確認する。
pub async fn handle_upload(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, GatewayError> {
    let file = read_file_field(multipart, state.max_upload_size).await?;

    let stored = storage::upload(
        state.store.as_ref(),
        file.bytes,
        &file.original_name,
        &file.mime_type,
        state.retention,
    )
    .await?;

    let base = public_base_url(&headers, state.public_base_url.as_deref());
    Ok(Json(UploadResponse {
        success: true,
        file_url: public_file_url(&base, &stored.stored_name),
        file_id: stored.id,
        file_name: stored.original_name,
        file_size: stored.size_bytes,
        mime_type: stored.mime_type,
        upload_time: stored.created_at,
        expires_at: stored.expires_at,
    }))
}

/// `file` フィールドを1つだけ受け付ける。他のフィールドは読み飛ばす。
async fn read_file_field(
    mut multipart: Multipart,
    max_size: u64,
) -> Result<ReceivedFile, GatewayError> {
    let mut received: Option<ReceivedFile> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("multipartの読み込みに失敗: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        if received.is_some() {
            return Err(GatewayError::BadRequest(
                "fileフィールドは1つだけ送信してください".to_string(),
            ));
        }

        let original_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "unknown".to_string());
        let declared = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let mime_type = check_mime_type(&declared)?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| GatewayError::BadRequest(format!("ファイルの読み込みに失敗: {e}")))?
        {
            if (bytes.len() + chunk.len()) as u64 > max_size {
                return Err(GatewayError::TooLarge { limit: max_size });
            }
            bytes.extend_from_slice(&chunk);
        }

        received = Some(ReceivedFile {
            bytes,
            original_name,
            mime_type,
        });
    }

    received.ok_or(GatewayError::NoFile)
}
