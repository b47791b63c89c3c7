//! # /api/watermark/*
//!
//! 外部ウォーターマークサービスへの中継。認証情報が未設定の場合は500を返す。

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use watermark_client::WatermarkClient;
use watermark_types::{CreateTaskRequest, ExtractTaskRequest, RemoteHealth};

use crate::config::GatewayState;
use crate::error::GatewayError;

fn client(state: &GatewayState) -> Result<&WatermarkClient, GatewayError> {
    state.watermark.as_ref().ok_or_else(|| {
        GatewayError::Internal(
            "ウォーターマークサービスの認証情報が設定されていません".to_string(),
        )
    })
}

fn require(field: &str, value: &str) -> Result<(), GatewayError> {
    if value.trim().is_empty() {
        return Err(GatewayError::BadRequest(format!("{field}は必須です")));
    }
    Ok(())
}

/// POST /api/watermark/tasks — ウォーターマーク付与タスク作成。
pub async fn handle_create_task(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let Json(body) = body.map_err(|e| GatewayError::BadRequest(e.body_text()))?;
    require("fileUrl", &body.file_url)?;
    require("content", &body.content)?;
    require("bizId", &body.biz_id)?;

    let task = client(&state)?
        .create_watermark_task(&body.file_url, &body.content, &body.biz_id)
        .await?;
    Ok(Json(task.into_inner()))
}

/// GET /api/watermark/tasks/{taskId} — タスク状態照会。
pub async fn handle_query_task(
    State(state): State<Arc<GatewayState>>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let task = client(&state)?.query_task_status(&task_id).await?;
    Ok(Json(task.into_inner()))
}

/// POST /api/watermark/extract-tasks — ウォーターマーク抽出タスク作成。
pub async fn handle_create_extract_task(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<ExtractTaskRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let Json(body) = body.map_err(|e| GatewayError::BadRequest(e.body_text()))?;
    require("fileUrl", &body.file_url)?;
    require("bizId", &body.biz_id)?;

    let task = client(&state)?
        .create_extract_watermark_task(&body.file_url, &body.biz_id)
        .await?;
    Ok(Json(task.into_inner()))
}

/// GET /api/watermark/health — 外部サービスへの疎通確認。
pub async fn handle_watermark_health(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<RemoteHealth>, GatewayError> {
    Ok(Json(client(&state)?.health_check().await))
}
