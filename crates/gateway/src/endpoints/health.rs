//! # GET /api/health

use axum::Json;
use chrono::Utc;
use watermark_types::HealthResponse;

/// サービス名
pub const SERVICE_NAME: &str = "watermark-upload-gateway";

/// GET /api/health — 稼働確認。
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        status: "running".to_string(),
        timestamp: Utc::now(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
