//! # Watermark Relay Gateway
//!
//! ファイルを一時的に公開するアップロードGateway。
//! 外部ウォーターマークサービスは公開URLを指定してファイルを取得するため、
//! ここで受け付けたファイルを一定期間だけ `/files/` 配下で配信する。
//!
//! ## 役割
//! - アップロードの検証と保存
//! - 保持期間を過ぎたファイルの削除
//! - 外部ウォーターマークサービスへの署名付きリクエストの中継
//!
//! ## API エンドポイント
//! - `POST /api/upload/public` — ファイルアップロード
//! - `GET /api/upload/info/{fileId}` — ファイル情報
//! - `DELETE /api/upload/{fileId}` — ファイル削除
//! - `GET /api/health` — 稼働確認
//! - `GET /files/{storedName}` — 保存ファイルの配信
//! - `POST /api/watermark/tasks` / `GET /api/watermark/tasks/{taskId}` /
//!   `POST /api/watermark/extract-tasks` / `GET /api/watermark/health` — 外部サービス中継

mod config;
mod endpoints;
mod error;
mod storage;
mod sweeper;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use watermark_client::{WatermarkClient, WatermarkConfig};

use config::{GatewayConfig, GatewayState};
use endpoints::{
    handle_create_extract_task, handle_create_task, handle_delete, handle_file_info,
    handle_health, handle_query_task, handle_upload, handle_watermark_health,
};
use storage::{FileStore, LocalFileStore};
use sweeper::ExpirySweeper;

/// multipartのヘッダ等に見込む余裕
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// オリジンをそのまま反映するCORS設定。
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// ルーターを組み立てる。
fn build_router(state: Arc<GatewayState>) -> Router {
    let files_dir = state.store.files_dir().to_path_buf();
    // サイズ超過はハンドラ側で検出して400を返すため、本文上限はそれより大きくする
    let body_limit = (state.max_upload_size + MULTIPART_OVERHEAD) as usize;

    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/upload/public", post(handle_upload))
        .route("/api/upload/info/{file_id}", get(handle_file_info))
        .route("/api/upload/{file_id}", delete(handle_delete))
        .route("/api/watermark/tasks", post(handle_create_task))
        .route("/api/watermark/tasks/{task_id}", get(handle_query_task))
        .route("/api/watermark/extract-tasks", post(handle_create_extract_task))
        .route("/api/watermark/health", get(handle_watermark_health))
        .nest_service("/files", ServeDir::new(files_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

/// 環境変数から外部サービスのクライアントを構築する。
///
/// 認証情報が未設定の場合は中継エンドポイントを無効にして起動を続ける。
fn watermark_client_from_env() -> anyhow::Result<Option<WatermarkClient>> {
    if std::env::var_os("WATERMARK_ACCESS_KEY").is_none()
        || std::env::var_os("WATERMARK_SECRET_KEY").is_none()
    {
        tracing::warn!("WATERMARK_ACCESS_KEY/WATERMARK_SECRET_KEYが未設定のため、ウォーターマークサービスの中継は無効です");
        return Ok(None);
    }

    let config = WatermarkConfig::from_env()?;
    tracing::info!(base_url = %config.base_url, "ウォーターマークサービスの中継を有効にします");
    Ok(Some(WatermarkClient::new(config)?))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "シグナルの待ち受けに失敗しました");
    }
    tracing::info!("シャットダウンします");
}

// ---------------------------------------------------------------------------
// エントリポイント
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::from_env()?;
    tracing::info!(
        mode = ?config.storage_mode,
        root = %config.upload_root.display(),
        retention_secs = config.retention.as_secs(),
        "ストレージ設定"
    );

    let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::open(&config.upload_root).await?);
    let sweeper = ExpirySweeper::new(store.clone(), config.sweep_interval).spawn();

    let state = Arc::new(GatewayState {
        store,
        watermark: watermark_client_from_env()?,
        retention: chrono::Duration::from_std(config.retention)?,
        max_upload_size: config.max_upload_size,
        public_base_url: config.public_base_url.clone(),
    });

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Gatewayを {} で起動します", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    Ok(())
}

// ---------------------------------------------------------------------------
// テスト
// ---------------------------------------------------------------------------
