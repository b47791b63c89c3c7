//! # Watermark Relay 署名付きAPIクライアント
//!
//! 外部ウォーターマークサービスへのHMAC認証付きリクエストを発行する。
//!
//! ## 構成
//! - `config`: 明示的に渡すクライアント設定
//! - `request`: 1回分の署名付きリクエスト送信
//! - `retry`: 指数バックオフ付きリトライ
//!
//! ## 操作
//! - [`WatermarkClient::create_watermark_task`] — ウォーターマーク付与タスク作成
//! - [`WatermarkClient::query_task_status`] — タスク状態照会
//! - [`WatermarkClient::create_extract_watermark_task`] — ウォーターマーク抽出タスク作成
//! - [`WatermarkClient::health_check`] — 認証なしの疎通確認

pub mod config;
pub mod error;
pub mod request;
pub mod retry;

use reqwest::Method;
use serde::Serialize;
use watermark_types::{
    AddWatermarkTaskBody, ExtractWatermarkTaskBody, RemoteHealth, TaskReference, TaskTiming,
    WATERMARK_TYPE_VISIBLE,
};

pub use config::{Endpoints, WatermarkConfig};
pub use error::ClientError;
pub use request::parse_response_body;
pub use retry::{retry_with_backoff, RetryError, RetryPolicy, Retryable};

/// 外部ウォーターマークサービスのクライアント。
///
/// HTTPコネクションプールを内部に持つため、プロセス内で1つを共有する。
pub struct WatermarkClient {
    config: WatermarkConfig,
    http: reqwest::Client,
    policy: RetryPolicy,
}

impl WatermarkClient {
    /// 設定を検証してクライアントを構築する。
    pub fn new(config: WatermarkConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Config(format!("HTTPクライアントの構築に失敗: {e}")))?;
        let policy = RetryPolicy::new(config.max_retries, config.base_delay);
        Ok(Self {
            config,
            http,
            policy,
        })
    }

    pub fn config(&self) -> &WatermarkConfig {
        &self.config
    }

    /// 署名付きリクエストを1回だけ送信する（リトライなし）。
    pub async fn execute<B: Serialize>(
        &self,
        method: Method,
        endpoint_path: &str,
        body: Option<&B>,
    ) -> Result<serde_json::Value, ClientError> {
        let body = serialize_body(body)?;
        request::send_signed(&self.http, &self.config, method, endpoint_path, body).await
    }

    /// 署名付きリクエストをリトライ付きで送信する。
    ///
    /// 試行ごとに日時を取り直して署名し直す。ボディは一度だけシリアライズする。
    pub async fn call<B: Serialize>(
        &self,
        method: Method,
        endpoint_path: &str,
        body: Option<&B>,
    ) -> Result<serde_json::Value, ClientError> {
        let body = serialize_body(body)?;
        let result = retry_with_backoff(&self.policy, |_attempt| {
            let method = method.clone();
            let body = body.clone();
            async move {
                request::send_signed(&self.http, &self.config, method, endpoint_path, body).await
            }
        })
        .await;
        result.map_err(ClientError::from)
    }

    /// ウォーターマーク付与タスクを作成する。
    pub async fn create_watermark_task(
        &self,
        file_url: &str,
        content: &str,
        biz_id: &str,
    ) -> Result<TaskReference, ClientError> {
        tracing::info!(file_url, content, biz_id, "ウォーターマーク付与タスクを作成します");

        let body = AddWatermarkTaskBody {
            file_url: file_url.to_string(),
            content: content.to_string(),
            biz_id: biz_id.to_string(),
            watermark_type: WATERMARK_TYPE_VISIBLE,
            timing: TaskTiming { enabled: false },
        };
        let result = self
            .call(Method::POST, &self.config.endpoints.add_watermark_task, Some(&body))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "ウォーターマーク付与タスクの作成に失敗"))?;

        Ok(TaskReference(result))
    }

    /// タスク状態を照会する。
    pub async fn query_task_status(&self, task_id: &str) -> Result<TaskReference, ClientError> {
        if !is_valid_task_id(task_id) {
            return Err(ClientError::InvalidInput(format!("不正なタスクID: {task_id:?}")));
        }
        tracing::info!(task_id, "タスク状態を照会します");

        let path = format!("{}/{}", self.config.endpoints.query_task, task_id);
        let result = self
            .call(Method::GET, &path, None::<&()>)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "タスク状態の照会に失敗"))?;

        Ok(TaskReference(result))
    }

    /// ウォーターマーク抽出タスクを作成する。
    pub async fn create_extract_watermark_task(
        &self,
        file_url: &str,
        biz_id: &str,
    ) -> Result<TaskReference, ClientError> {
        tracing::info!(file_url, biz_id, "ウォーターマーク抽出タスクを作成します");

        let body = ExtractWatermarkTaskBody {
            file_url: file_url.to_string(),
            biz_id: biz_id.to_string(),
        };
        let result = self
            .call(Method::POST, &self.config.endpoints.extract_watermark_task, Some(&body))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "ウォーターマーク抽出タスクの作成に失敗"))?;

        Ok(TaskReference(result))
    }

    /// ベースURLへ認証なしのGETを送り、疎通を確認する。
    ///
    /// ステータス < 500 のレスポンスを受信できれば到達可能とみなす。通信失敗は unhealthy。
    pub async fn health_check(&self) -> RemoteHealth {
        let base_url = self.config.base_url.clone();
        match self
            .http
            .get(&base_url)
            .timeout(self.config.health_timeout)
            .send()
            .await
        {
            Ok(response) => RemoteHealth {
                status: "healthy".to_string(),
                base_url,
                accessible: Some(response.status().as_u16() < 500),
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "外部サービスへの疎通確認に失敗");
                RemoteHealth {
                    status: "unhealthy".to_string(),
                    base_url,
                    accessible: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// タスクIDは `[A-Za-z0-9_-]+` のみ許可する。
///
/// 署名対象のパスと実際に送信されるパスをバイト単位で一致させるため、
/// URL正規化やパーセントエンコードの対象になる文字は受け付けない。
fn is_valid_task_id(task_id: &str) -> bool {
    !task_id.is_empty()
        && task_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn serialize_body<B: Serialize>(body: Option<&B>) -> Result<Option<String>, ClientError> {
    body.map(serde_json::to_string)
        .transpose()
        .map_err(|e| ClientError::Serialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::{HeaderMap, StatusCode};

    const ACCESS_KEY: &str = "test-access";
    const SECRET_KEY: &str = "test-secret";

    /// モックサーバーを起動してベースURLを返す
    async fn spawn_mock(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        format!("http://127.0.0.1:{port}")
    }

    fn test_client(base_url: &str) -> WatermarkClient {
        let mut config = WatermarkConfig::new(base_url, ACCESS_KEY, SECRET_KEY);
        config.base_delay = Duration::from_millis(10);
        WatermarkClient::new(config).unwrap()
    }

    /// 受信ヘッダから署名を再計算して検証する
    fn verify_signature(headers: &HeaderMap, method: &str, path: &str, body: &str) {
        let header = |name: &str| headers.get(name).unwrap().to_str().unwrap().to_string();
        assert_eq!(header("content-type"), "application/json");
        assert_eq!(header("x-hmac-algorithm"), "hmac-sha256");
        assert_eq!(header("x-hmac-access-key"), ACCESS_KEY);

        let date = header("date");
        let expected = watermark_crypto::hmac_sha256_base64(
            SECRET_KEY,
            &watermark_crypto::canonical_string(method, path, &date, body),
        )
        .unwrap();
        assert_eq!(header("x-hmac-signature"), expected);
    }

    /// 付与タスク作成で署名ヘッダと送信ボディが正しいことを確認
    #[tokio::test]
    async fn test_create_watermark_task_signed() {
        let mock = axum::Router::new().route(
            "/dlp/file_process/add_watermark_task",
            axum::routing::post(|headers: HeaderMap, body: String| async move {
                verify_signature(&headers, "POST", "/dlp/file_process/add_watermark_task", &body);
                let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
                assert_eq!(parsed["file_url"], "http://files/a.pdf");
                assert_eq!(parsed["content"], "secret");
                assert_eq!(parsed["biz_id"], "biz-9");
                assert_eq!(parsed["type"], 1);
                assert_eq!(parsed["timing"]["enabled"], false);
                axum::Json(serde_json::json!({"code": 0, "data": {"task_id": "task-1"}}))
            }),
        );
        let base_url = spawn_mock(mock).await;
        let client = test_client(&base_url);

        let task = client
            .create_watermark_task("http://files/a.pdf", "secret", "biz-9")
            .await
            .unwrap();
        assert_eq!(task.task_id(), Some("task-1"));
    }

    /// タスク照会はGETで `{endpoint}/{taskId}` に送られ、ボディなしで署名されることを確認
    #[tokio::test]
    async fn test_query_task_status_path() {
        let mock = axum::Router::new().route(
            "/dlp/file_process/task/{task_id}",
            axum::routing::get(
                |axum::extract::Path(task_id): axum::extract::Path<String>,
                 headers: HeaderMap| async move {
                    let path = format!("/dlp/file_process/task/{task_id}");
                    verify_signature(&headers, "GET", &path, "");
                    axum::Json(serde_json::json!({"task_id": task_id, "status": "finished"}))
                },
            ),
        );
        let base_url = spawn_mock(mock).await;
        let client = test_client(&base_url);

        let task = client.query_task_status("abc123").await.unwrap();
        assert_eq!(task.task_id(), Some("abc123"));
        assert_eq!(task.status(), Some("finished"));
    }

    #[tokio::test]
    async fn test_query_task_status_rejects_bad_id() {
        let client = test_client("http://127.0.0.1:9");
        for bad in ["", "a/b", "a b", "x?y", ".", "..", "a.b", "タスク1", "t%2E"] {
            let result = client.query_task_status(bad).await;
            assert!(matches!(result, Err(ClientError::InvalidInput(_))), "{bad:?}");
        }
    }

    /// 正規化で別パスに化けるIDは送信前に拒否され、リクエストが発生しないことを確認
    #[tokio::test]
    async fn test_dot_segment_task_id_never_reaches_server() {
        let paths = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let recorded = paths.clone();
        let mock = axum::Router::new().fallback(move |uri: axum::http::Uri| {
            let recorded = recorded.clone();
            async move {
                recorded.lock().unwrap().push(uri.path().to_string());
                axum::Json(serde_json::json!({"ok": true}))
            }
        });
        let base_url = spawn_mock(mock).await;
        let client = test_client(&base_url);

        for bad in ["..", ".", "タスク"] {
            let result = client.query_task_status(bad).await;
            assert!(matches!(result, Err(ClientError::InvalidInput(_))), "{bad:?}");
        }
        assert!(paths.lock().unwrap().is_empty());

        client.query_task_status("task_01-A").await.unwrap();
        assert_eq!(
            *paths.lock().unwrap(),
            vec!["/dlp/file_process/task/task_01-A".to_string()]
        );
    }

    #[tokio::test]
    async fn test_create_extract_watermark_task_body() {
        let mock = axum::Router::new().route(
            "/dlp/file_process/extract_watermark_task",
            axum::routing::post(|headers: HeaderMap, body: String| async move {
                verify_signature(
                    &headers,
                    "POST",
                    "/dlp/file_process/extract_watermark_task",
                    &body,
                );
                assert_eq!(body, r#"{"file_url":"http://files/b.png","biz_id":"biz-2"}"#);
                axum::Json(serde_json::json!({"task_id": "extract-1"}))
            }),
        );
        let base_url = spawn_mock(mock).await;
        let client = test_client(&base_url);

        let task = client
            .create_extract_watermark_task("http://files/b.png", "biz-2")
            .await
            .unwrap();
        assert_eq!(task.task_id(), Some("extract-1"));
    }

    /// 2xxだがJSONでないレスポンスは rawResponse として返されることを確認
    #[tokio::test]
    async fn test_malformed_json_response_is_wrapped() {
        let mock = axum::Router::new().route(
            "/dlp/file_process/task/{task_id}",
            axum::routing::get(|| async { "accepted" }),
        );
        let base_url = spawn_mock(mock).await;
        let client = test_client(&base_url);

        let task = client.query_task_status("t1").await.unwrap();
        assert_eq!(task.0, serde_json::json!({"rawResponse": "accepted"}));
    }

    /// 5xxは再試行され、成功すればその結果が返ることを確認
    #[tokio::test]
    async fn test_server_error_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mock = axum::Router::new().route(
            "/dlp/file_process/task/{task_id}",
            axum::routing::get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        (StatusCode::SERVICE_UNAVAILABLE, "busy".to_string())
                    } else {
                        (StatusCode::OK, r#"{"status":"done"}"#.to_string())
                    }
                }
            }),
        );
        let base_url = spawn_mock(mock).await;
        let client = test_client(&base_url);

        let task = client.query_task_status("t1").await.unwrap();
        assert_eq!(task.status(), Some("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    /// 5xxが続く場合、最大試行回数後に試行回数を含むエラーになることを確認
    #[tokio::test]
    async fn test_server_error_exhausts_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mock = axum::Router::new().route(
            "/dlp/file_process/add_watermark_task",
            axum::routing::post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::BAD_GATEWAY, "upstream down")
                }
            }),
        );
        let base_url = spawn_mock(mock).await;
        let client = test_client(&base_url);

        let err = client
            .create_watermark_task("http://f", "c", "b")
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match &err {
            ClientError::RetriesExhausted { attempts, last } => {
                assert_eq!(*attempts, 3);
                assert!(matches!(**last, ClientError::Status { status: 502, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("upstream down"));
    }

    /// 4xx（入力不正）は再試行されないことを確認
    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mock = axum::Router::new().route(
            "/dlp/file_process/add_watermark_task",
            axum::routing::post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::BAD_REQUEST, r#"{"code":400,"msg":"invalid file_url"}"#)
                }
            }),
        );
        let base_url = spawn_mock(mock).await;
        let client = test_client(&base_url);

        let err = client
            .create_watermark_task("not-a-url", "c", "b")
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match err {
            ClientError::Status {
                status,
                status_text,
                body,
            } => {
                assert_eq!(status, 400);
                assert_eq!(status_text, "Bad Request");
                assert!(body.contains("invalid file_url"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// 接続できない場合も再試行され、Transportエラーで終わることを確認
    #[tokio::test]
    async fn test_connection_refused_is_retried() {
        // バインド直後に解放したポートは接続拒否になる
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = test_client(&format!("http://127.0.0.1:{port}"));
        let err = client.query_task_status("t1").await.unwrap_err();
        match err {
            ClientError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, ClientError::Transport(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// 4xxのレスポンスでも到達可能とみなすことを確認
    #[tokio::test]
    async fn test_health_check_accessible() {
        let mock = axum::Router::new().route(
            "/",
            axum::routing::get(|| async { (StatusCode::NOT_FOUND, "nothing here") }),
        );
        let base_url = spawn_mock(mock).await;
        let client = test_client(&base_url);

        let health = client.health_check().await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.accessible, Some(true));
        assert_eq!(health.base_url, base_url);
    }

    #[tokio::test]
    async fn test_health_check_server_error_not_accessible() {
        let mock = axum::Router::new().route(
            "/",
            axum::routing::get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base_url = spawn_mock(mock).await;
        let client = test_client(&base_url);

        let health = client.health_check().await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.accessible, Some(false));
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = test_client(&format!("http://127.0.0.1:{port}"));
        let health = client.health_check().await;
        assert_eq!(health.status, "unhealthy");
        assert!(health.accessible.is_none());
        assert!(health.error.is_some());
    }
}
